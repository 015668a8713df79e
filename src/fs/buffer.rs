use core::ops::{Index, IndexMut};
use core::slice::SliceIndex;

/**
 An aligned, fixed capacity buffer that receives one batch of directory records.

 The buffer is 8-byte aligned because the kernel lays `linux_dirent64` records out
 on 8-byte boundaries relative to the start of the buffer. It is zero filled once
 on creation and then reused for every refill, so the valid region of a batch is
 always `..len` where `len` is what the read returned.

 # Examples
 ```
 use dirstream::fs::AlignedBuffer;

 let mut buffer = AlignedBuffer::<1026>::new();
 buffer.as_mut_slice()[..5].copy_from_slice(b"hello");

 assert_eq!(buffer.filled(5), Some(&b"hello"[..]));
 assert_eq!(buffer.filled(2048), None);
 assert!((buffer.as_ptr() as usize) % 8 == 0, "We expect the buffer to be aligned to 8 bytes");
 ```
*/
#[derive(Debug)]
#[repr(C, align(8))]
pub struct AlignedBuffer<const SIZE: usize> {
    data: [u8; SIZE],
}

impl<const SIZE: usize, Idx> Index<Idx> for AlignedBuffer<SIZE>
where
    Idx: SliceIndex<[u8]>,
{
    type Output = Idx::Output;

    #[inline]
    fn index(&self, index: Idx) -> &Self::Output {
        &self.data[index]
    }
}

impl<const SIZE: usize, Idx> IndexMut<Idx> for AlignedBuffer<SIZE>
where
    Idx: SliceIndex<[u8]>,
{
    #[inline]
    fn index_mut(&mut self, index: Idx) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl<const SIZE: usize> Default for AlignedBuffer<SIZE> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize> AlignedBuffer<SIZE> {
    /// Creates a new zero filled buffer
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self { data: [0; SIZE] }
    }

    /// Returns a const pointer to the buffer's data
    #[inline]
    #[must_use]
    pub const fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    #[inline]
    #[must_use]
    pub const fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The total capacity, independent of how much of it the last read filled
    #[inline]
    #[must_use]
    pub const fn max_capacity(&self) -> usize {
        SIZE
    }

    /// Returns the first `len` bytes, the valid region after a read of `len` bytes.
    ///
    /// `None` if `len` exceeds the capacity, which would mean the reader lied.
    #[inline]
    #[must_use]
    pub fn filled(&self, len: usize) -> Option<&[u8]> {
        self.data.get(..len)
    }
}

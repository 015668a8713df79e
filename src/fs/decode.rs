//! Decoding of raw `linux_dirent64` batches.
//!
//! A batch is a run of back-to-back, self-delimiting records:
//!
//! ```text
//! offset  0: d_ino    u64  (native endian)
//! offset  8: d_off    i64
//! offset 16: d_reclen u16  total record length, including padding
//! offset 18: d_type   u8
//! offset 19: d_name   NUL terminated, within [start, start + d_reclen)
//! ```
//!
//! Fields are read by slicing and `from_ne_bytes`, never by casting the buffer to a
//! struct pointer, so a short or corrupt batch can only produce an error.
use crate::DirStreamError;
use crate::fs::{DirEntry, Result};
use std::collections::VecDeque;

pub(crate) const D_INO: usize = 0;
pub(crate) const D_OFF: usize = 8;
pub(crate) const D_RECLEN: usize = 16;
pub(crate) const D_TYPE: usize = 18;
/// Size of the fixed header, the name field starts right after it
pub(crate) const D_NAME: usize = 19;

#[cfg(any(target_os = "linux", target_os = "android"))]
const_assert!(
    core::mem::offset_of!(libc::dirent64, d_name) == D_NAME
        && core::mem::offset_of!(libc::dirent64, d_reclen) == D_RECLEN
        && core::mem::offset_of!(libc::dirent64, d_type) == D_TYPE,
    "dirent64 layout differs from the decoder's, please report the error"
);

/// A borrowed view of one record inside a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord<'a> {
    ino: u64,
    d_off: i64,
    reclen: u16,
    d_type: u8,
    name: &'a [u8],
}

impl<'a> RawRecord<'a> {
    #[must_use]
    #[inline]
    pub const fn ino(&self) -> u64 {
        self.ino
    }

    /// The kernel's resume cookie for this record, opaque to the listing
    #[must_use]
    #[inline]
    pub const fn d_off(&self) -> i64 {
        self.d_off
    }

    #[must_use]
    #[inline]
    pub const fn reclen(&self) -> u16 {
        self.reclen
    }

    #[must_use]
    #[inline]
    pub const fn d_type(&self) -> u8 {
        self.d_type
    }

    /// The name bytes up to (not including) the first NUL, or the whole name
    /// field when it carries no NUL at all
    #[must_use]
    #[inline]
    pub const fn name(&self) -> &'a [u8] {
        self.name
    }

    #[must_use]
    #[inline]
    pub const fn is_dot_entry(&self) -> bool {
        matches!(self.name, b"." | b"..")
    }

    /// Converts the view into an owned entry, replacing invalid UTF-8 lossily
    #[must_use]
    #[inline]
    pub fn to_entry(&self) -> DirEntry {
        DirEntry::new(
            self.ino,
            String::from_utf8_lossy(self.name).into_owned(),
            self.d_type,
        )
    }
}

/**
 Iterator over the records of one batch, in encounter order.

 Yields `Err(MalformedRecord)` once and then stops if a header is truncated,
 claims fewer bytes than the fixed header, or runs past the end of the batch.

 # Examples
 ```
 use dirstream::fs::{Records, push_record};

 let mut batch = Vec::new();
 push_record(&mut batch, 11, 1, libc::DT_REG, "a.txt").unwrap();
 push_record(&mut batch, 12, 2, libc::DT_DIR, "sub").unwrap();

 let names: Vec<_> = Records::new(&batch).map(|r| r.unwrap().name().to_vec()).collect();
 assert_eq!(names, [b"a.txt".to_vec(), b"sub".to_vec()]);
 ```
*/
#[derive(Debug, Clone)]
pub struct Records<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Records<'a> {
    #[must_use]
    #[inline]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn malformed(&mut self, at: usize) -> Result<RawRecord<'a>> {
        self.offset = self.bytes.len();
        Err(DirStreamError::MalformedRecord { offset: at })
    }

    /// Parses the record starting at the front of `rest`.
    fn parse(rest: &'a [u8]) -> Option<RawRecord<'a>> {
        let reclen = read_ne!(rest, D_RECLEN, u16)?;
        let record = rest.get(..usize::from(reclen))?;
        let name_field = record.get(D_NAME..)?;
        // the name is searched for only inside its own record
        let name_len = name_field
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(name_field.len());

        Some(RawRecord {
            ino: read_ne!(record, D_INO, u64)?,
            d_off: read_ne!(record, D_OFF, i64)?,
            reclen,
            d_type: *record.get(D_TYPE)?,
            name: name_field.get(..name_len)?,
        })
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<RawRecord<'a>>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.bytes;
        let start = self.offset;
        let rest = bytes.get(start..).filter(|rest| !rest.is_empty())?;

        match Self::parse(rest) {
            Some(record) => {
                self.offset += usize::from(record.reclen);
                Some(Ok(record))
            }
            None => Some(self.malformed(start)),
        }
    }
}

impl core::iter::FusedIterator for Records<'_> {}

/// Decodes every record in `bytes` into owned entries, in encounter order.
///
/// # Errors
/// `MalformedRecord` if the batch is not a clean run of complete records.
pub fn decode_records(bytes: &[u8]) -> Result<Vec<DirEntry>> {
    Records::new(bytes)
        .map(|record| record.map(|raw| raw.to_entry()))
        .collect()
}

/// Decodes a batch onto the back of `out`, returning how many entries were added.
pub(crate) fn decode_into(
    bytes: &[u8],
    out: &mut VecDeque<DirEntry>,
    skip_dot_entries: bool,
) -> Result<usize> {
    let before = out.len();
    for record in Records::new(bytes) {
        let record = record?;
        if skip_dot_entries && record.is_dot_entry() {
            continue;
        }
        out.push_back(record.to_entry());
    }
    Ok(out.len() - before)
}

/// Sorts a batch by name, byte-lexicographically
#[inline]
pub(crate) fn sort_by_name(entries: &mut VecDeque<DirEntry>) {
    entries
        .make_contiguous()
        .sort_by(|left, right| left.name.as_bytes().cmp(right.name.as_bytes()));
}

/**
 Appends one record to `batch`, laid out the way the kernel lays it out
 (NUL terminated and padded to 8 bytes). Returns the record length.

 Useful for building batches for a [`BatchReader`](crate::BatchReader) that does
 not sit on top of `getdents64`.

 # Errors
 `InvalidName` if the name holds a NUL byte or does not fit a `u16` record length.
*/
pub fn push_record(
    batch: &mut Vec<u8>,
    ino: u64,
    d_off: i64,
    d_type: u8,
    name: &str,
) -> Result<usize> {
    let unpadded = D_NAME + name.len() + 1;
    let reclen = unpadded.next_multiple_of(8);
    let encoded_len = u16::try_from(reclen).ok().filter(|_| !name.contains('\0'));
    let Some(encoded_len) = encoded_len else {
        return Err(DirStreamError::InvalidName(name.to_owned()));
    };

    batch.reserve(reclen);
    batch.extend_from_slice(&ino.to_ne_bytes());
    batch.extend_from_slice(&d_off.to_ne_bytes());
    batch.extend_from_slice(&encoded_len.to_ne_bytes());
    batch.push(d_type);
    batch.extend_from_slice(name.as_bytes());
    batch.resize(batch.len() + (reclen - D_NAME - name.len()), 0);
    Ok(reclen)
}

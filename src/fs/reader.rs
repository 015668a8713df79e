use crate::fs::{BatchReader, FileDes, Result};
use core::ffi::c_char;
use std::path::Path;

/**
  Wrapper for direct getdents64 syscalls

 # Safety
 - Requires valid open directory descriptor
 - Buffer must be valid for writes of `buffer_size` bytes

 # Returns
 - Positive: Number of bytes read
 - 0: End of directory
 - Negative: Error code (check errno)
*/
#[inline]
#[allow(clippy::cast_possible_truncation, reason = "clong is isize on Unix")]
pub unsafe fn getdents(fd: i32, buffer_ptr: *mut c_char, buffer_size: usize) -> isize {
    // SAFETY: Syscall has no other implicit safety requirements beyond pointer validity(and precursor conditions met.)
    unsafe {
        libc::syscall(libc::SYS_getdents64, fd, buffer_ptr, buffer_size) as _
    }
}

/**
 Linux/Android batch reader using the `getdents64` system call.

 Owns the directory descriptor; dropping the reader closes it. Every call hands
 the kernel the whole buffer and gets back as many complete records as fit, the
 kernel advancing the descriptor's position past them.
*/
#[derive(Debug)]
pub struct GetDents {
    pub(crate) fd: FileDes,
    /// Set once a read returned 0, later reads short circuit to 0
    pub(crate) end_of_stream: bool,
}

impl GetDents {
    /// Opens `path` for reading.
    ///
    /// # Errors
    /// See [`FileDes::open_dir`].
    #[inline]
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_fd(FileDes::open_dir(path)?))
    }

    #[must_use]
    #[inline]
    pub const fn from_fd(fd: FileDes) -> Self {
        Self {
            fd,
            end_of_stream: false,
        }
    }

    #[must_use]
    #[inline]
    pub const fn fd(&self) -> &FileDes {
        &self.fd
    }
}

impl BatchReader for GetDents {
    #[allow(clippy::cast_sign_loss, reason = "checked non-negative first")]
    fn read_batch(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.end_of_stream {
            return Ok(0);
        }
        // SAFETY: the descriptor is owned by self and the buffer is valid for buf.len() writes
        let read = unsafe { getdents(self.fd.0, buf.as_mut_ptr().cast(), buf.len()) };

        if read < 0 {
            return_os_error!()
        }
        log::trace!("getdents64 on fd {} returned {read} bytes", self.fd.0);
        self.end_of_stream = read == 0;
        Ok(read as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{SyscallBuffer, decode_records};
    use std::collections::HashSet;

    #[test]
    fn reads_whole_directory_then_zero() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["file1", "file2", "file3"] {
            std::fs::write(dir.path().join(name), name).unwrap();
        }
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let mut reader = GetDents::open(dir.path()).unwrap();
        let mut buffer = SyscallBuffer::new();
        let mut names = Vec::new();
        loop {
            let read = reader.read_batch(buffer.as_mut_slice()).unwrap();
            if read == 0 {
                break;
            }
            let batch = buffer.filled(read).unwrap();
            names.extend(decode_records(batch).unwrap().into_iter().map(|e| e.into_name()));
        }
        names.sort();
        assert_eq!(names, [".", "..", "file1", "file2", "file3", "subdir"]);
        assert_eq!(reader.read_batch(buffer.as_mut_slice()).unwrap(), 0);
    }

    #[test]
    fn sequential_reads_never_overlap() {
        let dir = tempfile::tempdir().unwrap();
        // enough long names to need several 4096 byte batches
        for index in 0..300 {
            std::fs::write(dir.path().join(format!("{index:0>40}")), "").unwrap();
        }

        let mut reader = GetDents::open(dir.path()).unwrap();
        let mut buffer = SyscallBuffer::new();
        let mut seen = HashSet::new();
        let mut batches = 0;
        loop {
            let read = reader.read_batch(buffer.as_mut_slice()).unwrap();
            if read == 0 {
                break;
            }
            batches += 1;
            for entry in decode_records(buffer.filled(read).unwrap()).unwrap() {
                assert!(seen.insert(entry.into_name()), "record returned twice");
            }
        }
        assert!(batches > 1);
        assert_eq!(seen.len(), 302);
    }
}

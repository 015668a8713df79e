use crate::DirStreamError;
use crate::fs::{BUFFER_SIZE, FileType};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt as _;
use std::path::Path;

/// Generic result type for directory listing operations
pub type Result<T> = core::result::Result<T, DirStreamError>;

/// The buffer each cursor hands to its batch reader, reused across refills
pub type SyscallBuffer = crate::fs::AlignedBuffer<BUFFER_SIZE>;

/**
 A source of raw directory record batches.

 Each call performs one batched read into `buf` and returns how many bytes of it
 now hold complete, back-to-back records. `Ok(0)` means the directory is
 exhausted and no further call will ever produce data. Sequential calls must
 never return the same record twice.
*/
pub trait BatchReader: Send {
    /// Reads the next batch of records into `buf`.
    ///
    /// # Errors
    /// Returns the OS error of the underlying read. The caller treats it as fatal.
    fn read_batch(&mut self, buf: &mut [u8]) -> Result<usize>;
}

impl<R: BatchReader + ?Sized> BatchReader for Box<R> {
    #[inline]
    fn read_batch(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_batch(buf)
    }
}

/// An owned file descriptor for an open directory, closed exactly once on drop
#[derive(Debug)]
#[repr(transparent)]
pub struct FileDes(pub(crate) i32);

impl FileDes {
    /**
     Opens `path` as a directory.

     The directory is opened with `O_RDONLY | O_DIRECTORY | O_CLOEXEC`, so anything
     that is not a directory fails with `ENOTDIR`.

     # Errors
     `NotFound`, `NotADirectory`, `AccessDenied`, or `OSerror` for anything else
     (including a path containing an interior NUL byte).
    */
    pub fn open_dir(path: &Path) -> Result<Self> {
        const FLAGS: i32 = libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC;
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| std::io::Error::from_raw_os_error(libc::EINVAL))?;
        // SAFETY: the pointer is null terminated and outlives the call
        let fd = unsafe { libc::open(c_path.as_ptr(), FLAGS) };

        if fd < 0 {
            return_os_error!()
        }
        log::debug!("opened directory {} as fd {fd}", path.display());
        Ok(Self(fd))
    }

    /// Returns the raw descriptor, valid for as long as `self` is alive
    #[must_use]
    #[inline]
    pub const fn as_raw(&self) -> i32 {
        self.0
    }

    /**
     Creates `name` inside this directory, as a directory (0o755) or an empty
     regular file (0o644).

     Returns `Ok(false)` if something with that name already exists.

     # Errors
     The OS error of `mkdirat`/`openat` (read-only filesystem, permissions...).
    */
    pub fn create_child(&self, name: &str, file_type: FileType) -> std::io::Result<bool> {
        let c_name = CString::new(name)
            .map_err(|_| std::io::Error::from_raw_os_error(libc::EINVAL))?;

        let rc = if file_type == FileType::RegularFile {
            const FLAGS: i32 = libc::O_CREAT | libc::O_EXCL | libc::O_WRONLY | libc::O_CLOEXEC;
            // SAFETY: both the descriptor and the null terminated name are valid for the call
            let fd = unsafe { libc::openat(self.0, c_name.as_ptr(), FLAGS, 0o644 as libc::c_uint) };
            if fd >= 0 {
                // SAFETY: fd was just opened and is not shared
                unsafe { libc::close(fd) };
            }
            fd.min(0)
        } else {
            // SAFETY: both the descriptor and the null terminated name are valid for the call
            unsafe { libc::mkdirat(self.0, c_name.as_ptr(), 0o755) }
        };

        if rc < 0 {
            let error = std::io::Error::last_os_error();
            if error.raw_os_error() == Some(libc::EEXIST) {
                return Ok(false);
            }
            return Err(error);
        }
        Ok(true)
    }

    /// Checks if the file descriptor is currently open
    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        //SAFETY:  Always safe
        unsafe { libc::fcntl(self.0, libc::F_GETFD) != -1 }
    }
}

impl Drop for FileDes {
    /// Closes the descriptor. A failing close has no recovery, so it is only logged.
    #[inline]
    fn drop(&mut self) {
        // SAFETY: only closing HERE, ownership guarantees this runs once
        if unsafe { libc::close(self.0) } != 0 {
            log::warn!(
                "failed to close directory fd {}: {}",
                self.0,
                std::io::Error::last_os_error()
            );
        } else {
            log::debug!("closed directory fd {}", self.0);
        }
    }
}

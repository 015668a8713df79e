use libc::{EACCES, EBADF, EINVAL, EIO, ENOENT, ENOTDIR};
use std::{fmt, io};

#[derive(Debug)]
/// An error type for directory listing operations.
///
/// Errors are grouped into open failures (raised by construction), read failures
/// (raised by the `next` call whose refill hit them) and defensive decode failures.
/// Every variant maps onto a raw errno with [`DirStreamError::errno`] so a protocol
/// layer can reply with it directly.
pub enum DirStreamError {
    /// The directory does not exist (ENOENT)
    NotFound,
    NotADirectory,
    AccessDenied(io::Error),
    OSerror(io::Error),
    /// A record header in a getdents batch was inconsistent with the batch length
    MalformedRecord { offset: usize },
    /// A synthetic entry name that is not a single path component
    InvalidName(String),
    /// `next` was called while `has_next` was false
    NoMoreEntries,
    /// The cursor was closed, or failed earlier and released its handle
    Closed,
    /// A listing handle that is not (or no longer) registered
    BadHandle(u64),
}

impl DirStreamError {
    /// Converts the error into the raw errno a protocol reply would carry.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound => ENOENT,
            Self::NotADirectory => ENOTDIR,
            Self::AccessDenied(_) => EACCES,
            Self::OSerror(e) => e.raw_os_error().unwrap_or(EIO),
            Self::MalformedRecord { .. } => EIO,
            Self::InvalidName(_) => EINVAL,
            Self::NoMoreEntries | Self::Closed | Self::BadHandle(_) => EBADF,
        }
    }
}

impl From<io::Error> for DirStreamError {
    fn from(error: io::Error) -> Self {
        // map OS error codes to variants
        match error.raw_os_error() {
            Some(ENOENT) => Self::NotFound,
            Some(ENOTDIR) => Self::NotADirectory,
            Some(EACCES) => Self::AccessDenied(error),
            _ => Self::OSerror(error),
        }
    }
}

#[allow(clippy::pattern_type_mismatch)]
impl fmt::Display for DirStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "No such file or directory"),
            Self::NotADirectory => write!(f, "Not a directory"),
            Self::AccessDenied(e) => write!(f, "Access denied: {e}"),
            Self::OSerror(e) => write!(f, "OS error: {e}"),
            Self::MalformedRecord { offset } => {
                write!(f, "Malformed directory record at byte offset {offset}")
            }
            Self::InvalidName(name) => write!(f, "Invalid synthetic entry name {name:?}"),
            Self::NoMoreEntries => write!(f, "No more entries in directory stream"),
            Self::Closed => write!(f, "Directory stream is closed"),
            Self::BadHandle(handle) => write!(f, "Unknown listing handle {handle}"),
        }
    }
}

#[allow(clippy::pattern_type_mismatch)]
impl std::error::Error for DirStreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::AccessDenied(e) | Self::OSerror(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_raw_os_errors() {
        assert!(matches!(
            DirStreamError::from(io::Error::from_raw_os_error(ENOENT)),
            DirStreamError::NotFound
        ));
        assert!(matches!(
            DirStreamError::from(io::Error::from_raw_os_error(ENOTDIR)),
            DirStreamError::NotADirectory
        ));
        assert!(matches!(
            DirStreamError::from(io::Error::from_raw_os_error(EACCES)),
            DirStreamError::AccessDenied(_)
        ));
        assert!(matches!(
            DirStreamError::from(io::Error::from_raw_os_error(libc::EMFILE)),
            DirStreamError::OSerror(_)
        ));
    }

    #[test]
    fn errno_for_protocol_replies() {
        let err = DirStreamError::from(io::Error::from_raw_os_error(libc::EMFILE));
        assert_eq!(err.errno(), libc::EMFILE);
        assert_eq!(DirStreamError::NotFound.errno(), ENOENT);
        assert_eq!(DirStreamError::Closed.errno(), EBADF);
        assert_eq!(DirStreamError::MalformedRecord { offset: 8 }.errno(), EIO);
        // non-OS io errors still need an errno for the reply
        let other = DirStreamError::OSerror(io::Error::other("boom"));
        assert_eq!(other.errno(), EIO);
    }

    #[test]
    fn display_mentions_offset() {
        let msg = DirStreamError::MalformedRecord { offset: 48 }.to_string();
        assert!(msg.contains("48"));
    }
}

use crate::fs::FileType;
use core::fmt;

/**
 A decoded directory entry, as served to the protocol layer.

 Holds the inode number reported by the kernel, the entry name and a file mode
 whose only populated bits are the file type (`d_type << 12`). Entries are never
 mutated after decoding.

 # Examples
 ```
 use dirstream::{DirEntry, FileType};

 let entry = DirEntry::new(42, "notes.txt", libc::DT_REG);
 assert_eq!(entry.mode(), libc::S_IFREG);
 assert_eq!(entry.file_type(), FileType::RegularFile);
 ```
*/
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirEntry {
    pub(crate) ino: u64,
    pub(crate) name: String,
    pub(crate) mode: u32,
}

impl DirEntry {
    /// Builds an entry from its record fields, deriving the mode from `d_type`
    #[must_use]
    #[inline]
    pub fn new<S: Into<String>>(ino: u64, name: S, d_type: u8) -> Self {
        Self {
            ino,
            name: name.into(),
            mode: u32::from(d_type) << 12,
        }
    }

    /// The inode number, unique within the directory for this listing only
    #[must_use]
    #[inline]
    pub const fn ino(&self) -> u64 {
        self.ino
    }

    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The file type bits of a mode, the permission bits are always zero
    #[must_use]
    #[inline]
    pub const fn mode(&self) -> u32 {
        self.mode
    }

    #[must_use]
    #[inline]
    #[allow(clippy::cast_possible_truncation)] // mode_t is u32 on linux
    pub const fn file_type(&self) -> FileType {
        FileType::from_mode(self.mode as libc::mode_t)
    }

    #[must_use]
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.file_type() == FileType::Directory
    }

    /// `true` for the `.` and `..` entries every directory carries
    #[must_use]
    #[inline]
    pub fn is_dot_entry(&self) -> bool {
        matches!(self.name.as_str(), "." | "..")
    }

    /// Consumes the entry, returning the owned name
    #[must_use]
    #[inline]
    pub fn into_name(self) -> String {
        self.name
    }
}

impl fmt::Display for DirEntry {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_is_dtype_shifted() {
        let dir = DirEntry::new(7, "sub", libc::DT_DIR);
        assert_eq!(dir.mode(), 0o040_000);
        assert!(dir.is_dir());

        let unknown = DirEntry::new(8, "odd", libc::DT_UNKNOWN);
        assert_eq!(unknown.mode(), 0);
        assert_eq!(unknown.file_type(), FileType::Unknown);
    }

    #[test]
    fn dot_entries() {
        assert!(DirEntry::new(1, ".", libc::DT_DIR).is_dot_entry());
        assert!(DirEntry::new(2, "..", libc::DT_DIR).is_dot_entry());
        assert!(!DirEntry::new(3, "...", libc::DT_DIR).is_dot_entry());
        assert!(!DirEntry::new(4, ".hidden", libc::DT_REG).is_dot_entry());
    }
}

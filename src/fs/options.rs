use crate::DirStreamError;
use crate::fs::{DirEntry, FileType, Result};

/// Inode number reported for an in-memory synthetic entry
pub const SYNTHETIC_INO: u64 = u64::MAX;

/// Where a synthetic entry lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InjectionMode {
    /// Merged into the first batch in memory, the backing directory is untouched
    #[default]
    Virtual,
    /// Created in the backing directory when the listing is opened, so the
    /// kernel reports it like any other child. This mutates the filesystem
    /// being listed, every later listing (mounted or not) will see it.
    OnDisk,
}

/**
 One extra child to serve in every listing of a directory.

 # Examples
 ```
 use dirstream::{FileType, InjectionMode, SyntheticEntry};

 let entry = SyntheticEntry::new("!");
 assert_eq!(entry.file_type(), FileType::Directory);
 assert_eq!(entry.mode(), InjectionMode::Virtual);
 ```
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticEntry {
    pub(crate) name: String,
    pub(crate) file_type: FileType,
    pub(crate) mode: InjectionMode,
}

impl SyntheticEntry {
    /// A virtual directory named `name`
    #[must_use]
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            file_type: FileType::Directory,
            mode: InjectionMode::Virtual,
        }
    }

    #[must_use]
    pub const fn with_file_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type;
        self
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: InjectionMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn file_type(&self) -> FileType {
        self.file_type
    }

    #[must_use]
    pub const fn mode(&self) -> InjectionMode {
        self.mode
    }

    /// Checks the name is a single path component.
    ///
    /// # Errors
    /// `InvalidName` for empty names, `.`, `..`, or names holding `/` or NUL.
    pub fn validate(&self) -> Result<()> {
        let name = self.name.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
            return Err(DirStreamError::InvalidName(self.name.clone()));
        }
        if self.mode == InjectionMode::OnDisk
            && !matches!(self.file_type, FileType::Directory | FileType::RegularFile)
        {
            // only directories and plain files can be created without more input
            return Err(std::io::Error::from_raw_os_error(libc::EINVAL).into());
        }
        Ok(())
    }

    pub(crate) fn to_entry(&self) -> DirEntry {
        DirEntry::new(SYNTHETIC_INO, self.name.clone(), self.file_type.to_dtype())
    }
}

/// Knobs for one listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingOptions {
    pub(crate) synthetic: Option<SyntheticEntry>,
    pub(crate) skip_dot_entries: bool,
}

impl ListingOptions {
    #[must_use]
    pub fn with_synthetic(mut self, entry: SyntheticEntry) -> Self {
        self.synthetic = Some(entry);
        self
    }

    /// Drops `.` and `..` while decoding
    #[must_use]
    pub const fn skip_dot_entries(mut self, skip: bool) -> Self {
        self.skip_dot_entries = skip;
        self
    }

    #[must_use]
    pub const fn synthetic(&self) -> Option<&SyntheticEntry> {
        self.synthetic.as_ref()
    }

    #[must_use]
    pub const fn skips_dot_entries(&self) -> bool {
        self.skip_dot_entries
    }
}

mod buffer;
mod decode;
mod entry;
mod file_type;
mod list;
mod options;
#[cfg(any(target_os = "linux", target_os = "android"))]
mod reader;
mod stream;
mod types;

pub use buffer::AlignedBuffer;
pub use decode::{RawRecord, Records, decode_records, push_record};
pub use entry::DirEntry;
pub use file_type::FileType;
pub use list::ListDirStream;
pub use options::{InjectionMode, ListingOptions, SYNTHETIC_INO, SyntheticEntry};
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use reader::GetDents;
pub use stream::{DirEntryStream, DirStream, Entries};
pub use types::{BatchReader, FileDes, Result, SyscallBuffer};

/// Capacity of the buffer handed to each batched directory read.
///
/// One page fits roughly a hundred typical records, and keeps the cursor (which
/// embeds the buffer) cheap to create per `opendir`.
pub const BUFFER_SIZE: usize = 4096;

const_assert!(BUFFER_SIZE >= 4096, "Buffer size too small!");

/*!
 A batched directory-listing stream for passthrough (loopback) filesystems.

 The crate enumerates a directory on the underlying filesystem with `getdents64`,
 decodes each raw batch of `linux_dirent64` records into typed [`DirEntry`] values,
 optionally injects one synthetic entry, and serves the result one entry at a time
 through a closeable cursor ([`DirStream`]) that a filesystem-protocol dispatcher
 can drive.

 # Examples
 ```no_run
 use dirstream::{DirStream, ListingOptions, SyntheticEntry};

 fn main() -> dirstream::Result<()> {
     let options = ListingOptions::default().with_synthetic(SyntheticEntry::new("!"));
     let stream = DirStream::open_with("/tmp", &options)?;

     while stream.has_next() {
         let (entry, refill) = stream.next()?;
         println!("{} {:o} {}", entry.ino(), entry.mode(), entry.name());
         refill?;
     }

     stream.close();
     Ok(())
 }
 ```
*/
#![allow(clippy::pub_use)]
#![allow(clippy::implicit_return)]
#![allow(clippy::question_mark_used)]
#![allow(clippy::missing_inline_in_public_items)]
#![allow(clippy::single_call_fn)]
#![allow(clippy::std_instead_of_core)]
#![allow(clippy::module_name_repetitions)]

#[macro_use]
pub(crate) mod macros;

mod error;
pub use error::DirStreamError;

pub mod fs;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use fs::GetDents;
pub use fs::{
    BUFFER_SIZE, BatchReader, DirEntry, DirEntryStream, DirStream, FileType, InjectionMode,
    ListDirStream, ListingOptions, Result, SYNTHETIC_INO, SyntheticEntry, decode_records,
};

mod table;
pub use table::{ListingHandle, ListingTable};

/// Opens `path` for listing with default [`ListingOptions`].
///
/// This is the constructor a protocol dispatcher calls on `opendir`; the returned
/// stream must be closed exactly once (dropping it also closes it).
#[cfg(any(target_os = "linux", target_os = "android"))]
#[inline]
pub fn open_dir_stream<P: AsRef<std::path::Path>>(path: P) -> Result<DirStream> {
    DirStream::open(path)
}

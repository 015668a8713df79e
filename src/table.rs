use crate::DirStreamError;
use crate::fs::{DirEntry, DirEntryStream, ListingOptions, Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque id for an open listing, what a protocol dispatcher hands its client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListingHandle(pub u64);

/**
 The dispatcher side table of open listings.

 Maps handles to open streams so `readdir` and `releasedir` requests, which may
 arrive on different threads, can find their cursor. Streams are reference
 counted out of the map before use, so a slow `next` never blocks other
 listings, and [`release`](Self::release) closes a stream exactly once even
 while another thread is iterating it.
*/
#[derive(Debug, Default)]
pub struct ListingTable {
    streams: DashMap<u64, Arc<dyn DirEntryStream>>,
    next_handle: AtomicU64,
    options: ListingOptions,
}

impl ListingTable {
    /// A table that opens every listing with `options`
    #[must_use]
    pub fn new(options: ListingOptions) -> Self {
        Self {
            streams: DashMap::new(),
            next_handle: AtomicU64::new(0),
            options,
        }
    }

    /// Opens `path` and registers the stream.
    ///
    /// # Errors
    /// Any error [`DirStream::open_with`](crate::DirStream::open_with) returns.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn open<P: AsRef<std::path::Path>>(&self, path: P) -> Result<ListingHandle> {
        let stream = crate::fs::DirStream::open_with(path, &self.options)?;
        Ok(self.insert(Arc::new(stream)))
    }

    /// Registers an already open stream
    pub fn insert(&self, stream: Arc<dyn DirEntryStream>) -> ListingHandle {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed) + 1;
        self.streams.insert(handle, stream);
        log::debug!("registered listing handle {handle}");
        ListingHandle(handle)
    }

    fn get(&self, handle: ListingHandle) -> Result<Arc<dyn DirEntryStream>> {
        self.streams
            .get(&handle.0)
            .map(|stream| Arc::clone(stream.value()))
            .ok_or(DirStreamError::BadHandle(handle.0))
    }

    /// # Errors
    /// `BadHandle` if `handle` is not registered.
    pub fn has_next(&self, handle: ListingHandle) -> Result<bool> {
        Ok(self.get(handle)?.has_next())
    }

    /// Pops the next entry of the listing behind `handle`.
    ///
    /// # Errors
    /// `BadHandle` if `handle` is not registered, otherwise as
    /// [`DirEntryStream::next`].
    pub fn next(&self, handle: ListingHandle) -> Result<(DirEntry, Result<()>)> {
        self.get(handle)?.next()
    }

    /// Unregisters and closes the listing.
    ///
    /// # Errors
    /// `BadHandle` if `handle` is unknown or was already released.
    pub fn release(&self, handle: ListingHandle) -> Result<()> {
        let (_, stream) = self
            .streams
            .remove(&handle.0)
            .ok_or(DirStreamError::BadHandle(handle.0))?;
        stream.close();
        log::debug!("released listing handle {}", handle.0);
        Ok(())
    }

    /// Closes every open listing, for session teardown
    pub fn release_all(&self) {
        let handles: Vec<u64> = self.streams.iter().map(|entry| *entry.key()).collect();
        for handle in handles {
            if let Some((_, stream)) = self.streams.remove(&handle) {
                stream.close();
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

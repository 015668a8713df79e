use crate::DirStreamError;
use crate::fs::{DirEntry, DirEntryStream, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A stream over a prebuilt list of entries, for directories with no backing
/// directory handle (fully virtual directories).
#[derive(Debug)]
pub struct ListDirStream {
    entries: Mutex<Option<VecDeque<DirEntry>>>,
}

impl ListDirStream {
    /// Serves `entries` in the order given
    #[must_use]
    pub fn new<I: IntoIterator<Item = DirEntry>>(entries: I) -> Self {
        Self {
            entries: Mutex::new(Some(entries.into_iter().collect())),
        }
    }
}

impl DirEntryStream for ListDirStream {
    fn has_next(&self) -> bool {
        self.entries
            .lock()
            .as_ref()
            .is_some_and(|entries| !entries.is_empty())
    }

    fn next(&self) -> Result<(DirEntry, Result<()>)> {
        let mut guard = self.entries.lock();
        let entries = guard.as_mut().ok_or(DirStreamError::Closed)?;
        let entry = entries.pop_front().ok_or(DirStreamError::NoMoreEntries)?;
        Ok((entry, Ok(())))
    }

    fn close(&self) {
        self.entries.lock().take();
    }
}

use crate::DirStreamError;
use crate::fs::decode::{decode_into, sort_by_name};
use crate::fs::{BatchReader, DirEntry, InjectionMode, ListingOptions, Result, SyscallBuffer};
use core::fmt;
use parking_lot::Mutex;
use std::collections::VecDeque;

/**
 The cursor interface a protocol dispatcher drives for one `opendir` session.

 The dispatcher calls [`has_next`](Self::has_next) and [`next`](Self::next) until
 the listing is done, then [`close`](Self::close) exactly once, possibly from
 another thread while a `next` is still in flight.
*/
pub trait DirEntryStream: Send + Sync {
    /// `true` while at least one decoded entry is waiting to be delivered
    fn has_next(&self) -> bool;

    /// Pops the next entry, along with the outcome of the refill the pop triggered.
    ///
    /// # Errors
    /// `NoMoreEntries` when called while `has_next` is false, `Closed` after
    /// `close` or after a fatal read failure.
    fn next(&self) -> Result<(DirEntry, Result<()>)>;

    /// Releases the underlying handle. Calling it again is a no-op.
    fn close(&self);
}

impl fmt::Debug for dyn DirEntryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirEntryStream")
            .field("has_next", &self.has_next())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// The reader may still produce records
    Open,
    /// The reader returned 0 bytes, only the pending queue is left
    Exhausted,
    /// A read or decode failed, the handle is already released
    Failed,
    Closed,
}

struct StreamState<R> {
    /// `None` once the handle has been released
    reader: Option<R>,
    buffer: SyscallBuffer,
    pending: VecDeque<DirEntry>,
    phase: Phase,
    /// Virtual entry still waiting to be merged into the first batch
    synthetic: Option<DirEntry>,
    /// Name of the virtual entry once merged, filtered from every later batch
    injected: Option<String>,
    skip_dot_entries: bool,
}

impl<R: BatchReader> StreamState<R> {
    /// Refills the pending queue if it is empty and the reader is not exhausted.
    fn load(&mut self) -> Result<()> {
        while self.pending.is_empty() {
            match self.phase {
                Phase::Open => {}
                Phase::Exhausted => return Ok(()),
                Phase::Failed | Phase::Closed => return Err(DirStreamError::Closed),
            }
            let Some(reader) = self.reader.as_mut() else {
                return Err(DirStreamError::Closed);
            };

            let read = match reader.read_batch(self.buffer.as_mut_slice()) {
                Ok(read) => read,
                Err(error) => return Err(self.fail(error)),
            };

            if read == 0 {
                log::debug!("directory stream exhausted");
                self.phase = Phase::Exhausted;
                self.pending.extend(self.synthetic.take());
                continue;
            }

            let decoded = match self.buffer.filled(read) {
                Some(batch) => decode_into(batch, &mut self.pending, self.skip_dot_entries),
                None => Err(DirStreamError::MalformedRecord { offset: read }),
            };
            if let Err(error) = decoded {
                return Err(self.fail(error));
            }
            self.merge_synthetic();
            sort_by_name(&mut self.pending);
            log::trace!(
                "decoded {} entries from a {read} byte batch",
                self.pending.len()
            );
        }
        Ok(())
    }

    /**
     Merges the virtual entry into a freshly decoded batch.

     A real child with the same name wins: if the kernel reports it before the
     virtual entry went out, the virtual entry is dropped, otherwise the real one
     is filtered from every later batch. Each name is listed at most once.
    */
    fn merge_synthetic(&mut self) {
        if let Some(name) = self.injected.as_deref() {
            self.pending.retain(|entry| entry.name() != name);
            return;
        }
        let Some(synthetic) = self.synthetic.take() else {
            return;
        };
        if self
            .pending
            .iter()
            .any(|entry| entry.name() == synthetic.name())
        {
            log::debug!(
                "{:?} already exists, not injecting it",
                synthetic.name()
            );
            return;
        }
        self.injected = Some(synthetic.name().to_owned());
        self.pending.push_back(synthetic);
    }

    /// Puts the cursor into its terminal failed state and releases the handle
    fn fail(&mut self, error: DirStreamError) -> DirStreamError {
        log::debug!("directory stream failed: {error}");
        self.phase = Phase::Failed;
        self.pending.clear();
        self.synthetic = None;
        self.reader = None;
        error
    }

    fn close(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        self.phase = Phase::Closed;
        self.pending.clear();
        self.synthetic = None;
        if self.reader.take().is_some() {
            log::debug!("directory stream closed");
        }
    }
}

/**
 A lock-guarded cursor over one directory listing.

 Construction opens the directory and performs the first batched read, so a
 successfully created stream already knows whether the directory has entries.
 Each batch is decoded and sorted by name before any of it is served; a refill
 only happens once the previous batch has been fully delivered.

 Every method takes the same per-stream lock, so `close` may race `next` from
 another thread. Dropping the stream closes it.

 # Examples
 ```
 use dirstream::{DirStream, ListingOptions, SyntheticEntry};

 let dir = std::env::temp_dir().join("dirstream_doc_example");
 let _ = std::fs::remove_dir_all(&dir);
 std::fs::create_dir_all(&dir).unwrap();
 std::fs::write(dir.join("file1"), "").unwrap();
 std::fs::write(dir.join("file2"), "").unwrap();

 let options = ListingOptions::default()
     .skip_dot_entries(true)
     .with_synthetic(SyntheticEntry::new("!"));
 let stream = DirStream::open_with(&dir, &options).unwrap();

 let names: Vec<String> = stream.entries().map(|e| e.unwrap().into_name()).collect();
 assert_eq!(names, ["!", "file1", "file2"]);

 stream.close();
 stream.close(); // no-op
 let _ = std::fs::remove_dir_all(&dir);
 ```
*/
#[cfg(any(target_os = "linux", target_os = "android"))]
pub struct DirStream<R: BatchReader = crate::fs::GetDents> {
    state: Mutex<StreamState<R>>,
}

/// A lock-guarded cursor over one directory listing
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub struct DirStream<R: BatchReader> {
    state: Mutex<StreamState<R>>,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl DirStream<crate::fs::GetDents> {
    /// Opens `path` for listing with default options.
    ///
    /// # Errors
    /// `NotFound`, `NotADirectory`, `AccessDenied` or `OSerror` if the directory
    /// cannot be opened, or the error of the first read.
    #[inline]
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &ListingOptions::default())
    }

    /**
     Opens `path` for listing.

     With an [`InjectionMode::OnDisk`] synthetic entry this creates the entry in
     `path` before the first read. That is a real, persistent change to the
     directory being listed.

     # Errors
     As [`open`](Self::open), plus `InvalidName` for a bad synthetic entry.
    */
    pub fn open_with<P: AsRef<std::path::Path>>(path: P, options: &ListingOptions) -> Result<Self> {
        let path = path.as_ref();
        if let Some(synthetic) = options.synthetic() {
            synthetic.validate()?;
        }
        let reader = crate::fs::GetDents::open(path)?;

        if let Some(synthetic) = options
            .synthetic()
            .filter(|synthetic| synthetic.mode() == InjectionMode::OnDisk)
        {
            match reader.fd().create_child(synthetic.name(), synthetic.file_type()) {
                Ok(true) => log::debug!(
                    "created synthetic entry {:?} in {}",
                    synthetic.name(),
                    path.display()
                ),
                Ok(false) => {}
                Err(error) => log::warn!(
                    "could not create synthetic entry {:?} in {}: {error}",
                    synthetic.name(),
                    path.display()
                ),
            }
        }

        Self::from_reader(reader, options)
    }
}

impl<R: BatchReader> DirStream<R> {
    /**
     Builds a stream over any batch reader and performs the first load.

     Only a [`InjectionMode::Virtual`] synthetic entry applies here, there is no
     directory to create an on-disk one in.

     # Errors
     `InvalidName` for a bad synthetic entry, or the error of the first read.
     The reader is dropped before the error is returned.
    */
    pub fn from_reader(reader: R, options: &ListingOptions) -> Result<Self> {
        if let Some(synthetic) = options.synthetic() {
            synthetic.validate()?;
        }
        let synthetic = options
            .synthetic()
            .filter(|synthetic| synthetic.mode() == InjectionMode::Virtual)
            .map(crate::fs::SyntheticEntry::to_entry);

        let mut state = StreamState {
            reader: Some(reader),
            buffer: SyscallBuffer::new(),
            pending: VecDeque::new(),
            phase: Phase::Open,
            synthetic,
            injected: None,
            skip_dot_entries: options.skips_dot_entries(),
        };
        state.load()?;

        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// `true` while at least one decoded entry is waiting to be delivered
    #[must_use]
    #[inline]
    pub fn has_next(&self) -> bool {
        !self.state.lock().pending.is_empty()
    }

    /**
     Pops the next entry and refills the queue if that emptied it.

     The returned pair carries the entry and the outcome of the refill. A failed
     refill is fatal for the stream: the handle is released and later calls
     return `Closed`, but the entry popped before the failure is still delivered.

     # Errors
     `NoMoreEntries` if called while [`has_next`](Self::has_next) is false,
     `Closed` once the stream is closed or has failed.
    */
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> Result<(DirEntry, Result<()>)> {
        let mut state = self.state.lock();
        let Some(entry) = state.pending.pop_front() else {
            return Err(match state.phase {
                Phase::Open | Phase::Exhausted => DirStreamError::NoMoreEntries,
                Phase::Failed | Phase::Closed => DirStreamError::Closed,
            });
        };
        let refill = state.load();
        Ok((entry, refill))
    }

    /// Releases the directory handle. Never fails, and repeated calls are no-ops.
    #[inline]
    pub fn close(&self) {
        self.state.lock().close();
    }

    /// `true` once the handle is released, by [`close`](Self::close) or by a failed read
    #[must_use]
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self.state.lock().phase, Phase::Failed | Phase::Closed)
    }

    /// `true` once the reader has reported the end of the directory
    #[must_use]
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.state.lock().phase == Phase::Exhausted
    }

    /// Iterates the remaining entries, see [`Entries`]
    #[must_use]
    #[inline]
    pub const fn entries(&self) -> Entries<'_, R> {
        Entries {
            stream: self,
            deferred: None,
            done: false,
        }
    }
}

impl<R: BatchReader> Drop for DirStream<R> {
    #[inline]
    fn drop(&mut self) {
        self.state.get_mut().close();
    }
}

impl<R: BatchReader> fmt::Debug for DirStream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DirStream")
            .field("phase", &state.phase)
            .field("pending", &state.pending.len())
            .field("open", &state.reader.is_some())
            .finish()
    }
}

impl<R: BatchReader> DirEntryStream for DirStream<R> {
    #[inline]
    fn has_next(&self) -> bool {
        Self::has_next(self)
    }

    #[inline]
    fn next(&self) -> Result<(DirEntry, Result<()>)> {
        Self::next(self)
    }

    #[inline]
    fn close(&self) {
        Self::close(self);
    }
}

/**
 Iterator over the remaining entries of a [`DirStream`].

 Yields every entry as `Ok`, and a failed refill as one `Err` right after the
 entry whose pop triggered it. Ends when the stream is drained.
*/
#[derive(Debug)]
pub struct Entries<'stream, R: BatchReader> {
    stream: &'stream DirStream<R>,
    deferred: Option<DirStreamError>,
    done: bool,
}

impl<R: BatchReader> Iterator for Entries<'_, R> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(error) = self.deferred.take() {
            self.done = true;
            return Some(Err(error));
        }
        if self.done {
            return None;
        }
        match self.stream.next() {
            Ok((entry, Ok(()))) => Some(Ok(entry)),
            Ok((entry, Err(error))) => {
                self.deferred = Some(error);
                Some(Ok(entry))
            }
            Err(DirStreamError::NoMoreEntries) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

impl<R: BatchReader> core::iter::FusedIterator for Entries<'_, R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{SYNTHETIC_INO, SyntheticEntry, push_record};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves canned batches, then 0 forever, counting reads and releases
    struct ScriptedReader {
        batches: VecDeque<Result<Vec<u8>>>,
        reads: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl BatchReader for ScriptedReader {
        fn read_batch(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            match self.batches.pop_front() {
                None => Ok(0),
                Some(Ok(batch)) => {
                    buf[..batch.len()].copy_from_slice(&batch);
                    Ok(batch.len())
                }
                Some(Err(error)) => Err(error),
            }
        }
    }

    impl Drop for ScriptedReader {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Script {
        reader: ScriptedReader,
        reads: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    fn batch(names: &[&str]) -> Vec<u8> {
        let mut batch = Vec::new();
        for (index, name) in names.iter().enumerate() {
            push_record(&mut batch, 100 + index as u64, index as i64 + 1, libc::DT_REG, name)
                .unwrap();
        }
        batch
    }

    fn script(batches: Vec<Result<Vec<u8>>>) -> Script {
        let reads = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));
        Script {
            reader: ScriptedReader {
                batches: batches.into(),
                reads: Arc::clone(&reads),
                released: Arc::clone(&released),
            },
            reads,
            released,
        }
    }

    fn drain<R: BatchReader>(stream: &DirStream<R>) -> Vec<String> {
        stream
            .entries()
            .map(|entry| entry.unwrap().into_name())
            .collect()
    }

    fn io_error(code: i32) -> DirStreamError {
        std::io::Error::from_raw_os_error(code).into()
    }

    #[test]
    fn batch_is_sorted_before_delivery() {
        let s = script(vec![Ok(batch(&["b", "a", "c"]))]);
        let stream = DirStream::from_reader(s.reader, &ListingOptions::default()).unwrap();
        assert_eq!(drain(&stream), ["a", "b", "c"]);
    }

    #[test]
    fn synthetic_entry_sorts_first() {
        let s = script(vec![Ok(batch(&["file2", "file1"]))]);
        let options = ListingOptions::default().with_synthetic(SyntheticEntry::new("!"));
        let stream = DirStream::from_reader(s.reader, &options).unwrap();

        let (first, refill) = stream.next().unwrap();
        assert!(refill.is_ok());
        assert_eq!(first.name(), "!");
        assert_eq!(first.ino(), SYNTHETIC_INO);
        assert!(first.is_dir());
        assert_eq!(drain(&stream), ["file1", "file2"]);
    }

    #[test]
    fn synthetic_entry_yields_to_real_child() {
        let s = script(vec![Ok(batch(&["file1", "fake"]))]);
        let options = ListingOptions::default().with_synthetic(SyntheticEntry::new("fake"));
        let stream = DirStream::from_reader(s.reader, &options).unwrap();

        let (first, _) = stream.next().unwrap();
        assert_eq!(first.name(), "fake");
        assert_ne!(first.ino(), SYNTHETIC_INO);
        assert_eq!(drain(&stream), ["file1"]);
    }

    #[test]
    fn real_child_in_later_batch_is_not_listed_twice() {
        let s = script(vec![Ok(batch(&["a"])), Ok(batch(&["fake", "z"]))]);
        let options = ListingOptions::default().with_synthetic(SyntheticEntry::new("fake"));
        let stream = DirStream::from_reader(s.reader, &options).unwrap();
        assert_eq!(drain(&stream), ["a", "fake", "z"]);
    }

    #[test]
    fn synthetic_entry_in_empty_directory() {
        let s = script(vec![]);
        let options = ListingOptions::default().with_synthetic(SyntheticEntry::new("fake"));
        let stream = DirStream::from_reader(s.reader, &options).unwrap();
        assert!(stream.is_exhausted());
        assert_eq!(drain(&stream), ["fake"]);
    }

    #[test]
    fn synthetic_entry_is_delivered_once() {
        let s = script(vec![Ok(batch(&["x"])), Ok(batch(&["y"]))]);
        let options = ListingOptions::default().with_synthetic(SyntheticEntry::new("!"));
        let stream = DirStream::from_reader(s.reader, &options).unwrap();
        assert_eq!(drain(&stream), ["!", "x", "y"]);
    }

    #[test]
    fn exhaustion_is_permanent() {
        let s = script(vec![Ok(batch(&["only"]))]);
        let stream = DirStream::from_reader(s.reader, &ListingOptions::default()).unwrap();
        assert!(stream.has_next());
        assert_eq!(s.reads.load(Ordering::SeqCst), 1);

        let (entry, refill) = stream.next().unwrap();
        assert_eq!(entry.name(), "only");
        assert!(refill.is_ok());
        assert!(stream.is_exhausted());
        assert_eq!(s.reads.load(Ordering::SeqCst), 2);

        for _ in 0..3 {
            assert!(!stream.has_next());
            assert!(matches!(stream.next(), Err(DirStreamError::NoMoreEntries)));
        }
        // the reader is never asked again once it reported the end
        assert_eq!(s.reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn close_is_idempotent() {
        let s = script(vec![Ok(batch(&["a", "b"]))]);
        let stream = DirStream::from_reader(s.reader, &ListingOptions::default()).unwrap();
        stream.close();
        stream.close();
        assert_eq!(s.released.load(Ordering::SeqCst), 1);
        assert!(stream.is_closed());
        assert!(!stream.has_next());
        assert!(matches!(stream.next(), Err(DirStreamError::Closed)));
        drop(stream);
        assert_eq!(s.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases_reader() {
        let s = script(vec![Ok(batch(&["a"]))]);
        let stream = DirStream::from_reader(s.reader, &ListingOptions::default()).unwrap();
        drop(stream);
        assert_eq!(s.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn refill_error_surfaces_on_triggering_next() {
        let s = script(vec![Ok(batch(&["a"])), Err(io_error(libc::EIO))]);
        let stream = DirStream::from_reader(s.reader, &ListingOptions::default()).unwrap();

        let (entry, refill) = stream.next().unwrap();
        assert_eq!(entry.name(), "a");
        let error = refill.unwrap_err();
        assert_eq!(error.errno(), libc::EIO);

        // failed streams release their handle straight away
        assert_eq!(s.released.load(Ordering::SeqCst), 1);
        assert!(stream.is_closed());
        assert!(!stream.has_next());
        assert!(matches!(stream.next(), Err(DirStreamError::Closed)));

        stream.close();
        assert_eq!(s.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn first_load_error_fails_construction() {
        let s = script(vec![Err(io_error(libc::EIO))]);
        let result = DirStream::from_reader(s.reader, &ListingOptions::default());
        assert!(matches!(result, Err(DirStreamError::OSerror(_))));
        assert_eq!(s.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn malformed_batch_fails_stream() {
        let mut bad = batch(&["a"]);
        bad.truncate(bad.len() - 1);
        let s = script(vec![Ok(batch(&["first"])), Ok(bad)]);
        let stream = DirStream::from_reader(s.reader, &ListingOptions::default()).unwrap();

        let (_, refill) = stream.next().unwrap();
        assert!(matches!(
            refill,
            Err(DirStreamError::MalformedRecord { offset: 0 })
        ));
        assert!(!stream.has_next());
    }

    #[test]
    fn sequential_batches_are_disjoint() {
        let s = script(vec![Ok(batch(&["d", "c"])), Ok(batch(&["b", "a"]))]);
        let stream = DirStream::from_reader(s.reader, &ListingOptions::default()).unwrap();
        // sorting is per batch, each record is delivered exactly once
        assert_eq!(drain(&stream), ["c", "d", "a", "b"]);
        assert_eq!(s.reads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn dot_only_batch_refills_until_entries() {
        let s = script(vec![Ok(batch(&[".", ".."])), Ok(batch(&["real"]))]);
        let options = ListingOptions::default().skip_dot_entries(true);
        let stream = DirStream::from_reader(s.reader, &options).unwrap();
        assert!(stream.has_next());
        assert_eq!(drain(&stream), ["real"]);
    }

    #[test]
    fn invalid_synthetic_name_rejected_before_reading() {
        let s = script(vec![Ok(batch(&["a"]))]);
        let options = ListingOptions::default().with_synthetic(SyntheticEntry::new("a/b"));
        let result = DirStream::from_reader(s.reader, &options);
        assert!(matches!(result, Err(DirStreamError::InvalidName(_))));
        assert_eq!(s.reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn entries_reports_deferred_refill_error() {
        let s = script(vec![Ok(batch(&["a", "b"])), Err(io_error(libc::EIO))]);
        let stream = DirStream::from_reader(s.reader, &ListingOptions::default()).unwrap();
        let results: Vec<_> = stream.entries().collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().name(), "a");
        assert_eq!(results[1].as_ref().unwrap().name(), "b");
        assert!(results[2].is_err());
    }

    #[test]
    fn close_from_another_thread() {
        let names: Vec<String> = (0..500).map(|index| format!("entry{index:04}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let batches = refs.chunks(50).map(|chunk| Ok(batch(chunk))).collect();
        let s = script(batches);
        let stream = Arc::new(
            DirStream::from_reader(s.reader, &ListingOptions::default()).unwrap(),
        );

        let closer = {
            let stream = Arc::clone(&stream);
            std::thread::spawn(move || stream.close())
        };
        let mut delivered = 0;
        while stream.has_next() {
            match stream.next() {
                Ok(_) => delivered += 1,
                Err(error) => {
                    assert!(matches!(error, DirStreamError::Closed));
                    break;
                }
            }
        }
        closer.join().unwrap();

        assert!(delivered <= 500);
        assert!(stream.is_closed());
        assert_eq!(s.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn works_through_trait_object() {
        let s = script(vec![Ok(batch(&["z", "y"]))]);
        let stream: Box<dyn DirEntryStream> =
            Box::new(DirStream::from_reader(s.reader, &ListingOptions::default()).unwrap());
        let (entry, _) = stream.next().unwrap();
        assert_eq!(entry.name(), "y");
        stream.close();
        assert!(!stream.has_next());
    }
}

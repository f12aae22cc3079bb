//! Thread-safe façade over one attached log file.
//!
//! `LogData` owns the committed index snapshot, the read handle on the file,
//! and the background worker. Callers attach a file, then read lines by index
//! while the worker keeps the snapshot up to date. Progress, completion and
//! file change notifications are fanned out to every `subscribe()` receiver.
//!
//! Two locks guard the state: the data lock (snapshot) and the file lock
//! (handle and recorded metadata). When both are needed, the data lock is
//! taken first. Neither is ever held while the worker's own locks are taken.

mod file;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::SystemTime;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::config::LogDataConfig;
use crate::decode::{expand_tabs, TextDecoder, Utf8Decoder};
use crate::error::{LogDataError, Result};
use crate::indexer::{strip_terminator, IndexSnapshot};
use crate::types::{LoadingStatus, LogDataEvent, MonitoredFileStatus};
use crate::worker::{Operation, OperationRequest, Worker, WorkerEvent, WorkerState};

pub use file::FileStat;
use file::AttachedFile;

struct Inner {
    config: LogDataConfig,
    decoder: Arc<dyn TextDecoder>,
    data: Mutex<IndexSnapshot>,
    file: Mutex<AttachedFile>,
    generation: AtomicU64,
    subscribers: Mutex<Vec<Sender<LogDataEvent>>>,
    worker: Worker,
}

/// Handle on an indexed log file. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct LogData {
    inner: Arc<Inner>,
}

/// Non-owning handle, for collaborators that must not keep a `LogData` alive.
#[derive(Clone, Default)]
pub struct WeakLogData {
    inner: Weak<Inner>,
}

impl WeakLogData {
    pub fn upgrade(&self) -> Option<LogData> {
        self.inner.upgrade().map(|inner| LogData { inner })
    }
}

impl std::fmt::Debug for LogData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogData")
            .field("file_name", &self.file_name())
            .field("line_count", &self.line_count())
            .field("indexed_size", &self.indexed_size())
            .field("worker", &self.inner.worker)
            .finish()
    }
}

impl LogData {
    /// Creates an unattached instance with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(LogDataConfig::default())
    }

    pub fn with_config(config: LogDataConfig) -> Result<Self> {
        Self::with_decoder(config, Arc::new(Utf8Decoder))
    }

    /// Creates an unattached instance decoding lines with `decoder`.
    pub fn with_decoder(config: LogDataConfig, decoder: Arc<dyn TextDecoder>) -> Result<Self> {
        config.validate()?;

        // The worker is spawned before `Inner` exists; its observer finds the
        // coordinator through this link once it is set.
        let link: Arc<OnceLock<Weak<Inner>>> = Arc::new(OnceLock::new());
        let observer_link = link.clone();
        let worker = Worker::spawn(config.clone(), decoder.clone(), move |event| {
            if let Some(inner) = observer_link.get().and_then(Weak::upgrade) {
                inner.on_worker_event(event);
            }
        })?;

        let inner = Arc::new(Inner {
            config,
            decoder,
            data: Mutex::new(IndexSnapshot::default()),
            file: Mutex::new(AttachedFile::default()),
            generation: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
            worker,
        });
        let _ = link.set(Arc::downgrade(&inner));
        Ok(Self { inner })
    }

    pub fn downgrade(&self) -> WeakLogData {
        WeakLogData {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Registers a new receiver for notifications.
    pub fn subscribe(&self) -> Receiver<LogDataEvent> {
        let (tx, rx) = unbounded();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    /// Attaches `path` and starts indexing it in the background.
    ///
    /// The file does not need to exist yet. Returns immediately; completion
    /// is reported as `LoadingFinished`.
    pub fn attach_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        if let Some(current) = self.file_name() {
            return Err(LogDataError::AlreadyAttached(current));
        }
        let opened = AttachedFile::open(path.clone());
        let generation = {
            let mut data = self.inner.data.lock();
            let mut file = self.inner.file.lock();
            if let Some(current) = &file.path {
                return Err(LogDataError::AlreadyAttached(current.clone()));
            }
            *data = IndexSnapshot::default();
            *file = opened;
            log::info!(
                "logdata attach path={} size={} exists={}",
                path.display(),
                file.stat.size,
                file.is_open()
            );
            self.inner.bump_generation()
        };
        self.inner
            .worker
            .submit(Operation::new(OperationRequest::Attach(path), generation));
        Ok(())
    }

    /// Stops indexing and forgets the attached file. No-op when unattached.
    pub fn detach_file(&self) {
        {
            let mut data = self.inner.data.lock();
            let mut file = self.inner.file.lock();
            let Some(path) = file.path.take() else {
                return;
            };
            log::info!("logdata detach path={}", path.display());
            *data = IndexSnapshot::default();
            *file = AttachedFile::default();
            self.inner.bump_generation();
        }
        self.inner.worker.cancel_all();
    }

    /// Interrupts the running operation, if any.
    ///
    /// The interrupted operation reports `LoadingFinished(Interrupted)` and
    /// commits nothing; already committed data stays readable.
    pub fn interrupt_loading(&self) {
        if self.inner.worker.interrupt() {
            log::debug!("logdata interrupt requested");
        }
    }

    /// Discards the index and metadata and fully re-indexes the file.
    pub fn reload(&self) -> Result<()> {
        let generation = loop {
            let path = self.file_name().ok_or(LogDataError::NotAttached)?;
            let reopened = AttachedFile::open(path.clone());

            let mut data = self.inner.data.lock();
            let mut file = self.inner.file.lock();
            match &file.path {
                None => return Err(LogDataError::NotAttached),
                // Reattached while the file was reopened.
                Some(current) if *current != path => continue,
                Some(_) => {}
            }
            log::info!("logdata reload path={}", path.display());
            *data = IndexSnapshot::default();
            *file = reopened;
            break self.inner.bump_generation();
        };
        self.inner
            .worker
            .interrupt_and_submit(Operation::new(OperationRequest::FullIndex, generation));
        Ok(())
    }

    /// Re-examines the attached file and schedules the matching index work.
    ///
    /// Emits `FileChanged` unless this is a repeated `Unchanged`.
    pub fn file_changed_on_disk(&self) -> MonitoredFileStatus {
        let Some(path) = self.file_name() else {
            return MonitoredFileStatus::Unchanged;
        };
        let current = FileStat::of(&path);

        let (status, operation) = {
            let mut data = self.inner.data.lock();
            let mut file = self.inner.file.lock();
            if file.path.as_ref() != Some(&path) {
                return MonitoredFileStatus::Unchanged;
            }
            let status = file.classify(current);
            if status == MonitoredFileStatus::Unchanged
                && file.last_status == Some(MonitoredFileStatus::Unchanged)
            {
                return status;
            }
            file.last_status = Some(status);

            let operation = match status {
                MonitoredFileStatus::Unchanged => None,
                MonitoredFileStatus::DataAdded => Some(Operation::new(
                    OperationRequest::PartialIndex(data.indexed_size),
                    self.inner.generation.load(Ordering::Acquire),
                )),
                MonitoredFileStatus::Truncated => {
                    *data = IndexSnapshot::default();
                    file.stat = current;
                    file.close();
                    Some(Operation::new(
                        OperationRequest::FullIndex,
                        self.inner.bump_generation(),
                    ))
                }
            };
            log::debug!(
                "logdata file changed path={} status={} size={}",
                path.display(),
                status.as_str(),
                current.size
            );
            (status, operation)
        };

        if status == MonitoredFileStatus::Truncated {
            // The snapshot is empty, so no reader needs the handle meanwhile.
            self.inner.file.lock().reopen();
        }
        self.inner.publish(LogDataEvent::FileChanged(status));
        match operation {
            Some(operation) if operation.request.is_full() => {
                self.inner.worker.interrupt_and_submit(operation);
            }
            Some(operation) => {
                self.inner.worker.submit(operation);
            }
            None => {}
        }
        status
    }

    pub fn is_attached(&self) -> bool {
        self.inner.file.lock().path.is_some()
    }

    pub fn file_name(&self) -> Option<PathBuf> {
        self.inner.file.lock().path.clone()
    }

    /// Size of the file when it was last indexed.
    pub fn file_size(&self) -> u64 {
        self.inner.file.lock().stat.size
    }

    pub fn last_modified(&self) -> Option<SystemTime> {
        self.inner.file.lock().stat.modified
    }

    pub fn loading_state(&self) -> WorkerState {
        self.inner.worker.state()
    }

    pub fn line_count(&self) -> usize {
        self.inner.data.lock().line_count()
    }

    pub fn max_line_length(&self) -> usize {
        self.inner.data.lock().max_line_length
    }

    pub fn indexed_size(&self) -> u64 {
        self.inner.data.lock().indexed_size
    }

    /// Copy of the committed snapshot.
    pub fn snapshot(&self) -> IndexSnapshot {
        self.inner.data.lock().clone()
    }

    /// Text of `line` without its terminator.
    pub fn line_text(&self, line: usize) -> Result<String> {
        let mut lines = self.read_lines(line, 1)?;
        Ok(lines.pop().unwrap_or_default())
    }

    /// Text of `line` with tabs expanded.
    pub fn expanded_line_text(&self, line: usize) -> Result<String> {
        let text = self.line_text(line)?;
        Ok(expand_tabs(&text, self.inner.config.tab_stop))
    }

    /// Display width of `line` with tabs expanded.
    ///
    /// Measured like `max_line_length`, so it never exceeds it.
    pub fn line_length(&self, line: usize) -> Result<usize> {
        let decoder = self.inner.decoder.as_ref();
        let tab_stop = self.inner.config.tab_stop;
        let mut widths = self.map_lines(line, 1, |bytes| decoder.line_width(bytes, tab_stop))?;
        Ok(widths.pop().unwrap_or_default())
    }

    /// Text of `count` lines starting at `first`.
    pub fn lines(&self, first: usize, count: usize) -> Result<Vec<String>> {
        self.read_lines(first, count)
    }

    pub fn expanded_lines(&self, first: usize, count: usize) -> Result<Vec<String>> {
        let tab_stop = self.inner.config.tab_stop;
        Ok(self
            .read_lines(first, count)?
            .iter()
            .map(|text| expand_tabs(text, tab_stop))
            .collect())
    }

    fn read_lines(&self, first: usize, count: usize) -> Result<Vec<String>> {
        let decoder = self.inner.decoder.as_ref();
        self.map_lines(first, count, |bytes| decoder.decode(bytes))
    }

    /// Applies `each` to the bytes of `count` lines from `first`, terminators
    /// stripped.
    fn map_lines<T>(
        &self,
        first: usize,
        count: usize,
        mut each: impl FnMut(&[u8]) -> T,
    ) -> Result<Vec<T>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        // Offsets are copied so the data lock is not held during file I/O.
        let (starts, end) = {
            let data = self.inner.data.lock();
            let line_count = data.line_count();
            let Some((_, end)) = data.lines_span(first, count) else {
                let line = if first >= line_count {
                    first
                } else {
                    first.saturating_add(count - 1)
                };
                return Err(LogDataError::LineOutOfRange {
                    line,
                    count: line_count,
                });
            };
            (data.line_index[first..first + count].to_vec(), end)
        };

        let start = starts[0];
        let bytes = self.inner.file.lock().read_range(start, end)?;

        let lines = starts
            .iter()
            .enumerate()
            .map(|(i, &line_start)| {
                let from = (line_start - start) as usize;
                let to = starts
                    .get(i + 1)
                    .map_or(bytes.len(), |&next| (next - start) as usize);
                each(strip_terminator(&bytes[from..to]))
            })
            .collect();
        Ok(lines)
    }
}

impl Inner {
    /// Must be called with the data lock held.
    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    fn publish(&self, event: LogDataEvent) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event).is_ok());
    }

    fn on_worker_event(&self, event: WorkerEvent) {
        match event {
            WorkerEvent::Progress {
                generation,
                percent,
            } => {
                if self.is_current(generation) {
                    self.publish(LogDataEvent::LoadingProgressed(percent));
                }
            }
            WorkerEvent::Finished { generation, status } => {
                self.indexing_finished(generation, status);
            }
        }
    }

    /// Runs on the worker thread after each operation.
    fn indexing_finished(&self, generation: u64, status: LoadingStatus) {
        // Only the worker thread writes the worker's data, so this copy
        // cannot change before it is committed below.
        let snapshot = (status == LoadingStatus::Success).then(|| self.worker.indexing_data());

        // Metadata and a handle for a file that appeared are fetched before
        // the data lock is taken.
        let refreshed = match &snapshot {
            Some(_) => {
                let (path, is_open) = {
                    let file = self.file.lock();
                    (file.path.clone(), file.is_open())
                };
                path.map(|path| {
                    let modified = FileStat::of(&path).modified;
                    let handle = if is_open { None } else { File::open(&path).ok() };
                    (modified, handle)
                })
            }
            None => None,
        };

        let status = {
            let mut data = self.data.lock();
            if !self.is_current(generation) {
                log::debug!(
                    "logdata dropping stale completion generation={generation} status={}",
                    status.as_str()
                );
                LoadingStatus::Interrupted
            } else {
                if let Some(snapshot) = snapshot {
                    let mut file = self.file.lock();
                    if let Some((modified, handle)) = refreshed {
                        file.stat = FileStat {
                            size: snapshot.indexed_size,
                            modified,
                        };
                        if let Some(handle) = handle {
                            file.adopt_handle(handle);
                        }
                    }
                    *data = snapshot;
                }
                status
            }
        };

        log::info!(
            "logdata loading finished status={} generation={generation}",
            status.as_str()
        );
        self.publish(LogDataEvent::LoadingFinished(status));
    }
}

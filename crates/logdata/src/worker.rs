//! Background indexing worker.
//!
//! One long-lived thread per `LogData`. It waits on a single-slot mailbox,
//! runs one index operation at a time, commits the result into its own
//! `IndexingData` and reports back through an observer callback. The thread
//! is spawned once and joined on drop; a failed or panicking scan only ends
//! that operation.

mod slot;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::cancel::CancellationToken;
use crate::config::LogDataConfig;
use crate::decode::TextDecoder;
use crate::error::{LogDataError, Result};
use crate::indexer::{full_index, partial_index, IndexSnapshot, IndexingData, ScanContext};
use crate::types::LoadingStatus;

pub use slot::{RequestSlot, SubmitOutcome};

/// Work the coordinator can ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationRequest {
    /// Switch to a new file and fully index it.
    Attach(PathBuf),
    /// Fully re-index the current file.
    FullIndex,
    /// Index bytes appended after the given offset.
    PartialIndex(u64),
}

impl OperationRequest {
    pub fn is_full(&self) -> bool {
        !matches!(self, Self::PartialIndex(_))
    }

    /// Precedence when coalescing: a pending request is only displaced by
    /// one of equal or higher rank.
    fn rank(&self) -> u8 {
        match self {
            Self::Attach(_) => 2,
            Self::FullIndex => 1,
            Self::PartialIndex(_) => 0,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Attach(_) => "attach",
            Self::FullIndex => "full",
            Self::PartialIndex(_) => "partial",
        }
    }
}

/// A request tagged with the coordinator generation that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub request: OperationRequest,
    pub generation: u64,
}

impl Operation {
    pub fn new(request: OperationRequest, generation: u64) -> Self {
        Self {
            request,
            generation,
        }
    }
}

/// Worker state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Interrupting,
}

impl WorkerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Interrupting => "interrupting",
        }
    }
}

/// Events emitted from the worker thread, in order, for each operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    Progress { generation: u64, percent: u8 },
    Finished { generation: u64, status: LoadingStatus },
}

type Observer = dyn Fn(WorkerEvent) + Send + Sync;

struct WorkerShared {
    slot: RequestSlot,
    data: IndexingData,
    config: LogDataConfig,
    decoder: Arc<dyn TextDecoder>,
}

pub struct Worker {
    shared: Arc<WorkerShared>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("state", &self.state())
            .field("indexed_size", &self.shared.data.indexed_size())
            .finish()
    }
}

impl Worker {
    /// Spawns the worker thread.
    pub fn spawn(
        config: LogDataConfig,
        decoder: Arc<dyn TextDecoder>,
        observer: impl Fn(WorkerEvent) + Send + Sync + 'static,
    ) -> Result<Self> {
        let shared = Arc::new(WorkerShared {
            slot: RequestSlot::new(),
            data: IndexingData::new(),
            config,
            decoder,
        });
        let thread_shared = shared.clone();
        let observer: Box<Observer> = Box::new(observer);
        let handle = thread::Builder::new()
            .name("logdata-worker".to_string())
            .spawn(move || run(&thread_shared, observer.as_ref()))
            .map_err(|error| {
                LogDataError::Worker(format!("failed to spawn indexing thread: {error}"))
            })?;

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Posts an operation; never blocks on the running one.
    pub fn submit(&self, operation: Operation) -> SubmitOutcome {
        log::debug!(
            "logdata worker submit op={} generation={}",
            operation.request.name(),
            operation.generation
        );
        self.shared.slot.submit(operation)
    }

    /// Interrupts the running operation, then posts `operation`.
    pub fn interrupt_and_submit(&self, operation: Operation) -> SubmitOutcome {
        log::debug!(
            "logdata worker interrupt+submit op={} generation={}",
            operation.request.name(),
            operation.generation
        );
        self.shared.slot.interrupt_and_submit(operation)
    }

    /// Requests interruption of the running operation. Idempotent.
    pub fn interrupt(&self) -> bool {
        self.shared.slot.interrupt()
    }

    /// Interrupts the running operation and forgets the pending one.
    pub fn cancel_all(&self) {
        self.shared.slot.cancel_all();
    }

    /// Copy of the worker's current indexing data.
    pub fn indexing_data(&self) -> IndexSnapshot {
        self.shared.data.get_all()
    }

    pub fn state(&self) -> WorkerState {
        self.shared.slot.state()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shared.slot.shutdown();
        let Some(handle) = self.handle.take() else {
            return;
        };
        // The last owner may be released from inside the observer, on the
        // worker thread itself; that thread exits on its own after shutdown.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::warn!("logdata worker thread panicked");
        }
    }
}

fn run(shared: &WorkerShared, observer: &Observer) {
    let mut file_name: Option<PathBuf> = None;
    while let Some((operation, cancel)) = shared.slot.wait_next() {
        let generation = operation.generation;
        let status = execute(shared, &mut file_name, operation, &cancel, observer);
        observer(WorkerEvent::Finished { generation, status });
    }
    log::debug!("logdata worker stopped");
}

enum ScanResult {
    Full(IndexSnapshot),
    Partial(crate::indexer::IndexDelta),
}

fn execute(
    shared: &WorkerShared,
    file_name: &mut Option<PathBuf>,
    operation: Operation,
    cancel: &CancellationToken,
    observer: &Observer,
) -> LoadingStatus {
    let started = Instant::now();
    let generation = operation.generation;
    let op_name = operation.request.name();

    if let OperationRequest::Attach(path) = &operation.request {
        *file_name = Some(path.clone());
    }
    let Some(path) = file_name.clone() else {
        log::warn!("logdata worker op={op_name} without an attached file");
        shared.slot.finish_current(|| {});
        return LoadingStatus::Failure;
    };
    if operation.request.is_full() {
        // An interrupted full scan must leave nothing a later partial
        // scan could build on.
        shared.data.clear();
    }

    let progress = |percent: u8| observer(WorkerEvent::Progress { generation, percent });
    let ctx = ScanContext {
        config: &shared.config,
        decoder: shared.decoder.as_ref(),
        cancel,
        progress: &progress,
    };

    let scanned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        scan(shared, &path, &operation.request, &ctx)
    }));

    let result = match scanned {
        Ok(Ok(Some(result))) => result,
        Ok(Ok(None)) => {
            shared.slot.finish_current(|| {});
            log::debug!(
                "logdata worker op={op_name} interrupted path={} elapsed_ms={}",
                path.display(),
                started.elapsed().as_millis()
            );
            return LoadingStatus::Interrupted;
        }
        Ok(Err(error)) => {
            shared.slot.finish_current(|| {});
            log::warn!(
                "logdata worker op={op_name} failed path={}: {error}",
                path.display()
            );
            return LoadingStatus::Failure;
        }
        Err(panic_info) => {
            shared.slot.finish_current(|| {});
            let message = panic_info
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic_info.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "scan panicked".to_string());
            log::warn!(
                "logdata worker op={op_name} panicked path={}: {message}",
                path.display()
            );
            return LoadingStatus::Failure;
        }
    };

    let committed = shared.slot.finish_current(|| match result {
        ScanResult::Full(snapshot) => shared.data.set_all(snapshot),
        ScanResult::Partial(delta) => {
            shared
                .data
                .add_all(delta.added_size, delta.max_line_length, &delta.line_starts)
        }
    });
    if !committed {
        return LoadingStatus::Interrupted;
    }

    let snapshot = shared.data.get_all();
    log::debug!(
        "logdata worker op={op_name} done path={} lines={} indexed_size={} elapsed_ms={}",
        path.display(),
        snapshot.line_count(),
        snapshot.indexed_size,
        started.elapsed().as_millis()
    );
    LoadingStatus::Success
}

fn scan(
    shared: &WorkerShared,
    path: &Path,
    request: &OperationRequest,
    ctx: &ScanContext<'_>,
) -> std::io::Result<Option<ScanResult>> {
    match request {
        OperationRequest::Attach(_) | OperationRequest::FullIndex => {
            Ok(full_index(path, ctx)?.map(ScanResult::Full))
        }
        OperationRequest::PartialIndex(requested) => {
            let prior = shared.data.get_all();
            if *requested != prior.indexed_size {
                log::debug!(
                    "logdata worker partial resumes at {} instead of requested {}",
                    prior.indexed_size,
                    requested
                );
            }
            Ok(partial_index(path, &prior, ctx)?.map(ScanResult::Partial))
        }
    }
}

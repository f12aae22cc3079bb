//! Single-slot request mailbox for the worker thread.
//!
//! Holds the running operation's cancellation token and at most one pending
//! operation. A new submission overwrites the pending one instead of queueing
//! behind it, except that a partial index never displaces a pending full
//! index, which already covers it.

use parking_lot::{Condvar, Mutex};

use super::{Operation, WorkerState};
use crate::cancel::CancellationToken;

/// What happened to a submitted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The slot was empty.
    Enqueued,
    /// A pending operation was replaced.
    Coalesced,
    /// A pending operation already covers this one; only its generation moved.
    Absorbed,
    /// The worker is shutting down.
    Closed,
}

#[derive(Debug, Default)]
struct SlotState {
    pending: Option<Operation>,
    running: Option<CancellationToken>,
    terminate: bool,
}

#[derive(Debug, Default)]
pub struct RequestSlot {
    state: Mutex<SlotState>,
    wake: Condvar,
}

impl RequestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&self, operation: Operation) -> SubmitOutcome {
        let mut state = self.state.lock();
        let outcome = Self::place(&mut state, operation);
        self.wake.notify_one();
        outcome
    }

    /// Interrupts the running operation and submits `operation` atomically.
    pub fn interrupt_and_submit(&self, operation: Operation) -> SubmitOutcome {
        let mut state = self.state.lock();
        if let Some(cancel) = &state.running {
            cancel.cancel();
        }
        let outcome = Self::place(&mut state, operation);
        self.wake.notify_one();
        outcome
    }

    /// Cancels the running operation. Returns false when idle.
    pub fn interrupt(&self) -> bool {
        let state = self.state.lock();
        match &state.running {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels the running operation and drops the pending one.
    pub fn cancel_all(&self) {
        let mut state = self.state.lock();
        if let Some(cancel) = &state.running {
            cancel.cancel();
        }
        state.pending = None;
    }

    /// Blocks until an operation is pending and marks it running.
    ///
    /// Returns `None` once the slot is shut down.
    pub fn wait_next(&self) -> Option<(Operation, CancellationToken)> {
        let mut state = self.state.lock();
        loop {
            if state.terminate {
                return None;
            }
            if let Some(operation) = state.pending.take() {
                let cancel = CancellationToken::new();
                state.running = Some(cancel.clone());
                return Some((operation, cancel));
            }
            self.wake.wait(&mut state);
        }
    }

    /// Marks the running operation finished.
    ///
    /// `commit` runs under the slot lock only if the operation was not
    /// cancelled, so once `interrupt` returns the interrupted operation can
    /// no longer publish its results. Returns whether `commit` ran.
    pub fn finish_current(&self, commit: impl FnOnce()) -> bool {
        let mut state = self.state.lock();
        let cancelled = state
            .running
            .take()
            .map_or(true, |cancel| cancel.is_cancelled());
        if !cancelled {
            commit();
        }
        !cancelled
    }

    pub fn state(&self) -> WorkerState {
        let state = self.state.lock();
        match &state.running {
            Some(cancel) if cancel.is_cancelled() => WorkerState::Interrupting,
            Some(_) => WorkerState::Running,
            None => WorkerState::Idle,
        }
    }

    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.terminate = true;
        if let Some(cancel) = &state.running {
            cancel.cancel();
        }
        state.pending = None;
        self.wake.notify_all();
    }

    fn place(state: &mut SlotState, operation: Operation) -> SubmitOutcome {
        if state.terminate {
            return SubmitOutcome::Closed;
        }
        match state.pending.as_mut() {
            None => {
                state.pending = Some(operation);
                SubmitOutcome::Enqueued
            }
            Some(pending) if pending.request.rank() > operation.request.rank() => {
                pending.generation = pending.generation.max(operation.generation);
                SubmitOutcome::Absorbed
            }
            Some(pending) => {
                *pending = operation;
                SubmitOutcome::Coalesced
            }
        }
    }
}

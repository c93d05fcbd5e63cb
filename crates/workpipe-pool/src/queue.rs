use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use workpipe_frame::CorrelationId;

/// One assignment handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WorkItem {
    Task { id: CorrelationId, payload: Bytes },
    /// Terminates exactly one worker.
    Poison,
}

/// FIFO between the down dispatcher and the workers.
///
/// Each push wakes at most one waiting worker. Only `close` wakes them all.
#[derive(Default)]
pub(crate) struct WorkQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<WorkItem>,
    waiting: usize,
    closed: bool,
}

impl WorkQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append an item. Returns `false` (and drops the item) once closed.
    pub(crate) fn push(&self, item: WorkItem) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.items.push_back(item);
        drop(state);
        self.ready.notify_one();
        true
    }

    /// Block until an item is available. Returns `None` once the queue is closed.
    pub(crate) fn pop(&self) -> Option<WorkItem> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            state.waiting += 1;
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            state.waiting -= 1;
        }
    }

    /// Stop handing out work. Queued items are discarded and every waiter returns `None`.
    pub(crate) fn close(&self) -> usize {
        let mut state = self.lock();
        state.closed = true;
        let dropped = state.items.len();
        state.items.clear();
        drop(state);
        self.ready.notify_all();
        dropped
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Number of workers currently blocked in `pop`.
    pub(crate) fn waiting(&self) -> usize {
        self.lock().waiting
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

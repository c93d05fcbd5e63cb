use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::error::PoolError;
use crate::pending::PendingMap;
use crate::queue::WorkQueue;

/// What a worker thread is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting on the work queue.
    Idle,
    /// Running the processor on a request.
    Busy,
    /// Terminated; it will not take more work.
    Stopped,
}

impl WorkerState {
    fn to_byte(self) -> u8 {
        match self {
            WorkerState::Idle => 0,
            WorkerState::Busy => 1,
            WorkerState::Stopped => 2,
        }
    }

    fn from_byte(byte: u8) -> Self {
        match byte {
            0 => WorkerState::Idle,
            1 => WorkerState::Busy,
            _ => WorkerState::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Busy => "busy",
            WorkerState::Stopped => "stopped",
        }
    }
}

/// Why a worker thread stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    /// Consumed a poison item.
    Poisoned,
    /// The queue was closed under it.
    QueueClosed,
    /// The processor reported a fatal error or panicked.
    Fatal(String),
    /// Writing to the up channel failed.
    ChannelFailed(String),
}

/// State shared by the pool handle, the dispatchers and the workers.
pub(crate) struct PoolShared {
    pub(crate) pending: PendingMap,
    pub(crate) queue: WorkQueue,
    configured: usize,
    active: Mutex<usize>,
    exits: Condvar,
    shutting_down: AtomicBool,
    fault: Mutex<Option<String>>,
    workers: Vec<AtomicU8>,
    completed: AtomicU64,
    failed_replies: AtomicU64,
    orphaned: AtomicU64,
    timed_out: AtomicU64,
}

impl PoolShared {
    pub(crate) fn new(workers: usize, id_space: u64) -> Self {
        Self {
            pending: PendingMap::new(id_space),
            queue: WorkQueue::new(),
            configured: workers,
            active: Mutex::new(workers),
            exits: Condvar::new(),
            shutting_down: AtomicBool::new(false),
            fault: Mutex::new(None),
            workers: (0..workers)
                .map(|_| AtomicU8::new(WorkerState::Idle.to_byte()))
                .collect(),
            completed: AtomicU64::new(0),
            failed_replies: AtomicU64::new(0),
            orphaned: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
        }
    }

    pub(crate) fn configured(&self) -> usize {
        self.configured
    }

    /// Record a worker exit. The last exit outside of shutdown faults the pool.
    pub(crate) fn worker_exited(&self, index: usize, exit: &WorkerExit) {
        self.set_worker_state(index, WorkerState::Stopped);
        let remaining = {
            let mut active = self.lock_active();
            *active = active.saturating_sub(1);
            *active
        };
        self.exits.notify_all();
        info!(worker = index, ?exit, remaining, "worker stopped");

        if remaining == 0
            && !self.is_shutting_down()
            && self.fault_reason().is_none()
            && self.record_fault("no active workers remain".to_string())
        {
            self.queue.close();
            self.pending.fail_all(|| PoolError::NoActiveWorkers);
        }
    }

    pub(crate) fn active(&self) -> usize {
        *self.lock_active()
    }

    /// Wait until every worker has exited or `timeout` passes. Returns `true`
    /// when none remain.
    pub(crate) fn wait_for_exits(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut active = self.lock_active();
        while *active > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            active = self
                .exits
                .wait_timeout(active, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    pub(crate) fn set_worker_state(&self, index: usize, state: WorkerState) {
        if let Some(slot) = self.workers.get(index) {
            slot.store(state.to_byte(), Ordering::SeqCst);
        }
    }

    pub(crate) fn worker_states(&self) -> Vec<WorkerState> {
        self.workers
            .iter()
            .map(|slot| WorkerState::from_byte(slot.load(Ordering::SeqCst)))
            .collect()
    }

    /// Returns `true` for the call that flipped the flag.
    pub(crate) fn begin_shutdown(&self) -> bool {
        !self.shutting_down.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Stop serving after a channel failure. Outstanding callers fail immediately.
    pub(crate) fn fault(&self, reason: String) {
        if !self.record_fault(reason.clone()) {
            return;
        }
        self.queue.close();
        self.pending.fail_all(|| PoolError::Faulted(reason.clone()));
    }

    pub(crate) fn fault_reason(&self) -> Option<String> {
        self.lock_fault().clone()
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_reply(&self) {
        self.failed_replies.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_orphaned(&self) {
        self.orphaned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub(crate) fn failed_replies(&self) -> u64 {
        self.failed_replies.load(Ordering::Relaxed)
    }

    pub(crate) fn orphaned(&self) -> u64 {
        self.orphaned.load(Ordering::Relaxed)
    }

    pub(crate) fn timed_out(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }

    /// First fault wins; later ones are only logged.
    fn record_fault(&self, reason: String) -> bool {
        let mut fault = self.lock_fault();
        if let Some(existing) = fault.as_ref() {
            error!(%reason, first = %existing, "additional pool fault");
            return false;
        }
        error!(%reason, "pool faulted");
        *fault = Some(reason);
        true
    }

    fn lock_active(&self) -> MutexGuard<'_, usize> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_fault(&self) -> MutexGuard<'_, Option<String>> {
        self.fault.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn last_worker_exit_faults_pool() {
        let shared = PoolShared::new(2, 16);
        let ticket = shared.pending.register().unwrap();

        shared.worker_exited(0, &WorkerExit::Poisoned);
        assert_eq!(shared.active(), 1);
        assert!(shared.fault_reason().is_none());

        shared.worker_exited(1, &WorkerExit::Poisoned);
        assert_eq!(shared.active(), 0);
        assert!(shared.fault_reason().is_some());
        assert!(matches!(
            ticket.handle.try_recv().unwrap(),
            Err(PoolError::NoActiveWorkers)
        ));
        assert_eq!(
            shared.worker_states(),
            vec![WorkerState::Stopped, WorkerState::Stopped]
        );
    }

    #[test]
    fn exits_during_shutdown_do_not_fault() {
        let shared = PoolShared::new(1, 16);
        assert!(shared.begin_shutdown());
        assert!(!shared.begin_shutdown());

        shared.worker_exited(0, &WorkerExit::QueueClosed);
        assert!(shared.fault_reason().is_none());
    }

    #[test]
    fn first_fault_wins() {
        let shared = PoolShared::new(1, 16);
        let ticket = shared.pending.register().unwrap();

        shared.fault("down channel broke".to_string());
        shared.fault("up channel broke".to_string());

        assert_eq!(shared.fault_reason().as_deref(), Some("down channel broke"));
        match ticket.handle.try_recv().unwrap() {
            Err(PoolError::Faulted(reason)) => assert_eq!(reason, "down channel broke"),
            other => panic!("unexpected delivery: {other:?}"),
        }
    }

    #[test]
    fn wait_for_exits_observes_concurrent_exit() {
        let shared = Arc::new(PoolShared::new(1, 16));
        shared.begin_shutdown();

        assert!(!shared.wait_for_exits(Duration::from_millis(10)));

        let exiting = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                shared.worker_exited(0, &WorkerExit::Poisoned);
            })
        };
        assert!(shared.wait_for_exits(Duration::from_secs(2)));
        exiting.join().unwrap();
    }
}

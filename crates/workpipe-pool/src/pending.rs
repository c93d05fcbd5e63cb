use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::debug;
use workpipe_frame::CorrelationId;

use crate::error::{PoolError, Result};

/// Result of one request, as seen by its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The processor succeeded; this is its output.
    Success(Bytes),
    /// The processor reported an error; this is the error text.
    Failure(Bytes),
}

impl Outcome {
    pub fn payload(&self) -> &Bytes {
        match self {
            Outcome::Success(payload) | Outcome::Failure(payload) => payload,
        }
    }

    pub fn into_payload(self) -> Bytes {
        match self {
            Outcome::Success(payload) | Outcome::Failure(payload) => payload,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

pub(crate) type Delivery = Result<Outcome>;

/// A registered request: its id and the handle its response arrives on.
pub(crate) struct Ticket {
    pub(crate) id: CorrelationId,
    pub(crate) handle: Receiver<Delivery>,
}

/// Correlation id → completion handle for every outstanding request.
pub(crate) struct PendingMap {
    state: Mutex<PendingState>,
}

struct PendingState {
    next: u64,
    id_space: u64,
    slots: HashMap<CorrelationId, Slot>,
    closed: bool,
}

enum Slot {
    Caller(SyncSender<Delivery>),
    /// Reserved for a request nobody waits on; its reply is discarded.
    Detached,
}

impl PendingMap {
    /// `id_space` bounds ids to `0..id_space`; it must be non-zero.
    pub(crate) fn new(id_space: u64) -> Self {
        Self {
            state: Mutex::new(PendingState {
                next: 0,
                id_space: id_space.max(1),
                slots: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Allocate the next free id and register a completion handle for it.
    ///
    /// Ids come from a wrapping counter; ids still outstanding are skipped.
    pub(crate) fn register(&self) -> Result<Ticket> {
        let mut state = self.lock();
        if state.closed {
            return Err(PoolError::ShuttingDown);
        }

        let id = state.allocate()?;
        let (tx, rx) = mpsc::sync_channel(1);
        match state.slots.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(Slot::Caller(tx));
                Ok(Ticket { id, handle: rx })
            }
            Entry::Occupied(_) => Err(PoolError::IdCollision { id }),
        }
    }

    /// Reserve an id for a request that has no caller.
    ///
    /// The id stays outstanding until its response arrives, so no caller
    /// can be handed the same id while the request is in flight.
    pub(crate) fn register_detached(&self) -> Result<CorrelationId> {
        let mut state = self.lock();
        if state.closed {
            return Err(PoolError::ShuttingDown);
        }
        let id = state.allocate()?;
        match state.slots.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(Slot::Detached);
                Ok(id)
            }
            Entry::Occupied(_) => Err(PoolError::IdCollision { id }),
        }
    }

    /// Deliver a response. Returns `false` if no caller is waiting for `id`.
    pub(crate) fn complete(&self, id: CorrelationId, delivery: Delivery) -> bool {
        self.complete_then(id, delivery, || {})
    }

    /// Like [`complete`](Self::complete), running `before_wake` just before
    /// the caller is woken, so anything it records is visible once `submit`
    /// returns.
    pub(crate) fn complete_then(
        &self,
        id: CorrelationId,
        delivery: Delivery,
        before_wake: impl FnOnce(),
    ) -> bool {
        let mut state = self.lock();
        match state.slots.remove(&id) {
            // Sent while still locked so a concurrent `cancel` that loses the
            // race always finds the delivery already queued on the handle.
            Some(Slot::Caller(tx)) => {
                before_wake();
                let _ = tx.send(delivery);
                true
            }
            Some(Slot::Detached) => {
                debug!(%id, "detached request answered");
                false
            }
            None => false,
        }
    }

    /// Deregister `id`. Returns `false` if it was already completed.
    pub(crate) fn cancel(&self, id: CorrelationId) -> bool {
        self.lock().slots.remove(&id).is_some()
    }

    /// Fail every outstanding request and refuse new registrations.
    pub(crate) fn fail_all(&self, make_error: impl Fn() -> PoolError) -> usize {
        let mut state = self.lock();
        state.closed = true;
        let mut failed = 0;
        for (id, slot) in state.slots.drain() {
            if let Slot::Caller(tx) = slot {
                debug!(%id, "failing outstanding request");
                let _ = tx.send(Err(make_error()));
                failed += 1;
            }
        }
        failed
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().slots.len()
    }

    fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PendingState {
    fn allocate(&mut self) -> Result<CorrelationId> {
        let outstanding = self.slots.len();
        if outstanding as u64 >= self.id_space {
            return Err(PoolError::IdSpaceExhausted { outstanding });
        }

        loop {
            let id = CorrelationId(self.next);
            self.next = (self.next + 1) % self.id_space;
            if !self.slots.contains_key(&id) {
                return Ok(id);
            }
        }
    }
}

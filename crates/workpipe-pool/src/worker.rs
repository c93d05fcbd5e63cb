use std::any::Any;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, trace, warn};
use workpipe_frame::{ChannelSender, CorrelationId, Frame, FrameError};

use crate::error::ProcessError;
use crate::processor::Processor;
use crate::queue::WorkItem;
use crate::state::{PoolShared, WorkerExit, WorkerState};

const OVERSIZED_REPLY: &[u8] = b"reply exceeds maximum payload size";

/// Body of one worker thread: pull work, run the processor, write the result up.
pub(crate) fn run(
    index: usize,
    shared: Arc<PoolShared>,
    processor: Arc<dyn Processor>,
    up: ChannelSender,
) {
    debug!(worker = index, "worker started");

    let exit = serve(index, &shared, processor.as_ref(), &up);
    shared.worker_exited(index, &exit);
}

fn serve(
    index: usize,
    shared: &PoolShared,
    processor: &dyn Processor,
    up: &ChannelSender,
) -> WorkerExit {
    loop {
        shared.set_worker_state(index, WorkerState::Idle);
        let (id, payload) = match shared.queue.pop() {
            Some(WorkItem::Task { id, payload }) => (id, payload),
            Some(WorkItem::Poison) => return WorkerExit::Poisoned,
            None => return WorkerExit::QueueClosed,
        };

        shared.set_worker_state(index, WorkerState::Busy);
        trace!(worker = index, %id, size = payload.len(), "processing request");

        let (response, fatal) = match invoke(processor, payload) {
            Ok(output) => (Frame::reply(id, output), None),
            Err(ProcessError::Recoverable(reason)) => {
                warn!(worker = index, %id, %reason, "request failed");
                (Frame::failure(id, reason), None)
            }
            Err(ProcessError::Fatal(reason)) => {
                error!(worker = index, %id, %reason, "worker failed fatally");
                (Frame::failure(id, reason.clone()), Some(reason))
            }
        };

        if let Err(err) = send_response(up, id, &response) {
            return WorkerExit::ChannelFailed(err.to_string());
        }
        if let Some(reason) = fatal {
            return WorkerExit::Fatal(reason);
        }
    }
}

/// Run the processor, treating a panic as a fatal error.
fn invoke(processor: &dyn Processor, payload: Bytes) -> Result<Bytes, ProcessError> {
    match panic::catch_unwind(AssertUnwindSafe(|| processor.process(payload))) {
        Ok(result) => result,
        Err(panic) => Err(ProcessError::Fatal(format!(
            "processor panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

fn send_response<W: Write>(
    up: &ChannelSender<W>,
    id: CorrelationId,
    response: &Frame,
) -> Result<(), FrameError> {
    match up.send(response) {
        Err(FrameError::PayloadTooLarge { size, max }) => {
            warn!(%id, size, max, "reply too large, sending failure instead");
            up.send(&Frame::failure(id, OVERSIZED_REPLY))
        }
        other => other,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

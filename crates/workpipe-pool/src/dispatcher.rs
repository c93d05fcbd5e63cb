//! The two channel readers.
//!
//! Each channel has exactly one reader thread. The down dispatcher turns
//! request frames into queue items; the up dispatcher routes responses to
//! the callers waiting on them.

use std::io::Read;

use tracing::{debug, trace, warn};
use workpipe_frame::{ChannelReceiver, FrameError, FrameKind, Packet};

use crate::error::PoolError;
use crate::pending::Outcome;
use crate::queue::WorkItem;
use crate::state::PoolShared;

/// Read the down channel until it closes, feeding the work queue.
pub(crate) fn run_down<R: Read>(shared: &PoolShared, down: &ChannelReceiver<R>) {
    loop {
        let frame = match down.recv() {
            Ok(Packet::Sentinel) => {
                debug!("sentinel received, retiring one worker");
                shared.queue.push(WorkItem::Poison);
                continue;
            }
            Ok(Packet::Frame(frame)) => frame,
            Err(err) => {
                channel_ended(shared, down.name(), err);
                return;
            }
        };

        let id = match frame.tag {
            Some(tag) if tag.kind == FrameKind::Request => tag.id,
            Some(tag) => {
                warn!(id = %tag.id, kind = ?tag.kind, "non-request frame on down channel, dropped");
                continue;
            }
            None => match shared.pending.register_detached() {
                Ok(id) => id,
                Err(err) => {
                    warn!(error = %err, "untagged frame dropped");
                    continue;
                }
            },
        };

        trace!(%id, size = frame.payload.len(), "request queued");
        if !shared.queue.push(WorkItem::Task {
            id,
            payload: frame.payload,
        }) {
            let reason = shared
                .fault_reason()
                .map(PoolError::Faulted)
                .unwrap_or(PoolError::ShuttingDown);
            shared.pending.complete(id, Err(reason));
        }
    }
}

/// Read the up channel until it closes, completing outstanding requests.
pub(crate) fn run_up<R: Read>(shared: &PoolShared, up: &ChannelReceiver<R>) {
    loop {
        let frame = match up.recv() {
            Ok(Packet::Frame(frame)) => frame,
            Ok(Packet::Sentinel) => {
                warn!("unexpected sentinel on up channel, ignored");
                continue;
            }
            Err(err) => {
                channel_ended(shared, up.name(), err);
                return;
            }
        };

        let Some(tag) = frame.tag else {
            warn!("untagged frame on up channel, dropped");
            continue;
        };
        let outcome = match tag.kind {
            FrameKind::Reply => Outcome::Success(frame.payload),
            FrameKind::Failure => Outcome::Failure(frame.payload),
            FrameKind::Request => {
                warn!(id = %tag.id, "request frame on up channel, dropped");
                continue;
            }
        };

        let success = outcome.is_success();
        let delivered = shared.pending.complete_then(tag.id, Ok(outcome), || {
            if success {
                shared.record_completed();
            } else {
                shared.record_failed_reply();
            }
        });
        if delivered {
            trace!(id = %tag.id, success, "response delivered");
        } else {
            shared.record_orphaned();
            warn!(id = %tag.id, "response with no caller waiting, discarded");
        }
    }
}

/// A closed channel during shutdown is the normal end of a dispatcher;
/// anything else faults the pool.
fn channel_ended(shared: &PoolShared, channel: &'static str, err: FrameError) {
    match err {
        FrameError::ChannelClosed if shared.is_shutting_down() => {
            debug!(channel, "channel closed, dispatcher exiting");
        }
        err => shared.fault(format!("{channel} channel failed: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use workpipe_frame::{
        ChannelSender, CorrelationId, Frame, FrameConfig, FrameReader, FrameWriter,
    };

    use super::*;

    fn encode(frames: impl FnOnce(&ChannelSender<&mut Vec<u8>>)) -> Vec<u8> {
        let mut wire = Vec::new();
        frames(&ChannelSender::new("test", FrameWriter::new(&mut wire)));
        wire
    }

    #[test]
    fn down_dispatcher_queues_requests_and_poison() {
        let shared = PoolShared::new(2, 16);
        shared.begin_shutdown();
        let wire = encode(|tx| {
            tx.send(&Frame::request(CorrelationId(1), &b"a"[..])).unwrap();
            tx.send_sentinel().unwrap();
            tx.send(&Frame::reply(CorrelationId(2), &b"wrong way"[..]))
                .unwrap();
            tx.send(&Frame::request(CorrelationId(3), Bytes::new()))
                .unwrap();
        });
        let down = ChannelReceiver::new("down", FrameReader::new(wire.as_slice()));

        run_down(&shared, &down);

        assert_eq!(
            shared.queue.pop(),
            Some(WorkItem::Task {
                id: CorrelationId(1),
                payload: Bytes::from_static(b"a"),
            })
        );
        assert_eq!(shared.queue.pop(), Some(WorkItem::Poison));
        assert_eq!(
            shared.queue.pop(),
            Some(WorkItem::Task {
                id: CorrelationId(3),
                payload: Bytes::new(),
            })
        );
        assert_eq!(shared.queue.len(), 0);
        assert!(shared.fault_reason().is_none());
    }

    #[test]
    fn untagged_requests_keep_their_id_reserved() {
        let shared = PoolShared::new(1, 16);
        shared.begin_shutdown();
        let held = shared.pending.register().unwrap();

        let mut wire = Vec::new();
        {
            let tx = ChannelSender::new(
                "plain",
                FrameWriter::with_config(&mut wire, FrameConfig::plain()),
            );
            tx.send(&Frame::plain(&b"legacy"[..])).unwrap();
        }
        let down = ChannelReceiver::new(
            "plain",
            FrameReader::with_config(wire.as_slice(), FrameConfig::plain()),
        );
        run_down(&shared, &down);

        let detached = match shared.queue.pop() {
            Some(WorkItem::Task { id, payload }) => {
                assert_ne!(id, held.id);
                assert_eq!(payload.as_ref(), b"legacy");
                id
            }
            other => panic!("unexpected item: {other:?}"),
        };

        // Callers registered while the untagged request is in flight never
        // share its id, so its reply cannot reach them.
        let callers: Vec<_> = (0..14).map(|_| shared.pending.register().unwrap()).collect();
        assert!(callers.iter().all(|ticket| ticket.id != detached));
        assert!(matches!(
            shared.pending.register(),
            Err(PoolError::IdSpaceExhausted { outstanding: 16 })
        ));

        let wire = encode(|tx| {
            tx.send(&Frame::reply(detached, &b"legacy"[..])).unwrap();
        });
        let up = ChannelReceiver::new("up", FrameReader::new(wire.as_slice()));
        run_up(&shared, &up);

        for ticket in &callers {
            assert!(ticket.handle.try_recv().is_err());
        }
        assert_eq!(shared.completed(), 0);
        assert_eq!(shared.orphaned(), 1);
    }

    #[test]
    fn up_dispatcher_routes_by_id() {
        let shared = PoolShared::new(1, 16);
        shared.begin_shutdown();
        let first = shared.pending.register().unwrap();
        let second = shared.pending.register().unwrap();
        let (first_id, second_id) = (first.id, second.id);

        let wire = encode(|tx| {
            tx.send(&Frame::failure(second_id, &b"no"[..])).unwrap();
            tx.send(&Frame::reply(first_id, &b"yes"[..])).unwrap();
            tx.send(&Frame::reply(CorrelationId(9), &b"late"[..]))
                .unwrap();
        });
        let up = ChannelReceiver::new("up", FrameReader::new(wire.as_slice()));
        run_up(&shared, &up);

        assert_eq!(
            first.handle.recv_timeout(Duration::from_secs(1)).unwrap().unwrap(),
            Outcome::Success(Bytes::from_static(b"yes"))
        );
        assert_eq!(
            second.handle.recv_timeout(Duration::from_secs(1)).unwrap().unwrap(),
            Outcome::Failure(Bytes::from_static(b"no"))
        );
        assert_eq!(shared.completed(), 1);
        assert_eq!(shared.failed_replies(), 1);
        assert_eq!(shared.orphaned(), 1);
    }

    #[test]
    fn unexpected_close_faults_pool() {
        let shared = PoolShared::new(1, 16);
        let waiting = shared.pending.register().unwrap();
        let up = ChannelReceiver::new("up", FrameReader::new(&[][..]));

        run_up(&shared, &up);

        assert!(shared.fault_reason().unwrap().contains("up channel failed"));
        assert!(matches!(
            waiting.handle.try_recv().unwrap(),
            Err(PoolError::Faulted(_))
        ));
    }

    #[test]
    fn corrupt_frame_faults_pool() {
        let shared = PoolShared::new(1, 16);
        shared.begin_shutdown();
        let mut wire = Vec::new();
        wire.extend_from_slice(&10u64.to_le_bytes());
        wire.extend_from_slice(&1u64.to_le_bytes());
        wire.push(0xEE);
        wire.push(b'x');
        let down = ChannelReceiver::new("down", FrameReader::new(wire.as_slice()));

        run_down(&shared, &down);
        assert!(shared.fault_reason().unwrap().contains("down channel failed"));
    }
}

//! Directional framed channels with a single-reader, serialized-writer discipline.
//!
//! A channel is one byte stream split into a [`ChannelSender`] and a
//! [`ChannelReceiver`]. Senders may be cloned freely; every clone writes
//! through the same lock so frames never interleave. The receiver performs
//! the wait for data and the frame read as one critical section, so at most
//! one thread is ever consuming a given stream.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};
use workpipe_transport::{IpcStream, TransportKind};

use crate::codec::{Frame, FrameConfig, Packet};
use crate::error::{FrameError, Result};
use crate::reader::FrameReader;
use crate::writer::FrameWriter;

/// Open a channel on a fresh endpoint pair of the given transport kind.
pub fn channel(
    name: &'static str,
    kind: TransportKind,
    config: FrameConfig,
) -> Result<(ChannelSender, ChannelReceiver)> {
    let (read_end, write_end) = kind.open()?;
    let reader = FrameReader::with_config_ipc(read_end, config.clone())?;
    let writer = FrameWriter::with_config_ipc(write_end, config)?;
    debug!(channel = name, transport = kind.name(), "channel open");
    Ok((
        ChannelSender::new(name, writer),
        ChannelReceiver::new(name, reader),
    ))
}

/// Write side of a channel. Cloning shares the underlying writer and its lock.
pub struct ChannelSender<W = IpcStream> {
    shared: Arc<SenderShared<W>>,
}

struct SenderShared<W> {
    name: &'static str,
    writer: Mutex<Option<FrameWriter<W>>>,
}

impl<W> Clone for ChannelSender<W> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<W: Write> ChannelSender<W> {
    pub fn new(name: &'static str, writer: FrameWriter<W>) -> Self {
        Self {
            shared: Arc::new(SenderShared {
                name,
                writer: Mutex::new(Some(writer)),
            }),
        }
    }

    /// Encode and write one frame while holding the channel write lock.
    pub fn send(&self, frame: &Frame) -> Result<()> {
        let mut guard = self.lock();
        let writer = guard.as_mut().ok_or(FrameError::ChannelClosed)?;
        writer.write_frame(frame)?;
        trace!(
            channel = self.shared.name,
            id = ?frame.id(),
            size = frame.payload.len(),
            "frame sent"
        );
        Ok(())
    }

    /// Write the zero-length sentinel frame.
    pub fn send_sentinel(&self) -> Result<()> {
        let mut guard = self.lock();
        let writer = guard.as_mut().ok_or(FrameError::ChannelClosed)?;
        writer.write_sentinel()?;
        debug!(channel = self.shared.name, "sentinel sent");
        Ok(())
    }

    /// Close the write side.
    ///
    /// The stream is released once the lock is acquired, so a frame being
    /// written by another clone completes first. Returns `false` if the
    /// channel was already closed.
    pub fn close(&self) -> bool {
        let writer = self.lock().take();
        let was_open = writer.is_some();
        drop(writer);
        if was_open {
            debug!(channel = self.shared.name, "channel closed by sender");
        }
        was_open
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    fn lock(&self) -> MutexGuard<'_, Option<FrameWriter<W>>> {
        self.shared
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read side of a channel.
///
/// Shareable by reference, but reads are mutually exclusive: waiting for
/// readiness and decoding the frame happen under one lock. Every `read` on
/// the underlying stream passes through a gauge, so the exclusion is
/// measured at the stream rather than assumed from the lock.
pub struct ChannelReceiver<R = IpcStream> {
    name: &'static str,
    reader: Mutex<FrameReader<GaugedRead<R>>>,
    gauge: Arc<ReadGauge>,
    packets: AtomicU64,
}

impl<R: Read> ChannelReceiver<R> {
    pub fn new(name: &'static str, reader: FrameReader<R>) -> Self {
        let gauge = Arc::new(ReadGauge::default());
        let reader = reader.map_inner(|inner| GaugedRead {
            inner,
            gauge: Arc::clone(&gauge),
        });
        Self {
            name,
            reader: Mutex::new(reader),
            gauge,
            packets: AtomicU64::new(0),
        }
    }

    /// Block until a whole packet arrives or the stream ends.
    pub fn recv(&self) -> Result<Packet> {
        let mut reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let packet = reader.read_packet()?;
        self.packets.fetch_add(1, Ordering::Relaxed);
        Ok(packet)
    }

    /// Largest number of threads ever observed reading the stream at once.
    pub fn peak_concurrent_readers(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }

    /// Number of packets decoded so far.
    pub fn packets_received(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[derive(Default)]
struct ReadGauge {
    inside: AtomicUsize,
    peak: AtomicUsize,
}

/// Counts threads inside `read` on the wrapped stream.
struct GaugedRead<R> {
    inner: R,
    gauge: Arc<ReadGauge>,
}

impl<R: Read> Read for GaugedRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let now = self.gauge.inside.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(now, Ordering::SeqCst);
        let result = self.inner.read(buf);
        self.gauge.inside.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

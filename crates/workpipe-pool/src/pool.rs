use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, warn};
use workpipe_frame::{channel, ChannelReceiver, ChannelSender, Frame, FrameError};

use crate::config::PoolConfig;
use crate::dispatcher;
use crate::error::{PoolError, Result};
use crate::pending::Outcome;
use crate::processor::{Echo, Processor};
use crate::queue::WorkItem;
use crate::state::{PoolShared, WorkerState};
use crate::worker;

/// A fixed-size pool of worker threads fed through a down channel and
/// answering through an up channel.
///
/// Any number of threads may call [`Pool::submit`] concurrently; each gets
/// back exactly the response to its own request.
pub struct Pool {
    shared: Arc<PoolShared>,
    config: PoolConfig,
    down: ChannelSender,
    up: ChannelSender,
    down_rx: Arc<ChannelReceiver>,
    up_rx: Arc<ChannelReceiver>,
    threads: Mutex<Option<PoolThreads>>,
}

struct PoolThreads {
    workers: Vec<JoinHandle<()>>,
    down: JoinHandle<()>,
    up: JoinHandle<()>,
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub configured_workers: usize,
    pub active_workers: usize,
    /// Workers blocked waiting for the next item.
    pub idle_workers: usize,
    /// Requests registered and not yet answered.
    pub outstanding: usize,
    /// Requests read off the down channel and not yet picked up by a worker.
    pub queued: usize,
    pub completed: u64,
    pub failed_replies: u64,
    pub timed_out: u64,
    /// Responses that arrived after their caller stopped waiting.
    pub orphaned_responses: u64,
    pub packets_down: u64,
    pub packets_up: u64,
    /// Most threads ever observed reading one channel at once.
    pub peak_channel_readers: usize,
    pub fault: Option<String>,
}

/// What [`Pool::shutdown`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub workers_joined: usize,
    /// Workers still running a request when the grace period ran out twice.
    pub workers_detached: usize,
    pub worker_panics: usize,
    /// Queued work had to be discarded because workers did not drain in time.
    pub grace_exceeded: bool,
    /// Outstanding requests failed with [`PoolError::ShuttingDown`].
    pub failed_pending: usize,
}

impl Pool {
    /// Start a pool whose workers echo every request.
    pub fn start(config: PoolConfig) -> Result<Self> {
        Self::start_with(config, Echo)
    }

    /// Start a pool running `processor` on every request.
    ///
    /// Both channels exist before any worker starts.
    pub fn start_with(config: PoolConfig, processor: impl Processor) -> Result<Self> {
        config.validate()?;
        let frame_config = config.frame_config();
        let (down, down_rx) = channel("down", config.transport, frame_config.clone())?;
        let (up, up_rx) = channel("up", config.transport, frame_config)?;
        let (down_rx, up_rx) = (Arc::new(down_rx), Arc::new(up_rx));

        let shared = Arc::new(PoolShared::new(config.workers, config.id_space));
        let processor: Arc<dyn Processor> = Arc::new(processor);

        let mut pool = Self {
            shared,
            config,
            down,
            up,
            down_rx,
            up_rx,
            threads: Mutex::new(None),
        };
        let threads = pool.spawn_threads(processor)?;
        *pool.threads.get_mut().unwrap_or_else(PoisonError::into_inner) = Some(threads);

        info!(
            workers = pool.config.workers,
            transport = pool.config.transport.name(),
            "pool started"
        );
        Ok(pool)
    }

    fn spawn_threads(&self, processor: Arc<dyn Processor>) -> Result<PoolThreads> {
        let mut workers = Vec::with_capacity(self.config.workers);
        for index in 0..self.config.workers {
            let shared = Arc::clone(&self.shared);
            let processor = Arc::clone(&processor);
            let up = self.up.clone();
            match spawn(format!("workpipe-worker-{index}"), move || {
                worker::run(index, shared, processor, up)
            }) {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    self.abort_start(workers, Vec::new());
                    return Err(err);
                }
            }
        }

        let down = {
            let shared = Arc::clone(&self.shared);
            let rx = Arc::clone(&self.down_rx);
            spawn("workpipe-down".to_string(), move || {
                dispatcher::run_down(&shared, &*rx)
            })
        };
        let down = match down {
            Ok(handle) => handle,
            Err(err) => {
                self.abort_start(workers, Vec::new());
                return Err(err);
            }
        };

        let up = {
            let shared = Arc::clone(&self.shared);
            let rx = Arc::clone(&self.up_rx);
            spawn("workpipe-up".to_string(), move || dispatcher::run_up(&shared, &*rx))
        };
        let up = match up {
            Ok(handle) => handle,
            Err(err) => {
                self.abort_start(workers, vec![down]);
                return Err(err);
            }
        };

        Ok(PoolThreads { workers, down, up })
    }

    /// Tear down whatever was started before a spawn failure.
    fn abort_start(&self, workers: Vec<JoinHandle<()>>, dispatchers: Vec<JoinHandle<()>>) {
        self.shared.begin_shutdown();
        self.shared.queue.close();
        self.down.close();
        self.up.close();
        for handle in workers.into_iter().chain(dispatchers) {
            let _ = handle.join();
        }
    }

    /// Send `payload` to a worker and block until its response or `timeout`.
    ///
    /// A processor error comes back as `Ok(Outcome::Failure(_))`; `Err` is
    /// reserved for pool-level failures.
    pub fn submit(&self, payload: impl Into<Bytes>, timeout: Duration) -> Result<Outcome> {
        self.ensure_serving()?;
        let ticket = match self.shared.pending.register() {
            Ok(ticket) => ticket,
            Err(err @ PoolError::IdCollision { .. }) => {
                self.shared.fault(err.to_string());
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        let id = ticket.id;

        if let Err(err) = self.down.send(&Frame::request(id, payload)) {
            self.shared.pending.cancel(id);
            return Err(match err {
                FrameError::ChannelClosed if self.shared.is_shutting_down() => {
                    PoolError::ShuttingDown
                }
                err => err.into(),
            });
        }

        match ticket.handle.recv_timeout(timeout) {
            Ok(delivery) => delivery,
            Err(RecvTimeoutError::Timeout) => {
                if self.shared.pending.cancel(id) {
                    self.shared.record_timeout();
                    debug!(%id, ?timeout, "request timed out");
                    return Err(PoolError::Timeout { id, timeout });
                }
                // Completed between the timeout and the cancel; the
                // delivery is already on the handle.
                ticket
                    .handle
                    .try_recv()
                    .unwrap_or(Err(PoolError::Timeout { id, timeout }))
            }
            Err(RecvTimeoutError::Disconnected) => Err(PoolError::ShuttingDown),
        }
    }

    /// [`submit`](Self::submit) with the configured request timeout.
    pub fn submit_default(&self, payload: impl Into<Bytes>) -> Result<Outcome> {
        self.submit(payload, self.config.request_timeout)
    }

    /// Ask exactly one worker to finish its current item and stop.
    ///
    /// Sends the sentinel on the down channel; work queued before it is
    /// still served.
    pub fn retire_worker(&self) -> Result<()> {
        if self.shared.is_shutting_down() {
            return Err(PoolError::ShuttingDown);
        }
        self.down.send_sentinel().map_err(|err| match err {
            FrameError::ChannelClosed => PoolError::ShuttingDown,
            err => err.into(),
        })
    }

    /// Stop the pool and wait for its threads.
    ///
    /// Workers drain the queue for up to the configured grace period; work
    /// still queued after that is discarded. Outstanding callers get
    /// [`PoolError::ShuttingDown`]. Calling this again is a no-op.
    pub fn shutdown(&self) -> ShutdownReport {
        let first = self.shared.begin_shutdown();
        let threads = self
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(threads) = threads else {
            return ShutdownReport::default();
        };
        if first {
            info!("pool shutting down");
        }

        let mut report = ShutdownReport::default();
        for _ in 0..self.shared.active() {
            self.shared.queue.push(WorkItem::Poison);
        }

        let grace = self.config.shutdown_grace;
        if !self.shared.wait_for_exits(grace) {
            report.grace_exceeded = true;
            let dropped = self.shared.queue.close();
            warn!(dropped, ?grace, "workers did not drain in time, queued work discarded");
            self.shared.wait_for_exits(grace);
        }

        for handle in threads.workers {
            if self.shared.active() > 0 && !handle.is_finished() {
                report.workers_detached += 1;
                continue;
            }
            match handle.join() {
                Ok(()) => report.workers_joined += 1,
                Err(_) => report.worker_panics += 1,
            }
        }
        if report.workers_detached > 0 {
            warn!(detached = report.workers_detached, "workers left running");
        }

        self.shared.queue.close();
        self.down.close();
        join_dispatcher("down", threads.down);
        self.up.close();
        join_dispatcher("up", threads.up);

        report.failed_pending = self.shared.pending.fail_all(|| PoolError::ShuttingDown);
        info!(
            joined = report.workers_joined,
            failed_pending = report.failed_pending,
            "pool stopped"
        );
        report
    }

    /// Number of workers that have not terminated.
    pub fn active_workers(&self) -> usize {
        self.shared.active()
    }

    /// Per-worker state, indexed by worker number.
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.shared.worker_states()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            configured_workers: self.shared.configured(),
            active_workers: self.shared.active(),
            idle_workers: self.shared.queue.waiting(),
            outstanding: self.shared.pending.len(),
            queued: self.shared.queue.len(),
            completed: self.shared.completed(),
            failed_replies: self.shared.failed_replies(),
            timed_out: self.shared.timed_out(),
            orphaned_responses: self.shared.orphaned(),
            packets_down: self.down_rx.packets_received(),
            packets_up: self.up_rx.packets_received(),
            peak_channel_readers: self
                .down_rx
                .peak_concurrent_readers()
                .max(self.up_rx.peak_concurrent_readers()),
            fault: self.shared.fault_reason(),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn ensure_serving(&self) -> Result<()> {
        if self.shared.is_shutting_down() {
            return Err(PoolError::ShuttingDown);
        }
        if self.shared.active() == 0 {
            return Err(PoolError::NoActiveWorkers);
        }
        if let Some(reason) = self.shared.fault_reason() {
            return Err(PoolError::Faulted(reason));
        }
        Ok(())
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn(name: String, body: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name.clone())
        .spawn(body)
        .map_err(|source| PoolError::Spawn { role: name, source })
}

fn join_dispatcher(channel: &'static str, handle: JoinHandle<()>) {
    let started = Instant::now();
    if handle.join().is_err() {
        warn!(channel, "dispatcher panicked");
    }
    debug!(channel, elapsed = ?started.elapsed(), "dispatcher joined");
}

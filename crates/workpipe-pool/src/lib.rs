//! Fixed-size worker pool exchanging framed requests over two channels.
//!
//! Callers submit payloads through a [`Pool`]. Each request is tagged with a
//! correlation id and written to the *down* channel; a single dispatcher
//! thread reads it and hands it to an idle worker through a signal-one queue.
//! Workers run a [`Processor`] and write tagged responses to the *up*
//! channel, whose single reader completes the caller waiting on that id.
//!
//! ```no_run
//! use std::time::Duration;
//! use workpipe_pool::{Pool, PoolConfig};
//!
//! let pool = Pool::start(PoolConfig::default().with_workers(4))?;
//! let outcome = pool.submit(&b"ping"[..], Duration::from_secs(1))?;
//! assert_eq!(outcome.payload().as_ref(), b"ping");
//! pool.shutdown();
//! # Ok::<(), workpipe_pool::PoolError>(())
//! ```

mod config;
mod dispatcher;
pub mod error;
mod pending;
mod pool;
mod processor;
mod queue;
mod state;
mod worker;

pub use config::{PoolConfig, DEFAULT_ID_SPACE};
pub use error::{PoolError, ProcessError, Result};
pub use pending::Outcome;
pub use pool::{Pool, PoolStats, ShutdownReport};
pub use processor::{Echo, Processor};
pub use state::WorkerState;

//! Unidirectional byte-stream endpoints for workpipe.
//!
//! Provides the raw byte channels that the frame layer runs on:
//! - anonymous OS pipes (`pipe(2)`)
//! - connected Unix stream pairs with the unused direction shut down
//!
//! This is the lowest layer of workpipe. Everything else builds on top of
//! the [`IpcStream`] type provided here.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod pipe;

pub use error::{Result, TransportError};
pub use traits::IpcStream;

#[cfg(unix)]
pub use pipe::{pipe, unix_pair, TransportKind};

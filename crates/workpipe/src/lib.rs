//! Worker pool over framed unidirectional pipes.
//!
//! A [`pool::Pool`] owns two byte channels: requests travel *down* to a
//! fixed set of worker threads and responses travel *up* to the callers
//! that submitted them. Each channel has exactly one reader thread.
//!
//! # Crate Structure
//!
//! - [`transport`] - OS pipes and Unix stream pairs
//! - [`frame`] - Length-prefixed framing, correlation tags, directional channels
//! - [`pool`] - Workers, dispatchers and the submitting facade

/// Re-export transport types.
pub mod transport {
    pub use workpipe_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use workpipe_frame::*;
}

/// Re-export pool types.
pub mod pool {
    pub use workpipe_pool::*;
}

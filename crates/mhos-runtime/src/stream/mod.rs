//! Per-client streaming sessions.
//!
//! A session owns everything scheduled on behalf of one client: timers,
//! producer tasks, filesystem watchers and the sending half of the frame
//! channel. Closing the session tears all of it down at once, after which no
//! frame reaches the transport.

mod broadcaster;
mod frame;
mod session;

pub use broadcaster::StreamBroadcaster;
pub use frame::Frame;
pub use session::{SessionState, StreamSession};

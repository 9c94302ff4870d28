//! Hand-off of jobs and progress between fmio processes.

#[cfg(unix)]
pub mod channel;
pub mod message;

#[cfg(unix)]
pub use channel::{claim, send, Claim, RelayListener, RelayServer, Role};
pub use message::{RelayMessage, SEPARATOR};

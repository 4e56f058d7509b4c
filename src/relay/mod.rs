//! Relay Engines
//!
//! One submodule per mode: `tcp` pumps raw bytes both ways through one dialed
//! overlay stream, `http` rewrites individual requests onto the target
//! origin. `classify` decides which copy-loop errors are ordinary connection
//! lifecycle and which are faults.

pub mod classify;
pub mod http;
pub mod session;
pub mod tcp;

pub use http::HttpRelay;
pub use session::{RelaySession, SessionStats};

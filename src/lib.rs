//! Overpass Library
//!
//! Single-target forwarder onto an overlay network.
//!
//! Overpass listens on one local address and relays every accepted connection
//! to one fixed remote endpoint reachable only through the overlay network
//! client. The mode is chosen once at startup from the target address: a bare
//! `host:port` runs the TCP tunnel, an `http(s)://` origin runs the HTTP
//! reverse proxy.

pub mod config;
pub mod error;
pub mod headers;
pub mod overlay;
pub mod relay;
pub mod server;
pub mod upstream;

pub use config::{Config, Target};
pub use error::RelayError;

/// Common result type for startup and server-level errors
pub type Result<T> = anyhow::Result<T>;

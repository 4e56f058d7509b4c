//! Relay Error Types
//!
//! Per-session and per-request faults carry a kind tag and the underlying
//! cause so callers can tell which leg of a relay failed without string
//! matching. Configuration and startup errors use `anyhow` at the binary
//! boundary instead.

use std::io;

use thiserror::Error;

/// A fault inside one relay session or one proxied HTTP exchange. These never
/// cross session boundaries; the process keeps serving other connections.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The outbound dial through the overlay client failed. Single-attempt
    /// policy: the session is torn down, the caller may reconnect.
    #[error("failed to dial {target} through the overlay")]
    Dial {
        target: String,
        #[source]
        source: io::Error,
    },

    /// The inbound-to-outbound copy direction ended with an unexpected error
    #[error("inbound-to-outbound copy failed")]
    CopyInbound {
        #[source]
        source: io::Error,
    },

    /// The outbound-to-inbound copy direction ended with an unexpected error
    #[error("outbound-to-inbound copy failed")]
    CopyOutbound {
        #[source]
        source: io::Error,
    },

    /// The outbound HTTP request could not be constructed
    #[error("failed to build outbound request")]
    BuildRequest {
        #[source]
        source: http::Error,
    },

    /// The outbound HTTP exchange failed (connect, TLS, send, or deadline)
    #[error("failed to send outbound request")]
    Send {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl RelayError {
    /// True when the fault happened before any bytes could flow
    pub fn is_dial(&self) -> bool {
        matches!(self, RelayError::Dial { .. })
    }
}

//! Relay Session Bookkeeping
//!
//! One session pairs one accepted inbound connection with one outbound
//! overlay stream. The session is owned by the task servicing it and never
//! outlives the completion of both copy directions.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::info;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Per-session state for one inbound/outbound pairing
#[derive(Debug)]
pub struct RelaySession {
    pub session_id: u64,
    pub peer_addr: Option<SocketAddr>,
    pub target: String,
    start: Instant,
    bytes_up: u64,
    bytes_down: u64,
}

/// Completion summary returned to the accept loop
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub session_id: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub duration: Duration,
}

impl RelaySession {
    pub fn new(peer_addr: Option<SocketAddr>, target: &str) -> Self {
        Self {
            session_id: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            peer_addr,
            target: target.to_string(),
            start: Instant::now(),
            bytes_up: 0,
            bytes_down: 0,
        }
    }

    /// Bytes copied inbound -> outbound
    pub fn record_up(&mut self, bytes: u64) {
        self.bytes_up = bytes;
    }

    /// Bytes copied outbound -> inbound
    pub fn record_down(&mut self, bytes: u64) {
        self.bytes_down = bytes;
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.session_id,
            bytes_up: self.bytes_up,
            bytes_down: self.bytes_down,
            duration: self.start.elapsed(),
        }
    }

    /// Structured completion log line, emitted whether or not the session
    /// ended in a fault.
    pub fn log_complete(&self) {
        info!(
            session_id = self.session_id,
            peer_addr = ?self.peer_addr,
            target = %self.target,
            bytes_up = self.bytes_up,
            bytes_down = self.bytes_down,
            duration_ms = self.start.elapsed().as_millis() as u64,
            "relay session completed"
        );
    }
}

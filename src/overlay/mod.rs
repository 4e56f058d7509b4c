//! Overlay Network Client Interface
//!
//! The relay core only needs two things from the overlay: a dial-by-address
//! capability producing a bidirectional byte stream, and (for HTTP mode) an
//! HTTP client bound to that same capability. Everything else about the
//! overlay (joining, peer discovery, transport crypto) stays behind this
//! boundary.

pub mod iroh;

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Dial-by-address capability of the overlay network client
#[async_trait]
pub trait OverlayDialer: Send + Sync {
    /// Opens a byte stream to `addr` (`host:port`) through the overlay.
    /// Single attempt; callers decide whether to reconnect.
    async fn dial(&self, addr: &str) -> io::Result<Box<dyn OverlayStream>>;
}

/// A bidirectional byte stream obtained from an overlay dial
pub trait OverlayStream: AsyncRead + AsyncWrite + Send + Unpin {
    /// Applies transport keep-alive where the transport supports it. Returns
    /// `Ok(false)` when the capability is not available; that is not a fault.
    fn set_keepalive(&self, _interval: Duration) -> io::Result<bool> {
        Ok(false)
    }
}

impl OverlayStream for TcpStream {
    fn set_keepalive(&self, interval: Duration) -> io::Result<bool> {
        let keepalive = socket2::TcpKeepalive::new().with_time(interval);
        socket2::SockRef::from(self).set_tcp_keepalive(&keepalive)?;
        Ok(true)
    }
}

/// Plain-TCP dialer with no overlay in between. Used by the test suite and
/// handy for running the relay against directly reachable targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectDialer;

#[async_trait]
impl OverlayDialer for DirectDialer {
    async fn dial(&self, addr: &str) -> io::Result<Box<dyn OverlayStream>> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Box::new(stream))
    }
}

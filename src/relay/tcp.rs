//! TCP Relay
//!
//! Pumps bytes both ways between one accepted inbound connection and one
//! outbound overlay stream. The two copy directions run concurrently under a
//! shared cancellation scope: whichever finishes first propagates its EOF as
//! a write-shutdown on its destination and cancels the scope, after which the
//! sibling direction may only drain for a bounded window instead of hanging
//! on a half-closed peer. Both directions are joined before this returns, so
//! a finished session never leaks a task or a socket.

use std::io;
use std::pin::pin;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RelayTuning;
use crate::error::RelayError;
use crate::overlay::{OverlayDialer, OverlayStream};
use crate::relay::classify::is_expected_copy_error;
use crate::relay::session::{RelaySession, SessionStats};

const COPY_BUF_SIZE: usize = 16 * 1024;

/// Relays one accepted inbound connection to `target` through the overlay.
///
/// Dial failure is returned immediately and closes the inbound stream; no
/// retry. Copy errors run through the classifier: expected terminations are
/// ordinary session completion, the first unexpected one becomes the result,
/// tagged with the direction that failed.
pub async fn relay(
    inbound: TcpStream,
    dialer: &dyn OverlayDialer,
    target: &str,
    tuning: RelayTuning,
) -> Result<SessionStats, RelayError> {
    let peer_addr = inbound.peer_addr().ok();
    let mut session = RelaySession::new(peer_addr, target);
    debug!(
        session_id = session.session_id,
        peer_addr = ?peer_addr,
        %target,
        "starting relay session"
    );

    if let Err(err) = OverlayStream::set_keepalive(&inbound, tuning.keepalive) {
        warn!(session_id = session.session_id, %err, "can't enable keep-alive on inbound socket");
    }

    let outbound = dialer.dial(target).await.map_err(|source| RelayError::Dial {
        target: target.to_string(),
        source,
    })?;

    match outbound.set_keepalive(tuning.keepalive) {
        Ok(false) => debug!(session_id = session.session_id, "outbound transport has no keep-alive"),
        Ok(true) => {}
        Err(err) => warn!(session_id = session.session_id, %err, "can't enable keep-alive on outbound stream"),
    }

    let scope = CancellationToken::new();
    let (in_rd, in_wr) = inbound.into_split();
    let (out_rd, out_wr) = tokio::io::split(outbound);

    // Both directions run on this task and are joined here; completion of
    // either cancels the shared scope and wakes the other out of blocking
    // I/O. Dropping the owned halves afterwards closes each stream once.
    let (up, down) = tokio::join!(
        pump(in_rd, out_wr, scope.clone(), tuning.drain_window),
        pump(out_rd, in_wr, scope.clone(), tuning.drain_window),
    );

    let (bytes_up, up_err) = up;
    let (bytes_down, down_err) = down;
    session.record_up(bytes_up);
    session.record_down(bytes_down);
    session.log_complete();

    if let Some(source) = up_err.filter(|err| !is_expected_copy_error(err)) {
        return Err(RelayError::CopyInbound { source });
    }
    if let Some(source) = down_err.filter(|err| !is_expected_copy_error(err)) {
        return Err(RelayError::CopyOutbound { source });
    }
    Ok(session.stats())
}

/// One copy direction. On EOF or error the destination gets a write-shutdown
/// so the far side sees our half-close, then the scope is cancelled. Once the
/// scope is cancelled by the sibling, each further read and each write must
/// land within the drain window; a direction idle past it ends with a
/// timeout, which the classifier treats as expected. A destination that
/// stops reading therefore cannot hold the session open past the window.
async fn pump<R, W>(
    mut src: R,
    mut dst: W,
    scope: CancellationToken,
    drain_window: Duration,
) -> (u64, Option<io::Error>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut copied: u64 = 0;
    let mut draining = false;

    let err = loop {
        let read = if draining {
            match timeout(drain_window, src.read(&mut buf)).await {
                Ok(read) => read,
                Err(_) => break Some(io::Error::new(io::ErrorKind::TimedOut, "drain window elapsed")),
            }
        } else {
            tokio::select! {
                read = src.read(&mut buf) => read,
                _ = scope.cancelled() => {
                    draining = true;
                    continue;
                }
            }
        };

        match read {
            Ok(0) => break None,
            Ok(n) => {
                if let Err(err) =
                    write_chunk(&mut dst, &buf[..n], &scope, drain_window, &mut draining).await
                {
                    break Some(err);
                }
                copied += n as u64;
            }
            Err(err) => break Some(err),
        }
    };

    // Half-close towards the destination before waking the sibling.
    let _ = dst.shutdown().await;
    scope.cancel();
    (copied, err)
}

/// Writes one chunk. While the scope is live the write races cancellation;
/// a cancelled scope bounds the remainder of the same write, and every later
/// one, by the drain window. The in-flight future is kept pinned across the
/// race, never restarted, so no byte is written twice.
async fn write_chunk<W>(
    dst: &mut W,
    chunk: &[u8],
    scope: &CancellationToken,
    drain_window: Duration,
    draining: &mut bool,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut write = pin!(dst.write_all(chunk));
    if !*draining {
        tokio::select! {
            result = &mut write => return result,
            _ = scope.cancelled() => *draining = true,
        }
    }
    match timeout(drain_window, &mut write).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "drain window elapsed")),
    }
}

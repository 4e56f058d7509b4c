//! Integration tests for the TCP relay engine

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};

use overpass::config::RelayTuning;
use overpass::overlay::{DirectDialer, OverlayDialer, OverlayStream};
use overpass::relay::tcp::relay;
use overpass::RelayError;

fn fast_tuning() -> RelayTuning {
    RelayTuning {
        keepalive: Duration::from_secs(30),
        drain_window: Duration::from_millis(200),
    }
}

/// Echo server that copies everything back and half-closes on EOF
async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let (mut rd, mut wr) = stream.into_split();
                let _ = tokio::io::copy(&mut rd, &mut wr).await;
                let _ = wr.shutdown().await;
            });
        }
    });
    addr
}

/// Server that floods every accepted connection with data until it errors
async fn spawn_flooding_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let chunk = vec![0xcd_u8; 64 * 1024];
                while stream.write_all(&chunk).await.is_ok() {}
            });
        }
    });
    addr
}

/// One connected client/inbound pair, as the accept loop would hand over
async fn accepted_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).await.unwrap();
    let (inbound, _) = listener.accept().await.unwrap();
    (client, inbound)
}

#[tokio::test]
async fn echo_roundtrip_delivers_all_bytes() {
    let echo = spawn_echo_server().await;
    let (mut client, inbound) = accepted_pair().await;

    let handle = tokio::spawn(async move {
        relay(inbound, &DirectDialer, &echo.to_string(), fast_tuning()).await
    });

    // Larger than one copy buffer so the pump loops a few times.
    let payload = vec![0xab_u8; 64 * 1024];
    client.write_all(&payload).await.unwrap();
    client.shutdown().await.unwrap();

    let mut echoed = Vec::new();
    client.read_to_end(&mut echoed).await.unwrap();
    assert_eq!(echoed, payload);

    let stats = handle.await.unwrap().expect("relay should terminate cleanly");
    assert_eq!(stats.bytes_up, payload.len() as u64);
    assert_eq!(stats.bytes_down, payload.len() as u64);
}

#[tokio::test]
async fn immediate_close_terminates_cleanly() {
    let echo = spawn_echo_server().await;
    let (client, inbound) = accepted_pair().await;
    drop(client);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        relay(inbound, &DirectDialer, &echo.to_string(), fast_tuning()),
    )
    .await
    .expect("relay must not hang on a zero-byte session");

    let stats = result.expect("immediate close is not a fault");
    assert_eq!(stats.bytes_up, 0);
    assert_eq!(stats.bytes_down, 0);
}

struct RefusingDialer;

#[async_trait]
impl OverlayDialer for RefusingDialer {
    async fn dial(&self, _addr: &str) -> io::Result<Box<dyn OverlayStream>> {
        Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "no route to target",
        ))
    }
}

#[tokio::test]
async fn dial_failure_is_fatal_to_the_session_only() {
    let (mut client, inbound) = accepted_pair().await;

    let err = relay(inbound, &RefusingDialer, "unreachable:1", fast_tuning())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Dial { .. }));
    assert!(err.is_dial());

    // The inbound stream is closed by the time relay() returns; no task keeps
    // servicing it, so the client sees EOF promptly.
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(1), client.read(&mut buf))
        .await
        .expect("client read must not hang")
        .unwrap();
    assert_eq!(n, 0);
}

/// An outbound stream whose reads fail with a non-lifecycle error
struct FaultyStream;

impl AsyncRead for FaultyStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "corrupted frame",
        )))
    }
}

impl AsyncWrite for FaultyStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl OverlayStream for FaultyStream {}

struct FaultyDialer;

#[async_trait]
impl OverlayDialer for FaultyDialer {
    async fn dial(&self, _addr: &str) -> io::Result<Box<dyn OverlayStream>> {
        Ok(Box::new(FaultyStream))
    }
}

#[tokio::test]
async fn unexpected_outbound_error_is_reported_with_its_direction() {
    let (_client, inbound) = accepted_pair().await;

    let err = relay(inbound, &FaultyDialer, "target:1", fast_tuning())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::CopyOutbound { .. }));
}

#[tokio::test]
async fn half_closed_client_that_stops_reading_cannot_wedge_the_session() {
    let flood = spawn_flooding_server().await;
    let (mut client, inbound) = accepted_pair().await;

    // The client half-closes and never reads again while the target keeps
    // sending. The downstream pump's writes fill the client's socket buffers
    // and block; the drain window must end the session anyway.
    client.shutdown().await.unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        relay(inbound, &DirectDialer, &flood.to_string(), fast_tuning()),
    )
    .await
    .expect("relay must not hang on a blocked write to a non-reading client");
    assert!(
        result.is_ok(),
        "a lapsed drain window is expected termination: {result:?}"
    );
    drop(client);
}

#[tokio::test]
async fn peer_reset_is_expected_termination() {
    let echo = spawn_echo_server().await;
    let (client, inbound) = accepted_pair().await;

    // An abortive close (RST instead of FIN) is ordinary lifecycle, not a
    // relay fault.
    client.set_linger(Some(Duration::ZERO)).unwrap();
    drop(client);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        relay(inbound, &DirectDialer, &echo.to_string(), fast_tuning()),
    )
    .await
    .expect("relay must not hang after a reset");
    assert!(result.is_ok(), "reset should classify as expected: {result:?}");
}

//! Mode Dispatcher
//!
//! The target address is parsed exactly once at startup (see `config`); this
//! module binds the local listener for the selected mode and runs it for the
//! remainder of the process life. Per-connection and per-request errors never
//! terminate the process; only bind failures propagate.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use http::Uri;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::overlay::OverlayDialer;
use crate::relay::{tcp, HttpRelay};
use crate::upstream::OverlayHttpClient;
use crate::{Result, Target};

/// Binds the listener and serves until a shutdown signal arrives. In-flight
/// sessions are not drained; closing the listener is the only teardown step.
pub async fn run(config: &Config, dialer: Arc<dyn OverlayDialer>) -> Result<()> {
    match &config.target {
        Target::Tcp(target) => serve_tcp(config, dialer, target.clone()).await,
        Target::Http(origin) => serve_http(config, dialer, origin.clone()).await,
    }
}

async fn serve_tcp(config: &Config, dialer: Arc<dyn OverlayDialer>, target: String) -> Result<()> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("unable to bind listener on {}", config.listen_addr))?;
    info!(
        listen_addr = %config.listen_addr,
        target = %target,
        "running in TCP tunnel mode"
    );

    let tuning = config.tuning;
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown_signal() => {
                info!("shutdown signal received, closing listener");
                return Ok(());
            }
        };
        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(err) => {
                error!(%err, "listener accept failed");
                continue;
            }
        };

        let dialer = dialer.clone();
        let target = target.clone();
        tokio::spawn(async move {
            if let Err(err) = tcp::relay(stream, dialer.as_ref(), &target, tuning).await {
                warn!(%peer, ?err, "relay session failed");
            }
        });
    }
}

async fn serve_http(config: &Config, dialer: Arc<dyn OverlayDialer>, origin: Uri) -> Result<()> {
    let client = OverlayHttpClient::new(dialer, config.http_deadline);
    let relay = Arc::new(HttpRelay::new(client, origin.clone()));

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("unable to bind listener on {}", config.listen_addr))?;
    info!(
        listen_addr = %config.listen_addr,
        origin = %origin,
        "running in HTTP reverse-proxy mode"
    );

    axum::serve(
        listener,
        relay
            .router()
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("http server failed")
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                error!(%err, "unable to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

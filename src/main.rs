//! Overpass - Single-Target Overlay Forwarder
//!
//! Listens on one local address and relays every accepted connection to one
//! fixed endpoint behind the overlay network, as a raw TCP tunnel or an HTTP
//! reverse proxy depending on the target address scheme.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use overpass::config::{parse_listen_addr, RelayTuning};
use overpass::overlay::iroh::IrohOverlay;
use overpass::{server, Config, Target};

/// CLI arguments. Every setting also reads from an environment variable;
/// the flag takes precedence.
#[derive(Parser, Debug)]
#[command(name = "overpass")]
#[command(about = "Single-target forwarder onto an overlay network")]
#[command(version)]
pub struct CliArgs {
    /// Hostname to register on the overlay network
    #[arg(long, env = "OVERPASS_HOSTNAME")]
    pub hostname: String,

    /// Overlay auth credential
    #[arg(long, env = "OVERPASS_AUTH_KEY", hide_env_values = true)]
    pub auth_key: String,

    /// Port or address to listen on (e.g. 8080 or 127.0.0.1:8080)
    #[arg(long, env = "OVERPASS_LISTEN_ADDR")]
    pub listen_addr: String,

    /// Target: host:port for a TCP tunnel, http(s)://host:port for a reverse proxy
    #[arg(long, env = "OVERPASS_TARGET_ADDR")]
    pub target_addr: String,

    /// Persistent state directory for the overlay client
    #[arg(long, env = "OVERPASS_STATE_DIR", default_value = "/var/lib/overpass")]
    pub state_dir: PathBuf,

    /// TCP keep-alive interval for both relay legs
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    pub keepalive_interval: Duration,

    /// Overall deadline for one outbound HTTP exchange
    #[arg(long, default_value = "5m", value_parser = humantime::parse_duration)]
    pub http_deadline: Duration,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl CliArgs {
    fn into_config(self) -> Result<Config> {
        Ok(Config {
            hostname: self.hostname,
            auth_key: self.auth_key,
            listen_addr: parse_listen_addr(&self.listen_addr)?,
            target: Target::parse(&self.target_addr)?,
            state_dir: self.state_dir,
            tuning: RelayTuning {
                keepalive: self.keepalive_interval,
                ..RelayTuning::default()
            },
            http_deadline: self.http_deadline,
        })
    }
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_tracing(&args.log_level);

    if let Err(err) = run(args).await {
        error!("fatal: {err:#}");
        std::process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let config = args.into_config()?;

    info!(
        "🚀 starting overpass v{} (hostname={}, listen-addr={}, target-addr={}, mode={})",
        env!("CARGO_PKG_VERSION"),
        config.hostname,
        config.listen_addr,
        config.target,
        config.target.mode()
    );

    let overlay = IrohOverlay::start(&config.overlay())
        .await
        .context("can't start overlay client")?;

    server::run(&config, Arc::new(overlay)).await
}

fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(env_filter)
        .init();
}

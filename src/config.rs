//! Configuration Types
//!
//! The configuration is built exactly once at startup from CLI arguments with
//! per-setting environment fallback (the flag wins) and is immutable for the
//! process lifetime.

use std::net::{Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use http::Uri;

use crate::overlay::iroh::OverlayConfig;
use crate::Result;

/// Immutable process configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Identity the process registers under on the overlay network
    pub hostname: String,
    /// Credential presented to overlay peers; required
    pub auth_key: String,
    /// Local bind address for the relay
    pub listen_addr: SocketAddr,
    /// The single fixed destination, parsed once
    pub target: Target,
    /// Persistent local state path for the overlay client
    pub state_dir: PathBuf,
    /// Timeouts for the TCP relay
    pub tuning: RelayTuning,
    /// Overall deadline for one outbound HTTP exchange up to the response
    /// headers (response body streaming is deliberately exempt)
    pub http_deadline: Duration,
}

/// Per-session timing knobs for the TCP relay
#[derive(Debug, Clone, Copy)]
pub struct RelayTuning {
    /// TCP keep-alive interval applied to both legs where supported
    pub keepalive: Duration,
    /// How long a copy direction may keep draining after its sibling
    /// completed and cancelled the session scope
    pub drain_window: Duration,
}

impl Default for RelayTuning {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(30),
            drain_window: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// The overlay client's slice of the configuration
    pub fn overlay(&self) -> OverlayConfig {
        OverlayConfig {
            hostname: self.hostname.clone(),
            auth_key: self.auth_key.clone(),
            state_dir: self.state_dir.clone(),
        }
    }
}

/// The parsed target address. Selects the relay mode for the whole process
/// run: `http`/`https` schemes run the HTTP reverse proxy, anything else is
/// treated as a `host:port` TCP tunnel destination.
#[derive(Debug, Clone)]
pub enum Target {
    /// Raw byte-stream relaying to `host:port`
    Tcp(String),
    /// HTTP reverse-proxying onto this origin
    Http(Uri),
}

impl Target {
    /// Parse the target address once at startup. Errors here are fatal to
    /// the process; nothing is re-parsed at runtime.
    pub fn parse(raw: &str) -> Result<Target> {
        let uri: Uri = raw
            .parse()
            .with_context(|| format!("unable to parse target address {raw:?}"))?;

        match uri.scheme_str() {
            Some("http") | Some("https") => {
                if uri.authority().is_none() {
                    bail!("target address {raw:?} has an http(s) scheme but no host");
                }
                Ok(Target::Http(uri))
            }
            _ => {
                let (host, port) = raw
                    .rsplit_once(':')
                    .with_context(|| format!("target address {raw:?} must be host:port or an http(s) URL"))?;
                if host.is_empty() {
                    bail!("target address {raw:?} is missing a host");
                }
                port.parse::<u16>()
                    .with_context(|| format!("target address {raw:?} has an invalid port"))?;
                Ok(Target::Tcp(raw.to_string()))
            }
        }
    }

    /// Human-readable mode name, used in startup logging
    pub fn mode(&self) -> &'static str {
        match self {
            Target::Tcp(_) => "tcp",
            Target::Http(_) => "http",
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Tcp(addr) => write!(f, "{addr}"),
            Target::Http(origin) => write!(f, "{origin}"),
        }
    }
}

/// Accepts either a bare port (bound on all interfaces) or a full socket
/// address.
pub fn parse_listen_addr(raw: &str) -> Result<SocketAddr> {
    if let Ok(port) = raw.parse::<u16>() {
        return Ok(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)));
    }
    raw.parse()
        .with_context(|| format!("unable to parse listen address {raw:?}"))
}

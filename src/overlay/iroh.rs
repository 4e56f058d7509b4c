//! iroh-backed Overlay Network Client
//!
//! The production dialer. The process owns one `iroh::Endpoint` whose node
//! identity is persisted under the state directory, so the forwarder keeps a
//! stable overlay address across restarts. A dial connects to the peer named
//! by the target host, opens one bidirectional stream per relay session, and
//! sends a forward preamble carrying the auth credential and the requested
//! `host:port`; the peer answers with a one-byte ack before any payload
//! flows.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use iroh::endpoint::{RecvStream, SendStream};
use iroh::{Endpoint, NodeId, SecretKey};
use tracing::{debug, info};

use crate::overlay::{OverlayDialer, OverlayStream};
use crate::Result;

/// ALPN for the forward protocol
pub const ALPN: &[u8] = b"overpass/fwd/0";

/// Magic prefix of the forward preamble
const PREAMBLE_MAGIC: &[u8; 4] = b"OVP1";

/// Ack byte sent by the peer once the target connection is established
pub const ACK_OK: u8 = 0;

/// Filename of the persisted node identity inside the state directory
const IDENTITY_FILE: &str = "identity.key";

/// Settings the overlay client needs from the process configuration
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Identity the process registers under, for operators reading logs
    pub hostname: String,
    /// Credential presented to peers in the forward preamble
    pub auth_key: String,
    /// Where the node identity key lives between runs
    pub state_dir: PathBuf,
}

/// Overlay network client over one process-wide iroh endpoint
#[derive(Debug, Clone)]
pub struct IrohOverlay {
    endpoint: Endpoint,
    auth_key: String,
}

impl IrohOverlay {
    /// Binds the overlay endpoint. Failure here is fatal to the process;
    /// there is no relaying without the overlay.
    pub async fn start(config: &OverlayConfig) -> Result<Self> {
        let secret = load_or_create_secret(&config.state_dir)
            .with_context(|| format!("can't load overlay identity from {}", config.state_dir.display()))?;

        let endpoint = Endpoint::builder()
            .secret_key(secret)
            .alpns(vec![ALPN.to_vec()])
            .discovery_n0()
            .bind()
            .await
            .map_err(|err| anyhow!("failed to bind overlay endpoint: {err:?}"))?;

        info!(
            hostname = %config.hostname,
            node_id = %endpoint.node_id(),
            "overlay client started"
        );

        Ok(Self {
            endpoint,
            auth_key: config.auth_key.clone(),
        })
    }

    /// The overlay address other peers reach this process under
    pub fn node_id(&self) -> NodeId {
        self.endpoint.node_id()
    }
}

#[async_trait]
impl OverlayDialer for IrohOverlay {
    async fn dial(&self, addr: &str) -> io::Result<Box<dyn OverlayStream>> {
        let (host, _port) = addr.rsplit_once(':').ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("target {addr:?} is not host:port"))
        })?;
        let node_id: NodeId = host.parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("target host {host:?} is not an overlay node id"),
            )
        })?;

        debug!(%node_id, %addr, "dialing through overlay");
        let connection = self
            .endpoint
            .connect(node_id, ALPN)
            .await
            .map_err(io::Error::other)?;
        let (mut send, mut recv) = connection.open_bi().await.map_err(io::Error::other)?;

        send.write_all(&encode_preamble(&self.auth_key, addr))
            .await
            .map_err(io::Error::other)?;

        let mut ack = [0u8; 1];
        recv.read_exact(&mut ack).await.map_err(io::Error::other)?;
        if ack[0] != ACK_OK {
            return Err(io::Error::other(format!(
                "overlay peer refused forward to {addr} (code {})",
                ack[0]
            )));
        }

        Ok(Box::new(tokio::io::join(recv, send)))
    }
}

// QUIC runs its own keep-alive; the default no-op capability is correct here.
impl OverlayStream for tokio::io::Join<RecvStream, SendStream> {}

/// Wire format: magic, then auth credential and target address as
/// length-prefixed (u16 BE) byte strings.
fn encode_preamble(auth_key: &str, target: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PREAMBLE_MAGIC.len() + 4 + auth_key.len() + target.len());
    buf.extend_from_slice(PREAMBLE_MAGIC);
    buf.extend_from_slice(&(auth_key.len() as u16).to_be_bytes());
    buf.extend_from_slice(auth_key.as_bytes());
    buf.extend_from_slice(&(target.len() as u16).to_be_bytes());
    buf.extend_from_slice(target.as_bytes());
    buf
}

fn load_or_create_secret(dir: &Path) -> Result<SecretKey> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("can't create state directory {}", dir.display()))?;
    let path = dir.join(IDENTITY_FILE);

    if path.exists() {
        let encoded = std::fs::read_to_string(&path)
            .with_context(|| format!("can't read {}", path.display()))?;
        let bytes: [u8; 32] = hex::decode(encoded.trim())
            .context("identity key is not valid hex")?
            .try_into()
            .map_err(|_| anyhow!("identity key has the wrong length"))?;
        Ok(SecretKey::from_bytes(&bytes))
    } else {
        let secret = SecretKey::generate(rand::rngs::OsRng);
        std::fs::write(&path, hex::encode(secret.to_bytes()))
            .with_context(|| format!("can't write {}", path.display()))?;
        info!(path = %path.display(), "generated new overlay identity");
        Ok(secret)
    }
}

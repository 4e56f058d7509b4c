//! Overlay-bound HTTP Client
//!
//! Every outbound HTTP exchange is dialed exclusively through the overlay
//! client; there is no direct network path. The 5-minute default deadline
//! covers dial, TLS, request send, and response headers. For `https` targets
//! certificate verification is disabled: the overlay network's own
//! authentication is the trust boundary, not public PKI.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_rustls::rustls;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{DigitallySignedStruct, SignatureScheme};
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::RelayError;
use crate::overlay::OverlayDialer;

trait Io: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// HTTP/1.1 client whose connections all go through one overlay dialer.
/// Shared across requests; holds no per-request state.
pub struct OverlayHttpClient {
    dialer: Arc<dyn OverlayDialer>,
    deadline: Duration,
    tls: TlsConnector,
}

impl OverlayHttpClient {
    pub fn new(dialer: Arc<dyn OverlayDialer>, deadline: Duration) -> Self {
        let tls_config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification))
            .with_no_client_auth();
        Self {
            dialer,
            deadline,
            tls: TlsConnector::from(Arc::new(tls_config)),
        }
    }

    /// Executes one request. Single attempt, no retry; the deadline bounds
    /// everything up to the response headers. The streamed response body is
    /// deliberately not bounded so long-lived responses are not truncated.
    pub async fn request(
        &self,
        req: http::Request<Body>,
    ) -> Result<http::Response<Incoming>, RelayError> {
        match timeout(self.deadline, self.exchange(req)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Send {
                source: Box::new(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "outbound exchange deadline exceeded",
                )),
            }),
        }
    }

    async fn exchange(
        &self,
        req: http::Request<Body>,
    ) -> Result<http::Response<Incoming>, RelayError> {
        let uri = req.uri();
        let https = uri.scheme_str() == Some("https");
        let host = uri
            .host()
            .ok_or_else(|| RelayError::Send {
                source: "outbound request has no host".into(),
            })?
            .to_string();
        let port = uri.port_u16().unwrap_or(if https { 443 } else { 80 });
        let addr = format!("{host}:{port}");

        let stream = self
            .dialer
            .dial(&addr)
            .await
            .map_err(|source| RelayError::Dial {
                target: addr.clone(),
                source,
            })?;

        let io: Box<dyn Io> = if https {
            let server_name = ServerName::try_from(host).map_err(|err| RelayError::Send {
                source: Box::new(err),
            })?;
            let tls_stream = self
                .tls
                .connect(server_name, stream)
                .await
                .map_err(|source| RelayError::Send {
                    source: Box::new(source),
                })?;
            Box::new(tls_stream)
        } else {
            Box::new(stream)
        };

        let (mut sender, connection) = hyper::client::conn::http1::Builder::new()
            .handshake(TokioIo::new(io))
            .await
            .map_err(|source| RelayError::Send {
                source: Box::new(source),
            })?;

        // Drives the connection until the response body is fully consumed or
        // dropped by the relay handler.
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                debug!(%err, "upstream connection ended with error");
            }
        });

        sender
            .send_request(req)
            .await
            .map_err(|source| RelayError::Send {
                source: Box::new(source),
            })
    }
}

/// Accepts any upstream certificate. See the module docs for why.
#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA1,
            SignatureScheme::ECDSA_SHA1_Legacy,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

//! HTTP Relay
//!
//! Rewrites each inbound request onto the fixed target origin, forwards it
//! through the overlay-bound HTTP client, and streams the response back.
//! Bodies are never buffered. Errors are terminal to the one request/response
//! cycle only: they become a 500 to the caller and are logged, nothing else.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::response::{IntoResponse, Response};
use axum::Router;
use http::header::HOST;
use http::{HeaderValue, StatusCode, Uri};
use tracing::{info, warn};

use crate::headers::copy_headers;
use crate::upstream::OverlayHttpClient;

/// Response header carrying the caller's address, set on every proxied
/// response.
const FORWARDED_FOR: &str = "x-forwarded-for";

/// Per-request reverse proxy onto one fixed origin
pub struct HttpRelay {
    client: OverlayHttpClient,
    origin: Uri,
}

impl HttpRelay {
    pub fn new(client: OverlayHttpClient, origin: Uri) -> Self {
        Self { client, origin }
    }

    /// Builds the axum router: every path and method lands on the relay.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new().fallback(forward).with_state(self)
    }

    /// Forwards one request and streams the response back. Never fails the
    /// server; every error path produces a response.
    pub async fn forward(&self, peer: SocketAddr, req: Request) -> Response {
        let (parts, body) = req.into_parts();

        let target_uri = match rewrite_uri(&self.origin, &parts.uri) {
            Ok(uri) => uri,
            Err(err) => {
                warn!(%err, "error creating request");
                return (StatusCode::INTERNAL_SERVER_ERROR, "error creating request").into_response();
            }
        };
        info!("{} {}", parts.method, target_uri);

        let mut outbound = match http::Request::builder()
            .method(parts.method.clone())
            .uri(target_uri)
            .body(body)
        {
            Ok(outbound) => outbound,
            Err(err) => {
                warn!(%err, "error creating request");
                return (StatusCode::INTERNAL_SERVER_ERROR, "error creating request").into_response();
            }
        };
        copy_headers(&parts.headers, outbound.headers_mut());
        // The Host header must name the upstream origin, not this listener.
        if let Some(authority) = self.origin.authority() {
            match HeaderValue::from_str(authority.as_str()) {
                Ok(host) => {
                    outbound.headers_mut().insert(HOST, host);
                }
                Err(err) => {
                    warn!(%err, "error creating request");
                    return (StatusCode::INTERNAL_SERVER_ERROR, "error creating request")
                        .into_response();
                }
            }
        }

        let upstream = match self.client.request(outbound).await {
            Ok(upstream) => upstream,
            Err(err) => {
                warn!(%err, "error sending request");
                return (StatusCode::INTERNAL_SERVER_ERROR, "error sending request").into_response();
            }
        };

        let status = upstream.status();
        let upstream_headers = upstream.headers().clone();

        // Stream the upstream body through verbatim; dropping it (any path
        // from here) closes the upstream connection. Copy errors past this
        // point are not classified, the connection just ends.
        let mut response = Response::new(Body::new(upstream.into_body()));
        *response.status_mut() = status;
        copy_headers(&upstream_headers, response.headers_mut());
        if let Ok(caller) = HeaderValue::from_str(&peer.ip().to_string()) {
            response.headers_mut().insert(FORWARDED_FOR, caller);
        }
        response
    }
}

async fn forward(
    State(relay): State<Arc<HttpRelay>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    relay.forward(peer, req).await
}

/// Target URI = target origin + inbound path, query preserved. The scheme
/// and host are always replaced by the origin's; an origin with a non-root
/// path prefixes every inbound path.
fn rewrite_uri(origin: &Uri, inbound: &Uri) -> Result<Uri, http::Error> {
    let inbound_pq = inbound
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let base = origin.path().trim_end_matches('/');
    let path_and_query = if base.is_empty() {
        inbound_pq.to_string()
    } else {
        format!("{base}{inbound_pq}")
    };

    let mut builder = Uri::builder();
    if let Some(scheme) = origin.scheme() {
        builder = builder.scheme(scheme.clone());
    }
    if let Some(authority) = origin.authority() {
        builder = builder.authority(authority.clone());
    }
    builder.path_and_query(path_and_query).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_replaces_origin_and_keeps_query() {
        let origin: Uri = "http://backend:8080".parse().unwrap();
        let inbound: Uri = "/foo?x=1".parse().unwrap();
        let rewritten = rewrite_uri(&origin, &inbound).unwrap();
        assert_eq!(rewritten.to_string(), "http://backend:8080/foo?x=1");
    }

    #[test]
    fn rewrite_keeps_an_origin_path_prefix() {
        let origin: Uri = "http://backend:8080/base".parse().unwrap();
        let inbound: Uri = "/foo?x=1".parse().unwrap();
        let rewritten = rewrite_uri(&origin, &inbound).unwrap();
        assert_eq!(rewritten.to_string(), "http://backend:8080/base/foo?x=1");

        let trailing: Uri = "http://backend:8080/base/".parse().unwrap();
        let rewritten = rewrite_uri(&trailing, &inbound).unwrap();
        assert_eq!(rewritten.to_string(), "http://backend:8080/base/foo?x=1");
    }

    #[test]
    fn rewrite_defaults_to_root_path() {
        let origin: Uri = "https://backend".parse().unwrap();
        let inbound: Uri = "/".parse().unwrap();
        let rewritten = rewrite_uri(&origin, &inbound).unwrap();
        assert_eq!(rewritten.to_string(), "https://backend/");
    }
}

//! Hop-by-hop Header Filtering
//!
//! Headers that are meaningful only for one transport leg must not be
//! forwarded verbatim across the proxy boundary (RFC 9110 §7.6.1). The same
//! filter applies to both legs: inbound request headers copied onto the
//! outbound request, and upstream response headers copied back to the client.

use http::{HeaderMap, HeaderName};

/// The fixed hop-by-hop header set. Never mutated at runtime; matched
/// case-insensitively (`HeaderName` is always lowercase).
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "te",
];

/// Whether a header must be dropped at the proxy boundary
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Copies every header pair from `src` into `dst`, excluding the hop-by-hop
/// set. Multi-value headers keep their order within a name.
pub fn copy_headers(src: &HeaderMap, dst: &mut HeaderMap) {
    for (name, value) in src {
        if !is_hop_by_hop(name) {
            dst.append(name.clone(), value.clone());
        }
    }
}

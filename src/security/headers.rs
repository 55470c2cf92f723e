//! Header manipulation and security headers.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Drop the inbound `Host` so the client derives it from the target
//! - Add security response headers (optional)
//!
//! # Design Decisions
//! - `HeaderMap` names are already lowercase, so matching is case-insensitive
//! - Everything else passes through untouched, repeated values included

use axum::http::{
    header::{
        CONNECTION, HOST, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, REFERRER_POLICY, TE, TRAILER,
        TRANSFER_ENCODING, UPGRADE, X_CONTENT_TYPE_OPTIONS, X_DNS_PREFETCH_CONTROL,
        X_FRAME_OPTIONS,
    },
    HeaderMap, HeaderName, HeaderValue,
};
use tower_http::set_header::SetResponseHeaderLayer;

/// Headers that only describe a single connection leg.
pub const HOP_BY_HOP: [HeaderName; 8] = [
    CONNECTION,
    HeaderName::from_static("keep-alive"),
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

/// Which leg of the proxy a header set travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Caller → upstream.
    Request,
    /// Upstream → caller.
    Response,
}

/// Remove hop-by-hop headers, plus `Host` on the request side.
pub fn sanitize(mut headers: HeaderMap, direction: Direction) -> HeaderMap {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }

    if direction == Direction::Request {
        headers.remove(HOST);
    }

    headers
}

/// Layers adding baseline security headers when the response lacks them.
pub fn security_header_layers() -> [SetResponseHeaderLayer<HeaderValue>; 4] {
    [
        SetResponseHeaderLayer::if_not_present(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ),
        SetResponseHeaderLayer::if_not_present(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ),
        SetResponseHeaderLayer::if_not_present(
            REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ),
        SetResponseHeaderLayer::if_not_present(
            X_DNS_PREFETCH_CONTROL,
            HeaderValue::from_static("off"),
        ),
    ]
}

//! Hand-off point for a tunneling collaborator.
//!
//! A tunnel (for example a WebSocket relay) owns its own route detection and
//! upgrade handling. The proxy only asks whether a request belongs to it and,
//! if so, passes the request over untouched. Tunnel requests take priority
//! over every other route, the static fallback included.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use futures_util::future::BoxFuture;

/// External component that claims some inbound requests for itself.
pub trait Tunnel: Send + Sync + 'static {
    /// True if this request belongs to the tunnel.
    fn should_route(&self, request: &Request<Body>) -> bool;

    /// Serve a request previously claimed by [`should_route`](Self::should_route).
    fn route(&self, request: Request<Body>) -> BoxFuture<'static, Response>;
}

pub async fn tunnel_middleware(
    State(tunnel): State<Arc<dyn Tunnel>>,
    request: Request,
    next: Next,
) -> Response {
    if tunnel.should_route(&request) {
        tracing::debug!(path = %request.uri().path(), "Handing request to tunnel");
        return tunnel.route(request).await;
    }
    next.run(request).await
}

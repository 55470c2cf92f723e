//! Proxy error taxonomy and its mapping onto HTTP responses.
//!
//! Callers only ever see the generic message from [`ProxyError::public_message`];
//! the detail carried by each variant is for server-side logs.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Status used in logs for requests whose caller went away.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Failures along the forwarding path.
#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    /// Target missing, undecodable, unparsable or not http/https.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// JSON invocation named a method that is not an HTTP token.
    #[error("invalid method: {0}")]
    InvalidMethod(String),

    /// JSON invocation carried a header that cannot be sent.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// JSON invocation fields have the wrong shape, e.g. a numeric method.
    #[error("invalid invocation: {0}")]
    InvalidInvocation(String),

    /// JSON invocation body exceeded the configured limit.
    #[error("payload too large")]
    PayloadTooLarge,

    /// Target not covered by the allow-list.
    #[error("target not allowed: {0}")]
    Forbidden(String),

    /// No upstream response headers within the dispatch timeout.
    #[error("upstream timed out after {0:?}")]
    TimeoutExceeded(Duration),

    /// Connection refused, DNS, TLS or other transport failure.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Upstream answered with something that is not valid HTTP.
    #[error("upstream protocol error: {0}")]
    UpstreamProtocol(String),

    /// A required secret is not configured.
    #[error("configuration missing: {0}")]
    ConfigurationMissing(&'static str),

    /// New proxy work is refused while draining.
    #[error("server shutting down")]
    ShuttingDown,

    /// Caller disconnected or the server aborted in-flight work.
    #[error("request cancelled")]
    Cancelled,

    /// Anything unclassified.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidTarget(_)
            | ProxyError::InvalidMethod(_)
            | ProxyError::InvalidHeader(_)
            | ProxyError::InvalidInvocation(_) => StatusCode::BAD_REQUEST,
            ProxyError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Forbidden(_) => StatusCode::FORBIDDEN,
            ProxyError::TimeoutExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamUnreachable(_) | ProxyError::UpstreamProtocol(_) => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::ConfigurationMissing(_) | ProxyError::ShuttingDown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProxyError::Cancelled => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the caller.
    pub fn public_message(&self) -> &'static str {
        match self {
            ProxyError::InvalidTarget(_) => "Invalid or missing URL",
            ProxyError::InvalidMethod(_) => "Invalid method",
            ProxyError::InvalidHeader(_) => "Invalid header",
            ProxyError::InvalidInvocation(_) => "Invalid invocation",
            ProxyError::PayloadTooLarge => "Payload too large",
            ProxyError::Forbidden(_) => "URL not allowed",
            ProxyError::TimeoutExceeded(_) => "Request timed out",
            ProxyError::UpstreamUnreachable(_) | ProxyError::UpstreamProtocol(_) => "Bad gateway",
            ProxyError::ConfigurationMissing(_) => "Service unavailable",
            ProxyError::ShuttingDown => "Server shutting down",
            ProxyError::Cancelled => "Request cancelled",
            ProxyError::Internal(_) => "Internal server error",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Proxy request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Proxy request rejected");
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

//! Upstream dispatch.
//!
//! # Responsibilities
//! - Issue the outbound request with the sanitized headers
//! - Stream the request body without buffering it
//! - Bound the wait for response headers and honour cancellation
//! - Classify transport failures into the proxy error taxonomy
//!
//! # Design Decisions
//! - Single attempt. Retry policy belongs to whoever calls the proxy
//! - Every redirect hop is checked against the allow-list; a hop it rejects
//!   is relayed to the caller instead of followed
//! - The timeout ends when response headers arrive; body transfer is unbounded
//!   so long downloads survive
//! - Dropping the in-flight future closes the outbound connection, so timeout,
//!   cancellation and caller disconnect all release it the same way

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::Method;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::redirect::Policy;
use tokio_util::sync::CancellationToken;

use crate::config::UpstreamConfig;
use crate::http::error::ProxyError;
use crate::http::request::ProxyRequest;
use crate::http::response::ProxyResponse;
use crate::security::AllowList;

/// Outbound HTTP client with a fixed header-wait timeout.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl Dispatcher {
    /// Client for `config`. Redirects are only followed to targets `allow_list` admits.
    pub fn new(
        config: &UpstreamConfig,
        allow_list: Arc<AllowList>,
    ) -> Result<Self, reqwest::Error> {
        let redirect = if config.follow_redirects {
            redirect_policy(config.max_redirects, allow_list)
        } else {
            Policy::none()
        };

        let mut builder = reqwest::Client::builder().redirect(redirect);
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.as_str());
        }

        Ok(Self {
            client: builder.build()?,
            timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    /// Send `request` and wait for the upstream response headers.
    ///
    /// Fails with `TimeoutExceeded` if headers take longer than the configured
    /// timeout and with `Cancelled` if `cancel` fires first.
    pub async fn dispatch(
        &self,
        request: ProxyRequest,
        cancel: &CancellationToken,
    ) -> Result<ProxyResponse, ProxyError> {
        let ProxyRequest {
            method,
            target,
            headers,
            body,
        } = request;

        let head_only = method == Method::HEAD;
        let mut outbound = self.client.request(method.clone(), target.clone()).headers(headers);
        if let Some(body) = body {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let started = Instant::now();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(method = %method, upstream = %target, "Upstream request cancelled");
                return Err(ProxyError::Cancelled);
            }
            result = tokio::time::timeout(self.timeout, outbound.send()) => match result {
                Ok(Ok(response)) => response,
                Ok(Err(error)) => return Err(classify(error)),
                Err(_) => return Err(ProxyError::TimeoutExceeded(self.timeout)),
            },
        };

        tracing::debug!(
            method = %method,
            upstream = %target,
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Upstream responded"
        );

        Ok(into_proxy_response(response, head_only))
    }
}

/// Follow at most `max` hops, and only to targets the allow-list admits.
fn redirect_policy(max: usize, allow_list: Arc<AllowList>) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > max {
            return attempt.error("too many redirects");
        }
        if !allow_list.allowed(attempt.url().as_str()) {
            tracing::warn!(location = %attempt.url(), "Redirect target not allowed; relaying");
            return attempt.stop();
        }
        attempt.follow()
    })
}

fn into_proxy_response(response: reqwest::Response, head_only: bool) -> ProxyResponse {
    let status = response.status();
    let headers = response.headers().clone();

    let empty = head_only
        || status.is_informational()
        || status == reqwest::StatusCode::NO_CONTENT
        || status == reqwest::StatusCode::NOT_MODIFIED;

    let body = if empty {
        None
    } else {
        Some(response.bytes_stream().map_err(classify).boxed())
    };

    ProxyResponse {
        status,
        headers,
        body,
    }
}

/// Map a client error onto the taxonomy.
pub(crate) fn classify(error: reqwest::Error) -> ProxyError {
    if error.is_timeout() {
        return ProxyError::UpstreamUnreachable(format!("transport timeout: {}", error));
    }
    if error.is_connect() || has_io_source(&error) {
        return ProxyError::UpstreamUnreachable(error.to_string());
    }
    if error.is_builder() {
        return ProxyError::Internal(error.to_string());
    }
    ProxyError::UpstreamProtocol(error.to_string())
}

fn has_io_source(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(err) = source {
        if err.is::<std::io::Error>() {
            return true;
        }
        source = err.source();
    }
    false
}

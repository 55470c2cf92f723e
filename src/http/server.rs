//! HTTP server setup and request routing.
//!
//! # Responsibilities
//! - Create the Axum router: tunnel hand-off, proxy routes, service
//!   endpoints, static fallback
//! - Wire up middleware (request ID, tracing, CORS, security headers)
//! - Resolve, filter and forward proxy requests
//! - Drain in-flight requests on shutdown, then abort what is left
//!
//! # Route priority
//! ```text
//! tunnel.should_route?  → tunnel
//! /p, /p/, /p/<base64>  → proxy (path or ?link= query form)
//! /proxy/<host/path>    → proxy (rewrite form)
//! POST /proxy           → proxy (JSON invocation)
//! /health, /api, /metrics
//! anything else         → static files
//! ```

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderName,
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Router,
};
use bytes::BytesMut;
use futures_util::StreamExt;
use metrics_exporter_prometheus::BuildError;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use url::Url;

use crate::config::{ProxyConfig, SecretsConfig};
use crate::http::error::ProxyError;
use crate::http::handlers;
use crate::http::request::{Invocation, ProxyRequest};
use crate::http::tunnel::{tunnel_middleware, Tunnel};
use crate::http::upstream::Dispatcher;
use crate::lifecycle::Shutdown;
use crate::observability::{ProxyMetrics, RequestTimer};
use crate::routing::{Inbound, TargetResolver};
use crate::security::{cors::cors_layer, headers::security_header_layers, AllowList};

pub const X_REQUEST_ID: &str = "x-request-id";

/// How long to wait for connections to close once in-flight work is aborted.
const ABORT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to build metrics recorder: {0}")]
    Metrics(#[from] BuildError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<TargetResolver>,
    pub allow_list: Arc<AllowList>,
    pub dispatcher: Dispatcher,
    pub metrics: Arc<ProxyMetrics>,
    pub shutdown: Arc<Shutdown>,
    pub secrets: Arc<SecretsConfig>,
    pub json_body_limit: usize,
    pub started_at: Instant,
}

impl AppState {
    /// Refuse new proxy work once shutdown has started.
    fn accepting(&self) -> Result<(), ProxyError> {
        if self.shutdown.is_triggered() {
            return Err(ProxyError::ShuttingDown);
        }
        Ok(())
    }
}

/// HTTP server for the forward proxy.
pub struct HttpServer {
    config: ProxyConfig,
    state: AppState,
    tunnel: Option<Arc<dyn Tunnel>>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let allow_list = Arc::new(AllowList::new(config.allow_list.iter()));
        if allow_list.is_empty() {
            tracing::info!("Allow-list empty; all targets permitted");
        }

        let state = AppState {
            resolver: Arc::new(TargetResolver::from_config(&config.targets)),
            dispatcher: Dispatcher::new(&config.upstream, allow_list.clone())?,
            allow_list,
            metrics: Arc::new(ProxyMetrics::new()?),
            shutdown: Arc::new(Shutdown::new()),
            secrets: Arc::new(config.secrets.clone()),
            json_body_limit: config.targets.json_body_limit,
            started_at: Instant::now(),
        };

        if state.secrets.external_key.is_none() {
            tracing::warn!("EXTERNAL_SECRET_KEY not set; /api/contact will answer 503");
        }

        Ok(Self {
            config,
            state,
            tunnel: None,
        })
    }

    /// Give matching requests to `tunnel` before any other route.
    pub fn with_tunnel(mut self, tunnel: Arc<dyn Tunnel>) -> Self {
        self.tunnel = Some(tunnel);
        self
    }

    pub fn shutdown_handle(&self) -> Arc<Shutdown> {
        self.state.shutdown.clone()
    }

    pub fn metrics(&self) -> Arc<ProxyMetrics> {
        self.state.metrics.clone()
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        build_router(&self.config, self.state.clone(), self.tunnel.clone())
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Returns once shutdown has been triggered and every connection has
    /// closed, or once the drain deadline has passed and in-flight requests
    /// were aborted.
    pub async fn run(self, listener: TcpListener) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let shutdown = self.state.shutdown.clone();
        let drain_timeout = Duration::from_secs(self.config.lifecycle.drain_timeout_secs);
        let app = self.router();

        let graceful = {
            let shutdown = shutdown.clone();
            async move { shutdown.triggered().await }
        };
        let server = std::future::IntoFuture::into_future(
            axum::serve(listener, app).with_graceful_shutdown(graceful),
        );
        tokio::pin!(server);

        let drain_deadline = async {
            shutdown.triggered().await;
            tracing::info!(
                drain_timeout_secs = drain_timeout.as_secs(),
                "Draining in-flight requests"
            );
            tokio::time::sleep(drain_timeout).await;
        };

        tokio::select! {
            result = &mut server => result?,
            _ = drain_deadline => {
                tracing::warn!("Drain deadline passed; aborting in-flight requests");
                shutdown.abort();
                match tokio::time::timeout(ABORT_GRACE, &mut server).await {
                    Ok(result) => result?,
                    Err(_) => tracing::warn!("Connections still open after abort"),
                }
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn build_router(config: &ProxyConfig, state: AppState, tunnel: Option<Arc<dyn Tunnel>>) -> Router {
    let encoded = config.targets.encoded_prefix.as_str();
    let encoded_scope = encoded.trim_end_matches('/');
    let rewrite = config.targets.rewrite_prefix.as_str();
    let invoke_path = rewrite.trim_end_matches('/');

    let mut router = Router::new()
        .route(encoded_scope, any(proxy_handler))
        .route(encoded, any(proxy_handler))
        .route(&format!("{}{{*rest}}", encoded), any(proxy_handler))
        .route(rewrite, any(proxy_handler))
        .route(&format!("{}{{*rest}}", rewrite), any(proxy_handler))
        .route(invoke_path, post(invoke_handler))
        .route("/health", get(handlers::health))
        .route("/api", get(handlers::api_info))
        .route("/api/contact", post(handlers::contact))
        .route("/api/{*rest}", any(handlers::api_not_found));

    if config.observability.metrics_enabled {
        router = router.route("/metrics", get(handlers::metrics));
    }

    let static_root = Path::new(&config.static_files.root);
    router = if config.static_files.enabled && static_root.is_dir() {
        tracing::info!(root = %static_root.display(), "Serving static files");
        router.fallback_service(ServeDir::new(static_root))
    } else {
        if config.static_files.enabled {
            tracing::warn!(
                root = %static_root.display(),
                "Static directory not found, static files will not be served"
            );
        }
        router.fallback(handlers::not_found)
    };

    let mut router = router.with_state(state);

    if let Some(tunnel) = tunnel {
        router = router.layer(axum::middleware::from_fn_with_state(tunnel, tunnel_middleware));
    }

    if config.security.enable_headers {
        for layer in security_header_layers() {
            router = router.layer(layer);
        }
    }

    let request_id = HeaderName::from_static(X_REQUEST_ID);
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    request_id = %request_id,
                    method = %request.method(),
                    path = %request.uri().path()
                )
            }))
            .layer(PropagateRequestIdLayer::new(request_id))
            .layer(cors_layer(&config.cors)),
    )
}

/// Path, query and rewrite forms.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let timer = state.metrics.start_request();
    let (parts, body) = request.into_parts();

    let target = match state
        .accepting()
        .and_then(|_| state.resolver.resolve(&Inbound::from_uri(&parts.uri)))
        .and_then(|target| state.allow_list.check(&target).map(|_| target))
    {
        Ok(target) => target,
        Err(error) => return error.into_response(),
    };

    forward(&state, ProxyRequest::from_inbound(parts, body, target), timer).await
}

/// `POST /proxy` with `{url, method, headers, data}`.
async fn invoke_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let timer = state.metrics.start_request();
    match prepare_invocation(&state, request).await {
        Ok(request) => forward(&state, request, timer).await,
        Err(error) => error.into_response(),
    }
}

async fn prepare_invocation(
    state: &AppState,
    request: Request<Body>,
) -> Result<ProxyRequest, ProxyError> {
    state.accepting()?;

    let (parts, body) = request.into_parts();
    let payload = read_json(body, state.json_body_limit).await?;
    let target = state
        .resolver
        .resolve(&Inbound::from_uri(&parts.uri).with_body(&payload))?;
    state.allow_list.check(&target)?;

    let invocation = Invocation::deserialize(&payload)
        .map_err(|e| ProxyError::InvalidInvocation(e.to_string()))?;
    ProxyRequest::from_invocation(target, invocation)
}

/// Buffer a JSON body of at most `limit` bytes.
async fn read_json(body: Body, limit: usize) -> Result<Value, ProxyError> {
    let mut stream = body.into_data_stream();
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            tracing::debug!(error = %e, "Failed reading invocation body");
            ProxyError::Cancelled
        })?;
        if buffer.len() + chunk.len() > limit {
            return Err(ProxyError::PayloadTooLarge);
        }
        buffer.extend_from_slice(&chunk);
    }

    serde_json::from_slice(&buffer)
        .map_err(|e| ProxyError::InvalidTarget(format!("body is not JSON: {}", e)))
}

async fn forward(state: &AppState, request: ProxyRequest, timer: RequestTimer) -> Response {
    tracing::info!(
        method = %request.method,
        upstream = %redact(&request.target),
        "Proxying request"
    );

    let cancel = state.shutdown.request_token();
    match state.dispatcher.dispatch(request, &cancel).await {
        Ok(response) => response.into_streaming_response(timer, cancel),
        Err(error) => error.into_response(),
    }
}

/// Target without query string or userinfo, which often carry credentials.
fn redact(target: &Url) -> Url {
    let mut shown = target.clone();
    shown.set_query(None);
    shown.set_fragment(None);
    let _ = shown.set_username("");
    let _ = shown.set_password(None);
    shown
}

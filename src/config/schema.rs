//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the forward proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Outbound client settings.
    pub upstream: UpstreamConfig,

    /// Where targets are read from on inbound requests.
    pub targets: TargetConfig,

    /// Permitted target prefixes. Empty means unrestricted.
    pub allow_list: Vec<String>,

    /// CORS settings.
    pub cors: CorsConfig,

    /// Security response headers.
    pub security: SecurityConfig,

    /// Static file fallback.
    pub static_files: StaticFilesConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Shutdown behaviour.
    pub lifecycle: LifecycleConfig,

    /// Keys for external services.
    pub secrets: SecretsConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Time allowed from dispatch until upstream response headers arrive.
    /// Body transfer is not bounded by this.
    pub request_timeout_ms: u64,

    /// Follow upstream redirects instead of relaying them.
    pub follow_redirects: bool,

    /// Redirect hop limit when following.
    pub max_redirects: usize,

    /// Honour HTTP_PROXY / HTTPS_PROXY from the environment.
    pub use_system_proxy: bool,

    /// User agent sent when the caller supplied none.
    pub user_agent: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5000,
            follow_redirects: true,
            max_redirects: 10,
            use_system_proxy: false,
            user_agent: None,
        }
    }
}

/// Target resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Path prefix carrying a base64 target (`/p/<base64>`).
    pub encoded_prefix: String,

    /// Query parameter carrying a base64 target (`/p?link=<base64>`).
    pub query_param: String,

    /// Path prefix whose remainder is a scheme-less host and path.
    pub rewrite_prefix: String,

    /// Scheme prepended to rewritten targets.
    pub rewrite_scheme: String,

    /// JSON field naming the target in invocation bodies.
    pub body_field: String,

    /// Maximum JSON invocation body size in bytes.
    pub json_body_limit: usize,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            encoded_prefix: "/p/".to_string(),
            query_param: "link".to_string(),
            rewrite_prefix: "/proxy/".to_string(),
            rewrite_scheme: "https".to_string(),
            body_field: "url".to_string(),
            json_body_limit: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// `*` for any origin, otherwise a comma-separated origin list.
    pub origin: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origin: "*".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Add security response headers when absent.
    pub enable_headers: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
        }
    }
}

/// Static file fallback configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Serve unrouted paths from `root`.
    pub enabled: bool,

    /// Directory served for unrouted paths.
    pub root: String,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: "static".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Expose `GET /metrics`.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long in-flight requests may drain after a shutdown signal.
    pub drain_timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 30,
        }
    }
}

/// External service credentials.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SecretsConfig {
    /// Key for the external contact service. Contact requests answer 503 without it.
    pub external_key: Option<String>,
}

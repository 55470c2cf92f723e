//! Target resolution.
//!
//! # Responsibilities
//! - Find the upstream URL an inbound request names
//! - Decode base64 and percent-encoded forms
//! - Reject anything that is not an absolute http/https URL
//!
//! # Design Decisions
//! - Strategies are tried in a fixed order and the first that applies wins;
//!   a strategy that applies but fails to decode is an error, not a fallthrough
//! - No network access; resolution is synchronous and pure

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use percent_encoding::percent_decode_str;
use serde_json::Value;
use url::{form_urlencoded, Url};

use crate::config::TargetConfig;
use crate::http::error::ProxyError;

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// What the resolver can see of an inbound request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inbound<'a> {
    /// Raw (still percent-encoded) request path.
    pub path: &'a str,
    /// Raw query string without the leading `?`.
    pub query: Option<&'a str>,
    /// Parsed JSON body, for invocation-style requests.
    pub body: Option<&'a Value>,
}

impl<'a> Inbound<'a> {
    pub fn from_uri(uri: &'a axum::http::Uri) -> Self {
        Self {
            path: uri.path(),
            query: uri.query(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: &'a Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// One way of carrying a target on an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// `<prefix><base64>`; the remainder is percent-decoded then base64-decoded.
    EncodedPath { prefix: String },
    /// `?<param>=<base64>`, consulted only for paths inside `scope`.
    EncodedQuery {
        param: String,
        scope: String,
    },
    /// `<prefix><host>/<path>`; `scheme://` is prepended, the query is kept.
    RewrittenPath {
        prefix: String,
        scheme: String,
    },
    /// JSON body field holding the target verbatim.
    JsonBody { field: String },
}

impl Strategy {
    /// `None` when this strategy does not apply to the request.
    fn extract(&self, inbound: &Inbound<'_>) -> Option<Result<String, ProxyError>> {
        match self {
            Strategy::EncodedPath { prefix } => {
                let rest = inbound.path.strip_prefix(prefix.as_str())?;
                if rest.is_empty() {
                    return None;
                }
                Some(
                    percent_decode_str(rest)
                        .decode_utf8()
                        .map_err(|_| ProxyError::InvalidTarget("path is not UTF-8".into()))
                        .and_then(|decoded| decode_base64(&decoded)),
                )
            }
            Strategy::EncodedQuery { param, scope } => {
                if !in_scope(inbound.path, scope) {
                    return None;
                }
                let query = inbound.query?;
                let (_, value) = form_urlencoded::parse(query.as_bytes())
                    .find(|(name, _)| name == param.as_str())?;
                // form decoding turned any `+` into a space
                Some(decode_base64(&value.replace(' ', "+")))
            }
            Strategy::RewrittenPath { prefix, scheme } => {
                let rest = inbound.path.strip_prefix(prefix.as_str())?;
                if rest.is_empty() {
                    return Some(Err(ProxyError::InvalidTarget("empty rewrite target".into())));
                }
                let mut target = format!("{}://{}", scheme, rest);
                if let Some(query) = inbound.query.filter(|q| !q.is_empty()) {
                    target.push('?');
                    target.push_str(query);
                }
                Some(Ok(target))
            }
            Strategy::JsonBody { field } => {
                let body = inbound.body?;
                Some(
                    body.get(field.as_str())
                        .and_then(Value::as_str)
                        .map(String::from)
                        .ok_or_else(|| {
                            ProxyError::InvalidTarget(format!("body field {:?} missing", field))
                        }),
                )
            }
        }
    }
}

/// Ordered list of strategies; immutable after construction.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    strategies: Vec<Strategy>,
}

impl TargetResolver {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    /// Path, query, rewrite, then body.
    pub fn from_config(config: &TargetConfig) -> Self {
        let scope = config.encoded_prefix.trim_end_matches('/').to_string();
        Self::new(vec![
            Strategy::EncodedPath {
                prefix: config.encoded_prefix.clone(),
            },
            Strategy::EncodedQuery {
                param: config.query_param.clone(),
                scope,
            },
            Strategy::RewrittenPath {
                prefix: config.rewrite_prefix.clone(),
                scheme: config.rewrite_scheme.clone(),
            },
            Strategy::JsonBody {
                field: config.body_field.clone(),
            },
        ])
    }

    /// Resolve the target URL or fail with `InvalidTarget`.
    pub fn resolve(&self, inbound: &Inbound<'_>) -> Result<Url, ProxyError> {
        let raw = self
            .strategies
            .iter()
            .find_map(|strategy| strategy.extract(inbound))
            .unwrap_or_else(|| Err(ProxyError::InvalidTarget("no target on request".into())))?;

        parse_target(&raw)
    }
}

/// Parse and scheme-check a raw target string.
pub fn parse_target(raw: &str) -> Result<Url, ProxyError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ProxyError::InvalidTarget("empty target".into()));
    }

    let url = Url::parse(raw).map_err(|e| ProxyError::InvalidTarget(format!("{}: {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        scheme => Err(ProxyError::InvalidTarget(format!(
            "scheme {:?} not allowed",
            scheme
        ))),
    }
}

/// Decode standard or URL-safe base64, padding optional, into UTF-8.
fn decode_base64(encoded: &str) -> Result<String, ProxyError> {
    let encoded = encoded.trim();
    let engine = if encoded.contains(['-', '_']) {
        &URL_SAFE_LENIENT
    } else {
        &STANDARD_LENIENT
    };

    let bytes = engine
        .decode(encoded)
        .map_err(|e| ProxyError::InvalidTarget(format!("bad base64: {}", e)))?;

    String::from_utf8(bytes).map_err(|_| ProxyError::InvalidTarget("target is not UTF-8".into()))
}

fn in_scope(path: &str, scope: &str) -> bool {
    path.strip_prefix(scope)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

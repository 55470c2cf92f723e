//! Configuration validation.
//!
//! Serde handles syntax; this module checks values that parse but cannot work.
//! All problems are reported together rather than stopping at the first.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, returning every error found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }

    if config.upstream.request_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "upstream.request_timeout_ms",
            "must be greater than zero",
        ));
    }

    let targets = &config.targets;
    for (field, prefix) in [
        ("targets.encoded_prefix", &targets.encoded_prefix),
        ("targets.rewrite_prefix", &targets.rewrite_prefix),
    ] {
        if prefix.len() < 3 || !prefix.starts_with('/') || !prefix.ends_with('/') {
            errors.push(ValidationError::new(
                field,
                format!("{:?} must look like \"/name/\"", prefix),
            ));
        }
    }

    if targets.encoded_prefix == targets.rewrite_prefix {
        errors.push(ValidationError::new(
            "targets.rewrite_prefix",
            "must differ from targets.encoded_prefix",
        ));
    }

    if targets.query_param.is_empty() {
        errors.push(ValidationError::new("targets.query_param", "must not be empty"));
    }

    if targets.body_field.is_empty() {
        errors.push(ValidationError::new("targets.body_field", "must not be empty"));
    }

    if !matches!(targets.rewrite_scheme.as_str(), "http" | "https") {
        errors.push(ValidationError::new(
            "targets.rewrite_scheme",
            "must be http or https",
        ));
    }

    if config.allow_list.iter().any(|entry| entry.trim().is_empty()) {
        errors.push(ValidationError::new("allow_list", "entries must not be blank"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

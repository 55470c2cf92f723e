//! Configuration loading from disk and the process environment.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value:?}")]
    Env {
        key: &'static str,
        value: String,
    },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML document into a configuration without validating it.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Load configuration: optional TOML file, then environment overrides, then validation.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let config = match path {
        Some(path) => parse_config(&fs::read_to_string(path)?)?,
        None => ProxyConfig::default(),
    };

    let config = apply_env(config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment-style settings on top of `config`.
///
/// `lookup` abstracts the environment so callers can feed a fixed map.
pub fn apply_env<F>(mut config: ProxyConfig, lookup: F) -> Result<ProxyConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(address) = lookup("BIND_ADDRESS") {
        config.listener.bind_address = address;
    }

    if let Some(port) = lookup("PORT") {
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env {
                key: "PORT",
                value: port.clone(),
            })?;
        config.listener.bind_address = with_port(&config.listener.bind_address, port);
    }

    if let Some(timeout) = lookup("REQUEST_TIMEOUT") {
        config.upstream.request_timeout_ms = timeout
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env {
                key: "REQUEST_TIMEOUT",
                value: timeout.clone(),
            })?;
    }

    if let Some(list) = lookup("WHITELIST") {
        config.allow_list = split_list(&list);
    }

    if let Some(origin) = lookup("CORS_ORIGIN") {
        config.cors.origin = origin;
    }

    if let Some(root) = lookup("STATIC_DIR") {
        config.static_files.root = root;
    }

    if let Some(level) = lookup("LOG_LEVEL") {
        config.observability.log_level = level;
    }

    if let Some(agent) = lookup("UPSTREAM_USER_AGENT") {
        config.upstream.user_agent = Some(agent);
    }

    if let Some(key) = lookup("EXTERNAL_SECRET_KEY").filter(|k| !k.trim().is_empty()) {
        config.secrets.external_key = Some(key);
    }

    Ok(config)
}

/// Split a comma-separated list, dropping blank entries.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn with_port(bind_address: &str, port: u16) -> String {
    match bind_address.parse::<SocketAddr>() {
        Ok(mut addr) => {
            addr.set_port(port);
            addr.to_string()
        }
        Err(_) => format!("0.0.0.0:{}", port),
    }
}

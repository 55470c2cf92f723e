//! Target allow-list.
//!
//! A target is permitted when the list is empty or when its string form starts
//! with one of the configured entries.
//!
//! Prefix matching is not host matching: `http://example.com` also admits
//! `http://example.com.evil.test/`. End entries with `/` to pin the host.

use url::Url;

use crate::http::error::ProxyError;

/// Read-only list of permitted target prefixes, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    prefixes: Vec<String>,
}

impl AllowList {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes: Vec<String> = prefixes.into_iter().map(Into::into).collect();
        for prefix in &prefixes {
            if !prefix.ends_with('/') {
                tracing::warn!(
                    prefix = %prefix,
                    "Allow-list entry has no trailing slash and also admits longer host names"
                );
            }
        }
        Self { prefixes }
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Pure check; the same target and list always give the same answer.
    pub fn allowed(&self, target: &str) -> bool {
        self.prefixes.is_empty() || self.prefixes.iter().any(|p| target.starts_with(p.as_str()))
    }

    /// [`allowed`](Self::allowed) as a `Forbidden` error for the forwarding path.
    pub fn check(&self, target: &Url) -> Result<(), ProxyError> {
        if self.allowed(target.as_str()) {
            Ok(())
        } else {
            Err(ProxyError::Forbidden(target.to_string()))
        }
    }
}

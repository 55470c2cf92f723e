//! Request handling and transformation.
//!
//! # Responsibilities
//! - Describe the outbound request (`ProxyRequest`)
//! - Build it from a forwarded inbound request or a JSON invocation
//! - Sanitize headers before anything is dispatched
//!
//! # Design Decisions
//! - Bodies stay lazy streams; nothing here reads them
//! - Methods without a payload never carry a body or a stale `content-length`

use axum::{
    body::Body,
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        request::Parts,
        HeaderMap, HeaderName, HeaderValue, Method,
    },
};
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::http::error::ProxyError;
use crate::security::headers::{sanitize, Direction};

/// True for methods that conventionally carry a request body.
pub fn carries_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// An outbound request, ready for the dispatcher.
#[derive(Debug)]
pub struct ProxyRequest {
    pub method: Method,
    pub target: Url,
    /// Already sanitized for the upstream leg.
    pub headers: HeaderMap,
    /// Consumed at most once, by the dispatcher.
    pub body: Option<Body>,
}

impl ProxyRequest {
    /// Build a request with sanitized headers and no body.
    pub fn new(method: Method, target: Url, headers: HeaderMap) -> Self {
        Self {
            method,
            target,
            headers: sanitize(headers, Direction::Request),
            body: None,
        }
    }

    /// Attach a body if the method carries one; otherwise drop it along with
    /// any `content-length` that described it.
    pub fn with_body(mut self, body: Body) -> Self {
        if carries_body(&self.method) {
            self.body = Some(body);
        } else {
            self.headers.remove(CONTENT_LENGTH);
        }
        self
    }

    /// Forward an inbound request to `target` as-is, streaming its body.
    pub fn from_inbound(parts: Parts, body: Body, target: Url) -> Self {
        Self::new(parts.method, target, parts.headers).with_body(body)
    }

    /// Build the request a JSON invocation describes.
    pub fn from_invocation(target: Url, invocation: Invocation) -> Result<Self, ProxyError> {
        let method = invocation.method()?;
        let mut headers = invocation.header_map()?;
        headers.remove(CONTENT_LENGTH);

        let payload = match invocation.data {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.into_bytes()),
            Some(other) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                Some(
                    serde_json::to_vec(&other)
                        .map_err(|e| ProxyError::Internal(format!("re-encoding data: {}", e)))?,
                )
            }
        };

        let request = Self::new(method, target, headers);
        match payload {
            Some(bytes) if carries_body(&request.method) => {
                let mut request = request;
                request.headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
                Ok(request.with_body(Body::from(bytes)))
            }
            Some(_) => {
                tracing::debug!(
                    method = %request.method,
                    "Dropping data for a method without a body"
                );
                Ok(request)
            }
            None => Ok(request),
        }
    }
}

/// JSON body of `POST /proxy`. The target field itself is read by the resolver.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Invocation {
    pub method: Option<String>,
    pub headers: Option<Map<String, Value>>,
    pub data: Option<Value>,
}

impl Invocation {
    /// Requested method, `GET` when absent. Case-insensitive.
    pub fn method(&self) -> Result<Method, ProxyError> {
        match self.method.as_deref() {
            None => Ok(Method::GET),
            Some(name) => Method::from_bytes(name.trim().to_ascii_uppercase().as_bytes())
                .map_err(|_| ProxyError::InvalidMethod(name.to_string())),
        }
    }

    /// Headers as a map. Scalars are stringified, arrays become repeated values.
    pub fn header_map(&self) -> Result<HeaderMap, ProxyError> {
        let mut map = HeaderMap::new();
        let Some(headers) = &self.headers else {
            return Ok(map);
        };

        for (name, value) in headers {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ProxyError::InvalidHeader(name.clone()))?;
            let values = match value {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            for value in values {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                let value = HeaderValue::from_str(&text)
                    .map_err(|_| ProxyError::InvalidHeader(name.clone()))?;
                map.append(header.clone(), value);
            }
        }

        Ok(map)
    }
}

//! Streaming HTTP forward proxy library.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::{HttpServer, ProxyError, Tunnel};
pub use lifecycle::Shutdown;

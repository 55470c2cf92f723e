//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, middleware, tunnel hand-off)
//!     → routing::resolver (target URL) → security::allow_list
//!     → request.rs (ProxyRequest, request-side header sanitizing)
//!     → upstream.rs (dispatch, header-wait timeout, cancellation)
//!     → response.rs (response-side header sanitizing, streamed body)
//!     → Send to client
//! ```
//!
//! Failures anywhere on this path are `error::ProxyError` and become a JSON
//! error response, unless the response headers were already sent.

pub mod error;
pub mod handlers;
pub mod request;
pub mod response;
pub mod server;
pub mod tunnel;
pub mod upstream;

pub use error::ProxyError;
pub use request::{Invocation, ProxyRequest};
pub use response::{ByteStream, ProxyResponse};
pub use server::{AppState, HttpServer, ServerError, X_REQUEST_ID};
pub use tunnel::Tunnel;
pub use upstream::Dispatcher;

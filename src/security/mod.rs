//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → cors.rs (preflight + origin policy)
//!     → allow_list.rs (resolved target against configured prefixes)
//!     → headers.rs (strip hop-by-hop + Host before dispatch)
//!
//! Upstream response:
//!     → headers.rs (strip hop-by-hop, add security headers if absent)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a disallowed target never reaches the network
//! - Allow-list is read-only after startup, no locking
//! - No trust in client input

pub mod allow_list;
pub mod cors;
pub mod headers;

pub use allow_list::AllowList;
pub use headers::{sanitize, Direction};

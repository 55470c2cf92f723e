//! Routing subsystem: deciding where a forwarded request goes.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path, query, JSON body)
//!     → resolver.rs (ordered strategies)
//!         1. /p/<base64>             encoded path
//!         2. /p?link=<base64>        encoded query
//!         3. /proxy/<host>/<path>    rewrite, https:// prepended
//!         4. {"url": "..."}          JSON body
//!     → Return: absolute http(s) Url or InvalidTarget
//! ```
//!
//! # Design Decisions
//! - Strategies compiled from config at startup, immutable at runtime
//! - Deterministic: same input always resolves to the same target
//! - First applicable strategy wins

pub mod resolver;

pub use resolver::{Inbound, Strategy, TargetResolver};

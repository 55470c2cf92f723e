//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger (repeats are no-ops)
//!
//! Shutdown (shutdown.rs):
//!     trigger → stop accepting → drain in-flight requests
//!     drain deadline passed → abort → cancel pending upstream work
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: forced exit after deadline

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;

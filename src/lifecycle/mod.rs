//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main):
//!     Load config → Validate → Build server → Bind listener → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then backends, then the listener
//! - Any startup error is fatal before the listener is bound
//! - Shutdown drains in-flight requests before exit

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;

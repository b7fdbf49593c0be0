//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → pool.rs (next_available: bounded round-robin scan)
//!     → skip backends reporting unhealthy
//!     → backend.rs (forward over the shared HTTP client)
//!     → response or ForwardError back to the dispatcher
//! ```
//!
//! # Design Decisions
//! - Rotation state lives in the pool; scan and cursor advance are one
//!   atomic unit
//! - Unhealthy backends are skipped, never evicted from the pool
//! - A full pass with no healthy backend is an error, not a busy loop

pub mod backend;
pub mod pool;

pub use backend::{Backend, ForwardError, HttpBackend};
pub use pool::{BackendPool, NoHealthyBackendError};

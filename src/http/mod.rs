//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, proxy handler)
//!     → request.rs (attach request ID for correlation)
//!     → [load balancer picks the backend]
//!     → backend forward (upstream call)
//!     → response relayed to client
//! ```

pub mod request;
pub mod server;

pub use request::{RequestId, RequestIdExt, RequestIdLayer, X_REQUEST_ID};
pub use server::HttpServer;

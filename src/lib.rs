//! Round-robin load-balancing reverse proxy.
//!
//! Accepts inbound HTTP requests and forwards each to one of a fixed set of
//! backend servers, selected by a round-robin policy that skips backends
//! currently reporting unhealthy.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;

pub use config::schema::DispatcherConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;

//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! dispatcher. All types derive Serde traits for deserialization from config
//! files.
//!
//! ```toml
//! [listener]
//! bind_address = "0.0.0.0:8080"
//!
//! backends = [
//!     "http://127.0.0.1:9001",
//!     "http://127.0.0.1:9002",
//!     "http://127.0.0.1:9003",
//! ]
//!
//! [timeouts]
//! request_secs = 30
//! upstream_secs = 20
//! ```

use serde::{Deserialize, Serialize};

/// Root configuration for the dispatcher.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Ordered backend base addresses. Rotation order is this order.
    pub backends: Vec<String>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Inbound request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Deadline for a single forwarded upstream call in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            upstream_secs: 20,
        }
    }
}

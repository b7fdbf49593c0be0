//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DispatcherConfig (validated, immutable)
//!     → consumed once at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload path
//! - All fields except the backend list have defaults
//! - Validation separates syntactic (serde) from semantic checks
//! - Any configuration error is fatal before a listener is bound

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::DispatcherConfig;
pub use schema::ListenerConfig;
pub use schema::TimeoutConfig;
pub use validation::ValidationError;

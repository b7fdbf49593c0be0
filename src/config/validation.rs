//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the backend list is non-empty and every address is usable
//! - Validate value ranges (timeouts > 0, bind address parses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DispatcherConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::DispatcherConfig;

/// A single semantic finding in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The backend list is empty; the pool must be non-empty for the
    /// dispatcher's lifetime.
    #[error("no backends configured")]
    NoBackends,

    /// The listener bind address did not parse as a socket address.
    #[error("invalid bind address '{address}': {reason}")]
    InvalidBindAddress { address: String, reason: String },

    /// A timeout was configured as zero seconds.
    #[error("timeout '{name}' must be greater than zero")]
    ZeroTimeout { name: &'static str },

    /// A backend address did not parse as a URL.
    #[error("invalid backend address '{address}': {reason}")]
    InvalidBackendAddress { address: String, reason: String },

    /// A backend address uses a scheme other than plain http.
    #[error("backend address '{address}' must use the http scheme")]
    UnsupportedScheme { address: String },

    /// A backend address carries a path or query; only base addresses
    /// (scheme + host + optional port) are accepted.
    #[error("backend address '{address}' must not carry a path or query")]
    NotABaseAddress { address: String },
}

/// Validate a configuration, collecting every finding.
pub fn validate_config(config: &DispatcherConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = config.listener.bind_address.parse::<SocketAddr>() {
        errors.push(ValidationError::InvalidBindAddress {
            address: config.listener.bind_address.clone(),
            reason: e.to_string(),
        });
    }

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }
    for address in &config.backends {
        if let Err(e) = parse_backend_address(address) {
            errors.push(e);
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout {
            name: "timeouts.request_secs",
        });
    }
    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::ZeroTimeout {
            name: "timeouts.upstream_secs",
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse and check a backend base address.
///
/// Accepted form is `http://host[:port]` with no path, query, or fragment.
/// This is the single place backend addresses are judged; backend
/// construction funnels through it as well.
pub(crate) fn parse_backend_address(raw: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(raw).map_err(|e| ValidationError::InvalidBackendAddress {
        address: raw.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "http" {
        return Err(ValidationError::UnsupportedScheme {
            address: raw.to_string(),
        });
    }

    // Url normalizes an absent path to "/" for http URLs.
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(ValidationError::NotABaseAddress {
            address: raw.to_string(),
        });
    }

    Ok(url)
}

//! Backend pool management.
//!
//! # Responsibilities
//! - Hold the ordered backend list (insertion order = rotation order)
//! - Produce the next healthy backend per call, rotating fairly
//! - Bound the scan to one full pass; an all-down pool is an error, not a hang

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::body::Body;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::config::schema::DispatcherConfig;
use crate::config::validation::ValidationError;
use crate::load_balancer::backend::{Backend, HttpBackend};

/// Returned when a full pass over the pool finds no healthy backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no healthy backend available")]
pub struct NoHealthyBackendError;

/// Ordered collection of backends plus the rotation cursor.
///
/// The cursor is the sole piece of process-wide mutable state; it is touched
/// by every concurrent request handler. The whole scan-and-advance sequence
/// runs under one lock so two callers can never observe the same pre-advance
/// cursor.
#[derive(Debug)]
pub struct BackendPool {
    backends: Vec<Arc<dyn Backend>>,
    /// Next rotation start position; always stored modulo `backends.len()`.
    cursor: Mutex<usize>,
}

impl BackendPool {
    /// Create a pool over an ordered backend list.
    pub fn new(backends: Vec<Arc<dyn Backend>>) -> Self {
        Self {
            backends,
            cursor: Mutex::new(0),
        }
    }

    /// Build the pool from configuration, one [`HttpBackend`] per configured
    /// address. Address findings are collected and reported together; any
    /// finding is fatal at startup.
    pub fn from_config(
        config: &DispatcherConfig,
        client: Client<HttpConnector, Body>,
    ) -> Result<Self, ConfigError> {
        let upstream_timeout = Duration::from_secs(config.timeouts.upstream_secs);
        let mut backends: Vec<Arc<dyn Backend>> = Vec::with_capacity(config.backends.len());
        let mut errors = Vec::new();

        for address in &config.backends {
            match HttpBackend::new(address, client.clone(), upstream_timeout) {
                Ok(backend) => backends.push(Arc::new(backend)),
                Err(e) => errors.push(e),
            }
        }
        if config.backends.is_empty() {
            errors.push(ValidationError::NoBackends);
        }

        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }
        Ok(Self::new(backends))
    }

    /// Number of backends in the pool.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether the pool holds no backends at all.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Select the next healthy backend, advancing the rotation.
    ///
    /// Scans at most one full pass in insertion order starting at the
    /// cursor. On success the cursor moves one past the selection so the
    /// next call resumes the rotation there; a pass that finds nothing
    /// healthy fails instead of looping.
    pub fn next_available(&self) -> Result<Arc<dyn Backend>, NoHealthyBackendError> {
        let len = self.backends.len();
        if len == 0 {
            return Err(NoHealthyBackendError);
        }

        // The critical section is pure arithmetic and never awaits; a
        // poisoned lock cannot leave a usize inconsistent, so recover it.
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);

        for offset in 0..len {
            let index = (*cursor + offset) % len;
            if self.backends[index].is_healthy() {
                *cursor = (index + 1) % len;
                return Ok(Arc::clone(&self.backends[index]));
            }
        }

        // Failure paths still move the rotation so the cursor cannot pin.
        *cursor = (*cursor + 1) % len;
        Err(NoHealthyBackendError)
    }
}

//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream server as a capability set:
//!   address, health, forwarding
//! - Proxy an inbound request to the upstream, streaming the response
//! - Validate backend addresses at construction (fail fast)
//!
//! # Design Decisions
//! - `Backend` is a trait, not a struct: the selector and dispatcher only
//!   see `dyn Backend`, so a health-probing implementation can slot in later
//! - `HttpBackend` reports constant health; no probing is implemented
//! - URI rewrite swaps scheme and authority, path and query pass through

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::uri::{Authority, Scheme};
use axum::http::{header, HeaderValue, Request, Response, Uri, Version};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use thiserror::Error;
use tokio::time;
use url::Url;

use crate::config::validation::{parse_backend_address, ValidationError};

/// Errors that can occur forwarding a request to an upstream.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The upstream call failed (connect error, reset, protocol error).
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    /// The upstream did not answer within the forwarding deadline.
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    /// The rewritten target URI was rejected.
    #[error("invalid forward target: {0}")]
    Target(#[from] axum::http::uri::InvalidUriParts),
}

/// One upstream server the dispatcher can forward requests to.
///
/// The pool holds backends as trait objects; an implementation with a real
/// health-check policy can replace [`HttpBackend`] without touching the
/// selector or the dispatcher.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// The backend's upstream base address.
    fn address(&self) -> &Url;

    /// Whether the backend is currently eligible for selection.
    ///
    /// Implementations with dynamic health must make this safe to call from
    /// concurrent request handlers (atomic reads or equivalent).
    fn is_healthy(&self) -> bool;

    /// Proxy `request` to this backend and stream the response back.
    ///
    /// Method, headers, and body are preserved. The request URI's scheme and
    /// authority and the Host header are rewritten to this backend's
    /// address; everything else passes through verbatim.
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, ForwardError>;
}

/// A backend reached over plain HTTP.
pub struct HttpBackend {
    /// Parsed base address, e.g. `http://127.0.0.1:9001`.
    address: Url,
    /// Authority used to rewrite the target URI.
    authority: Authority,
    /// Pre-built Host header value for the rewrite.
    host_header: HeaderValue,
    /// Shared HTTP client.
    client: Client<HttpConnector, Body>,
    /// Deadline for a single upstream call.
    upstream_timeout: Duration,
}

impl HttpBackend {
    /// Create a backend from a configured base address.
    ///
    /// The address must be `http://host[:port]` with no path or query;
    /// anything else is a configuration error surfaced before startup
    /// completes.
    pub fn new(
        raw: &str,
        client: Client<HttpConnector, Body>,
        upstream_timeout: Duration,
    ) -> Result<Self, ValidationError> {
        let address = parse_backend_address(raw)?;

        let invalid = |reason: String| ValidationError::InvalidBackendAddress {
            address: raw.to_string(),
            reason,
        };

        let uri = Uri::try_from(address.as_str()).map_err(|e| invalid(e.to_string()))?;
        let authority = uri
            .into_parts()
            .authority
            .ok_or_else(|| invalid("missing authority".to_string()))?;
        let host_header =
            HeaderValue::from_str(authority.as_str()).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            address,
            authority,
            host_header,
            client,
            upstream_timeout,
        })
    }
}

impl fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackend")
            .field("address", &self.address.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn address(&self) -> &Url {
        &self.address
    }

    /// Always eligible: no health probing is wired up for this backend type.
    fn is_healthy(&self) -> bool {
        true
    }

    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, ForwardError> {
        let (mut parts, body) = request.into_parts();

        // Retarget the URI at this backend; path and query carry over.
        let mut target = parts.uri.clone().into_parts();
        target.scheme = Some(Scheme::HTTP);
        target.authority = Some(self.authority.clone());
        parts.uri = Uri::from_parts(target)?;

        // The upstream is spoken to in HTTP/1.1 regardless of the inbound
        // version; copying an inbound h2 version here would make the client
        // attempt prior-knowledge HTTP/2 against a plain upstream.
        parts.version = Version::HTTP_11;
        parts.headers.insert(header::HOST, self.host_header.clone());

        let outbound = Request::from_parts(parts, body);

        match time::timeout(self.upstream_timeout, self.client.request(outbound)).await {
            Ok(Ok(response)) => Ok(response.map(Body::new)),
            Ok(Err(e)) => Err(ForwardError::Upstream(e)),
            Err(_) => Err(ForwardError::Timeout(self.upstream_timeout)),
        }
    }
}

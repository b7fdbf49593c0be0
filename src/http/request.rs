//! Request identification.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for requests arriving without one
//! - Propagate a caller-supplied `x-request-id` untouched
//! - Expose the ID to handlers for log correlation
//!
//! # Design Decisions
//! - Request ID added as early as possible, before the handler runs
//! - The ID travels on the request itself (header + extension), so the
//!   forwarded upstream call carries it too
//! - The layer only touches the request; the inner service future is
//!   returned as-is

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::{HeaderName, HeaderValue, Request};
use tower::{Layer, Service};
use uuid::Uuid;

/// Header carrying the request's correlation ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Correlation ID attached to every request passing through the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(Arc<str>);

impl RequestId {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string().into())
    }

    /// The ID as it appears in the `x-request-id` header.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extension trait for reading the request ID back out of a request.
pub trait RequestIdExt {
    /// The ID attached by [`RequestIdLayer`], if the layer ran.
    fn request_id(&self) -> Option<&RequestId>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&RequestId> {
        self.extensions().get::<RequestId>()
    }
}

/// Layer applying [`RequestIdService`] to the stack.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

/// Ensures every request carries an `x-request-id` header and a matching
/// [`RequestId`] extension. An unreadable (non-UTF-8) inbound value is
/// replaced with a generated one.
#[derive(Clone, Debug)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for RequestIdService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), S::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let existing = request
            .headers()
            .get(&X_REQUEST_ID)
            .and_then(|value| value.to_str().ok())
            .map(RequestId::from);

        let id = match existing {
            Some(id) => id,
            None => {
                let generated = RequestId::generate();
                // A hyphenated UUID is plain ASCII, always a valid value.
                if let Ok(value) = HeaderValue::from_str(generated.as_str()) {
                    request.headers_mut().insert(X_REQUEST_ID, value);
                }
                generated
            }
        };
        request.extensions_mut().insert(id);

        self.inner.call(request)
    }
}

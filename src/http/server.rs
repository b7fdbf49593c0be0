//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (timeout, request ID, tracing)
//! - Select the next healthy backend per request and forward to it
//! - Map selection and forwarding failures to gateway-style responses
//! - Serve until shutdown is triggered, then drain gracefully
//!
//! # Design Decisions
//! - One dispatch attempt per inbound request; failures surface to the
//!   caller instead of retrying against another backend
//! - All persistent state lives in the pool; the dispatcher is stateless
//!   between requests
//! - Backend construction happens in `new`, before any listener exists

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::loader::ConfigError;
use crate::config::schema::DispatcherConfig;
use crate::http::request::{RequestIdExt, RequestIdLayer};
use crate::load_balancer::backend::{Backend, ForwardError};
use crate::load_balancer::pool::{BackendPool, NoHealthyBackendError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<BackendPool>,
}

/// HTTP server for the dispatcher.
#[derive(Debug)]
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server from a validated configuration.
    ///
    /// Builds the shared upstream client and the backend pool; a malformed
    /// backend address fails here, before any socket is bound.
    pub fn new(config: &DispatcherConfig) -> Result<Self, ConfigError> {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let pool = Arc::new(BackendPool::from_config(config, client)?);

        let router = Self::build_router(config, AppState { pool });
        Ok(Self { router })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &DispatcherConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(RequestIdLayer)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Selects the next healthy backend and forwards the request to it.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = request
        .request_id()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unknown".into());
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let backend = match state.pool.next_available() {
        Ok(backend) => backend,
        Err(NoHealthyBackendError) => {
            tracing::warn!(
                request_id = %request_id,
                method = %method,
                path = %path,
                "No healthy backends"
            );
            return (StatusCode::SERVICE_UNAVAILABLE, "No healthy backends").into_response();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        backend = %backend.address(),
        "Proxying request"
    );

    // Single dispatch attempt: a failure maps to a gateway error, never to
    // a retry against a different backend.
    match backend.forward(request).await {
        Ok(response) => response.into_response(),
        Err(error @ ForwardError::Timeout(_)) => {
            tracing::error!(
                request_id = %request_id,
                backend = %backend.address(),
                error = %error,
                "Upstream timed out"
            );
            (StatusCode::GATEWAY_TIMEOUT, "Upstream request timed out").into_response()
        }
        Err(error) => {
            tracing::error!(
                request_id = %request_id,
                backend = %backend.address(),
                error = %error,
                "Upstream error"
            );
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use axum::http::{Method, Uri};
    use tower::ServiceExt;
    use url::Url;

    use crate::config::validation::ValidationError;
    use crate::http::request::X_REQUEST_ID;

    /// Backend double with scripted forward behavior.
    #[derive(Debug)]
    struct StubBackend {
        address: Url,
        healthy: AtomicBool,
        behavior: Behavior,
    }

    #[derive(Clone, Copy, Debug)]
    enum Behavior {
        /// Answer 201 echoing method, selected headers, and body.
        Echo,
        /// Fail the forward with a non-timeout error.
        Fail,
        /// Fail the forward with a timeout.
        Expire,
    }

    impl StubBackend {
        fn with_behavior(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                address: Url::parse("http://127.0.0.1:9000").unwrap(),
                healthy: AtomicBool::new(true),
                behavior,
            })
        }
    }

    #[async_trait::async_trait]
    impl Backend for StubBackend {
        fn address(&self) -> &Url {
            &self.address
        }

        fn is_healthy(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }

        async fn forward(&self, request: Request<Body>) -> Result<Response, ForwardError> {
            match self.behavior {
                Behavior::Echo => {
                    let (parts, body) = request.into_parts();
                    let bytes = axum::body::to_bytes(body, 1024 * 1024).await.unwrap();
                    let mut builder = Response::builder()
                        .status(StatusCode::CREATED)
                        .header("echo-method", parts.method.as_str());
                    if let Some(id) = parts.headers.get(X_REQUEST_ID) {
                        builder = builder.header(X_REQUEST_ID, id.clone());
                    }
                    if let Some(tag) = parts.headers.get("x-echo-tag") {
                        builder = builder.header("x-echo-tag", tag.clone());
                    }
                    Ok(builder.body(Body::from(bytes)).unwrap())
                }
                Behavior::Fail => Err(ForwardError::Target(invalid_uri_parts())),
                Behavior::Expire => Err(ForwardError::Timeout(Duration::from_millis(10))),
            }
        }
    }

    fn invalid_uri_parts() -> axum::http::uri::InvalidUriParts {
        // A scheme without an authority cannot form a URI.
        let mut parts = Uri::from_static("http://127.0.0.1:9000/").into_parts();
        parts.authority = None;
        Uri::from_parts(parts).unwrap_err()
    }

    fn router_over(backends: Vec<Arc<dyn Backend>>) -> Router {
        let pool = Arc::new(BackendPool::new(backends));
        HttpServer::build_router(&DispatcherConfig::default(), AppState { pool })
    }

    fn get_root() -> Request<Body> {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[test]
    fn new_rejects_invalid_backend_addresses() {
        let mut config = DispatcherConfig::default();
        config.backends.push("https://127.0.0.1:9001".into());

        let err = HttpServer::new(&config).unwrap_err();
        match err {
            ConfigError::Validation(errors) => {
                assert!(matches!(errors[0], ValidationError::UnsupportedScheme { .. }));
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[tokio::test]
    async fn all_unhealthy_yields_service_unavailable() {
        let stub = StubBackend::with_behavior(Behavior::Echo);
        stub.healthy.store(false, Ordering::SeqCst);
        let router = router_over(vec![stub as Arc<dyn Backend>]);

        let response = router.oneshot(get_root()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn forward_failure_yields_bad_gateway() {
        let router = router_over(vec![
            StubBackend::with_behavior(Behavior::Fail) as Arc<dyn Backend>
        ]);

        let response = router.oneshot(get_root()).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn forward_timeout_yields_gateway_timeout() {
        let router = router_over(vec![
            StubBackend::with_behavior(Behavior::Expire) as Arc<dyn Backend>
        ]);

        let response = router.oneshot(get_root()).await.unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn success_relays_status_headers_and_body() {
        let router = router_over(vec![
            StubBackend::with_behavior(Behavior::Echo) as Arc<dyn Backend>
        ]);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/items")
            .header("x-echo-tag", "relay")
            .body(Body::from("hello upstream"))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["echo-method"], "POST");
        assert_eq!(response.headers()["x-echo-tag"], "relay");
        // The dispatcher attached a request ID before forwarding.
        assert!(response.headers().contains_key(X_REQUEST_ID));

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(body, "hello upstream");
    }

    #[tokio::test]
    async fn requests_rotate_across_backends() {
        let router = router_over(vec![
            StubBackend::with_behavior(Behavior::Echo) as Arc<dyn Backend>,
            StubBackend::with_behavior(Behavior::Expire) as Arc<dyn Backend>,
        ]);

        // Alternating outcomes show the rotation advancing per request.
        for expected in [
            StatusCode::CREATED,
            StatusCode::GATEWAY_TIMEOUT,
            StatusCode::CREATED,
            StatusCode::GATEWAY_TIMEOUT,
        ] {
            let response = router.clone().oneshot(get_root()).await.unwrap();
            assert_eq!(response.status(), expected);
        }
    }
}

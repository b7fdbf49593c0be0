//! Shared utilities for the integration tests.

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;

use dispatch_proxy::config::DispatcherConfig;
use dispatch_proxy::lifecycle::Shutdown;
use dispatch_proxy::HttpServer;

/// Start a mock backend answering every path with a fixed body.
///
/// Binds an ephemeral port and returns the address the backend serves on.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    let app = Router::new()
        .route("/", any(move || async move { body }))
        .route("/{*path}", any(move || async move { body }));
    serve_app(app).await
}

/// Start a mock backend echoing what it received: the body verbatim, the
/// method and URI in `echo-*` response headers, and every `x-*` request
/// header reflected back.
pub async fn start_echo_backend() -> SocketAddr {
    let app = Router::new()
        .route("/", any(echo))
        .route("/{*path}", any(echo));
    serve_app(app).await
}

async fn echo(request: Request<Body>) -> Response<Body> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, 1024 * 1024).await.unwrap_or_default();

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header("echo-method", parts.method.as_str())
        .header("echo-uri", parts.uri.to_string());
    for (name, value) in &parts.headers {
        if name.as_str().starts_with("x-") {
            builder = builder.header(name.clone(), value.clone());
        }
    }
    builder.body(Body::from(bytes)).unwrap()
}

async fn serve_app(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Build a dispatcher over the given backends and serve it on an ephemeral
/// port. The server stops when `shutdown` is triggered.
pub async fn start_dispatcher(backends: &[SocketAddr], shutdown: &Shutdown) -> SocketAddr {
    let mut config = DispatcherConfig::default();
    for backend in backends {
        config.backends.push(format!("http://{backend}"));
    }
    config.timeouts.upstream_secs = 2;

    let server = HttpServer::new(&config).expect("dispatcher config rejected");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    addr
}

/// HTTP client tuned for test stability (no pooling, no environment proxy).
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, limits, timeout, metrics)
//! - Bind server to listener
//! - Stop accepting on shutdown and drain in-flight requests

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::config::{ConsoleConfig, SecurityConfig};
use crate::http::request::make_request_span;
use crate::lifecycle::{AdminWatchdog, Shutdown};
use crate::observability::metrics;
use crate::store::UserRepository;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: UserRepository,
    pub watchdog: Arc<AdminWatchdog>,
    pub security: SecurityConfig,
    pub api_key: Arc<str>,
    /// Serializes administrator creation so only one request can win.
    pub admin_init_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(users: UserRepository, watchdog: Arc<AdminWatchdog>, config: &ConsoleConfig) -> Self {
        Self {
            users,
            watchdog,
            security: config.security.clone(),
            api_key: Arc::from(config.admin.api_key.as_str()),
            admin_init_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// HTTP server for the admin console.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &ConsoleConfig, state: AppState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ConsoleConfig, state: AppState) -> Router {
        setup_admin_router(state)
            .layer(middleware::from_fn(track_metrics))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<axum::body::Body>))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server until `shutdown` is triggered.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Record count and latency of every request.
async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    let response = next.run(request).await;

    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

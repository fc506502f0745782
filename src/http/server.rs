//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the shared application state from configuration
//! - Create the Axum router with every handler
//! - Wrap routes in the security pipeline, then timeout, request ID,
//!   tracing, and panic layers
//! - Serve until the shutdown signal fires

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::GatekeeperConfig;
use crate::error::GateError;
use crate::http::handlers;
use crate::lifecycle::startup::StartupError;
use crate::pipeline::{security_middleware, SecurityPipeline};
use crate::security::{CsrfGuard, EgressValidator, MemoryRateLimitStore, RateLimitStore, TokenAuthenticator};

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub authenticator: TokenAuthenticator,
    pub csrf: CsrfGuard,
    pub egress: Arc<EgressValidator>,
    pub config: Arc<GatekeeperConfig>,
}

impl AppState {
    pub fn new(config: Arc<GatekeeperConfig>) -> Result<Self, StartupError> {
        let authenticator = TokenAuthenticator::new(&config.auth).map_err(StartupError::Auth)?;
        let egress = Arc::new(EgressValidator::new(&config.egress)?);

        Ok(Self {
            authenticator,
            csrf: CsrfGuard::new(),
            egress,
            config,
        })
    }
}

/// HTTP server fronted by the security pipeline.
pub struct GatekeeperServer {
    router: Router,
    config: Arc<GatekeeperConfig>,
}

impl GatekeeperServer {
    /// Server with an in-process rate-limit store.
    pub fn new(config: GatekeeperConfig) -> Result<Self, StartupError> {
        Self::with_store(config, Arc::new(MemoryRateLimitStore::new()))
    }

    pub fn with_store(config: GatekeeperConfig, store: Arc<dyn RateLimitStore>) -> Result<Self, StartupError> {
        let pipeline = Arc::new(SecurityPipeline::from_config(&config, store));
        Self::with_pipeline(config, pipeline)
    }

    pub fn with_pipeline(config: GatekeeperConfig, pipeline: Arc<SecurityPipeline>) -> Result<Self, StartupError> {
        let config = Arc::new(config);
        let state = AppState::new(config.clone())?;

        tracing::debug!(stages = ?pipeline.stage_names(), "Security pipeline assembled");

        let router = Self::build_router(&config, state, pipeline);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatekeeperConfig, state: AppState, pipeline: Arc<SecurityPipeline>) -> Router {
        let mut routes = Router::new()
            .route("/health", get(handlers::health))
            .route("/api/csrf-token", get(handlers::csrf_token))
            .route("/api/me", get(handlers::me))
            .route("/api/echo", post(handlers::echo))
            .route("/api/egress/check", post(handlers::egress_check));

        if config.auth.issue_endpoint_enabled {
            tracing::warn!("Token issue endpoint enabled; it does not check credentials");
            routes = routes.route("/api/auth/token", post(handlers::issue_token));
        }

        routes
            .with_state(state)
            .layer(middleware::from_fn_with_state(pipeline, security_middleware))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(CatchPanicLayer::custom(panic_response))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs))),
            )
    }

    /// Router for in-process use (tests, embedding).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Stopping HTTP server");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &GatekeeperConfig {
        &self.config
    }
}

fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    GateError::internal("request handler panicked").into_response()
}

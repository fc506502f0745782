//! Startup orchestration.
//!
//! # Responsibilities
//! - Install the metrics exporter when enabled
//! - Build the server (authenticator, egress policy, pipeline)
//! - Bind the listener last, so traffic arrives only when ready
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Configuration is validated before this point and never mutated after

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::config::{ConfigError, GatekeeperConfig};
use crate::error::GateError;
use crate::http::GatekeeperServer;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Fatal startup failure.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("authenticator: {0}")]
    Auth(GateError),

    #[error("egress policy pattern: {0}")]
    Egress(#[from] regex::Error),

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start every subsystem and serve until `shutdown` is triggered.
pub async fn run(config: GatekeeperConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr);
    }

    let bind_address = config.listener.bind_address.clone();
    let server = GatekeeperServer::new(config)?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    server.run(listener, shutdown.subscribe()).await?;
    Ok(())
}

use std::path::PathBuf;

use clap::Parser;

use request_gatekeeper::config;
use request_gatekeeper::lifecycle::{self, Shutdown};
use request_gatekeeper::observability::logging;

#[derive(Parser)]
#[command(name = "request-gatekeeper")]
#[command(about = "Security gatekeeper in front of application handlers", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging("info")?;
            tracing::error!(error = %e, "Configuration rejected");
            return Err(e.into());
        }
    };

    logging::init_logging(&config.observability.log_level)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "request-gatekeeper starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        rate_limit_enabled = config.rate_limit.enabled,
        max_requests_per_window = config.rate_limit.max_requests_per_window,
        allowed_domains = config.egress.allowed_domains.len(),
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    lifecycle::spawn_signal_listener(&shutdown);

    lifecycle::startup::run(config, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

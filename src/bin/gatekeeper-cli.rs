use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use request_gatekeeper::config::{self, GatekeeperConfig};
use request_gatekeeper::security::{CsrfGuard, EgressValidator, TokenAuthenticator};

#[derive(Parser)]
#[command(name = "gatekeeper-cli")]
#[command(about = "Operator tooling for request-gatekeeper", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign a bearer token for a subject
    IssueToken {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        email: String,
    },
    /// Print a fresh CSRF token pair as JSON
    CsrfPair,
    /// Check a URL against the egress policy
    CheckUrl {
        url: String,
        /// Apply the upload-host rule as well
        #[arg(long)]
        upload: bool,
    },
    /// Load and validate the configuration, then print it
    ValidateConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::CsrfPair => {
            let pair = CsrfGuard::new().issue();
            println!("{}", serde_json::to_string_pretty(&pair)?);
        }
        Commands::IssueToken { subject, email } => {
            let config = load(cli.config)?;
            let authenticator = TokenAuthenticator::new(&config.auth)?;
            println!("{}", authenticator.issue(&subject, &email)?);
        }
        Commands::CheckUrl { url, upload } => {
            let config = load(cli.config)?;
            let validator = EgressValidator::new(&config.egress)?;
            let result = if upload {
                validator.validate_upload(&url)
            } else {
                validator.validate(&url)
            };
            match result {
                Ok(normalized) => println!("allowed: {}", normalized),
                Err(e) => return Err(format!("blocked: {}", e).into()),
            }
        }
        Commands::ValidateConfig => {
            let config = load(cli.config)?;
            println!("Configuration is valid");
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn load(path: Option<PathBuf>) -> Result<GatekeeperConfig, config::ConfigError> {
    config::load(path.as_deref())
}

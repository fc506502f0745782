//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GatekeeperConfig;
use crate::config::validation::{validate_config, ConfigIssue};

/// Environment variable that overrides `auth.secret`.
pub const SECRET_ENV_VAR: &str = "GATEKEEPER_JWT_SECRET";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_issues(.0))]
    Validation(Vec<ConfigIssue>),
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// The signing secret may be supplied through [`SECRET_ENV_VAR`] instead of
/// the file. This is the only place the environment is consulted.
pub fn load_config(path: &Path) -> Result<GatekeeperConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let secret_override = std::env::var(SECRET_ENV_VAR).ok();
    parse_config(&content, secret_override)
}

/// Load from `path` when given, otherwise start from defaults.
///
/// Both paths apply the secret overlay and validation.
pub fn load(path: Option<&Path>) -> Result<GatekeeperConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => parse_config("", std::env::var(SECRET_ENV_VAR).ok()),
    }
}

/// Parse, overlay, and validate configuration text.
pub fn parse_config(
    content: &str,
    secret_override: Option<String>,
) -> Result<GatekeeperConfig, ConfigError> {
    let mut config: GatekeeperConfig = toml::from_str(content)?;

    if let Some(secret) = secret_override.filter(|s| !s.is_empty()) {
        config.auth.secret = secret;
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

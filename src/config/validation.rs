//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (quota > 0, timeouts > 0)
//! - Check allowlist entries are bare hostnames
//! - Check every blocked-host pattern compiles
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatekeeperConfig → Result<(), Vec<ConfigIssue>>
//! - Runs before config is accepted into the system

use regex::Regex;

use crate::config::schema::GatekeeperConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ConfigIssue {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every issue.
pub fn validate_config(config: &GatekeeperConfig) -> Result<(), Vec<ConfigIssue>> {
    let mut issues = Vec::new();

    if config.auth.secret.is_empty() {
        issues.push(ConfigIssue::new("auth.secret", "must be set"));
    }
    if config.auth.max_token_length == 0 {
        issues.push(ConfigIssue::new("auth.max_token_length", "must be greater than 0"));
    }
    if config.auth.token_ttl_secs == 0 {
        issues.push(ConfigIssue::new("auth.token_ttl_secs", "must be greater than 0"));
    }

    if config.rate_limit.max_requests_per_window == 0 {
        issues.push(ConfigIssue::new(
            "rate_limit.max_requests_per_window",
            "must be greater than 0",
        ));
    }
    if config.rate_limit.window_secs == 0 {
        issues.push(ConfigIssue::new("rate_limit.window_secs", "must be greater than 0"));
    }

    if config.listener.max_body_bytes == 0 {
        issues.push(ConfigIssue::new("listener.max_body_bytes", "must be greater than 0"));
    }
    if config.listener.request_timeout_secs == 0 {
        issues.push(ConfigIssue::new("listener.request_timeout_secs", "must be greater than 0"));
    }

    if config.egress.timeout_secs == 0 {
        issues.push(ConfigIssue::new("egress.timeout_secs", "must be greater than 0"));
    }
    for (i, domain) in config.egress.allowed_domains.iter().enumerate() {
        if !is_bare_host(domain) {
            issues.push(ConfigIssue::new(
                format!("egress.allowed_domains[{}]", i),
                format!("'{}' is not a bare lowercase hostname", domain),
            ));
        }
    }
    for (i, domain) in config.egress.upload_domains.iter().enumerate() {
        if !is_bare_host(domain) {
            issues.push(ConfigIssue::new(
                format!("egress.upload_domains[{}]", i),
                format!("'{}' is not a bare lowercase hostname", domain),
            ));
        }
    }
    for (i, pattern) in config.egress.blocked_host_patterns.iter().enumerate() {
        if let Err(e) = Regex::new(pattern) {
            issues.push(ConfigIssue::new(
                format!("egress.blocked_host_patterns[{}]", i),
                e.to_string(),
            ));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn is_bare_host(domain: &str) -> bool {
    !domain.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
}

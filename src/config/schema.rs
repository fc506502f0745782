//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gatekeeper.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gatekeeper.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatekeeperConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Bearer token verification.
    pub auth: AuthConfig,

    /// Sliding-window rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Header shape validation.
    pub headers: HeaderPolicyConfig,

    /// Outbound call policy.
    pub egress: EgressConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request body accepted by the pipeline, in bytes.
    pub max_body_bytes: usize,

    /// Total request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

/// Token authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret used to sign and verify bearer tokens.
    #[serde(skip_serializing)]
    pub secret: String,

    /// Lifetime of tokens issued by this service, in seconds.
    pub token_ttl_secs: u64,

    /// Clock skew tolerated when checking expiry, in seconds.
    pub leeway_secs: u64,

    /// Tokens longer than this are rejected before signature checking.
    pub max_token_length: usize,

    /// Mount `POST /api/auth/token`. It signs tokens without checking
    /// credentials, so it is off unless a deployment asks for it.
    pub issue_endpoint_enabled: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            // Must be set by the operator (file or GATEKEEPER_JWT_SECRET).
            secret: String::new(),
            token_ttl_secs: 7 * 24 * 60 * 60,
            leeway_secs: 0,
            max_token_length: 500,
            issue_endpoint_enabled: false,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Requests allowed per identifier inside one window.
    pub max_requests_per_window: usize,

    /// Length of the trailing window in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests_per_window: 60,
            window_secs: 60,
        }
    }
}

/// Header validation policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderPolicyConfig {
    /// Case-insensitive substrings that mark a user agent as automated.
    pub blocked_user_agents: Vec<String>,
}

impl Default for HeaderPolicyConfig {
    fn default() -> Self {
        Self {
            blocked_user_agents: ["bot", "crawler", "spider", "scraper"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Outbound (egress) call policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EgressConfig {
    /// Hosts this service may call, including their subdomains.
    pub allowed_domains: Vec<String>,

    /// Subset of hosts accepted for file upload URLs.
    pub upload_domains: Vec<String>,

    /// Regexes matched against the URL host to block reserved networks.
    pub blocked_host_patterns: Vec<String>,

    /// Timeout for outbound calls in seconds.
    pub timeout_secs: u64,

    /// Fixed `User-Agent` sent on outbound calls.
    pub user_agent: String,

    /// Maximum redirects followed (each hop is re-validated).
    pub max_redirects: usize,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            allowed_domains: [
                "api.openai.com",
                "generativelanguage.googleapis.com",
                "cloudinary.com",
                "res.cloudinary.com",
                "api.cloudinary.com",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            upload_domains: ["cloudinary.com", "res.cloudinary.com", "api.cloudinary.com"]
                .into_iter()
                .map(String::from)
                .collect(),
            blocked_host_patterns: [
                r"^127\.",
                r"^10\.",
                r"^172\.(1[6-9]|2[0-9]|3[0-1])\.",
                r"^192\.168\.",
                r"^169\.254\.",
                r"^::1$",
                r"^fc00:",
                r"^fe80:",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            timeout_secs: 30,
            user_agent: format!("request-gatekeeper/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

//! Request header inspection.
//!
//! # Responsibilities
//! - Derive the rate-limit identifier from forwarded-IP headers
//! - Reject automated-looking user agents
//! - Require a JSON content type on body-bearing methods
//!
//! # Design Decisions
//! - Identifier is the first hop of `X-Forwarded-For`, then `X-Real-IP`,
//!   then the shared `unknown` bucket
//! - User agent matching is a case-insensitive substring test

use axum::http::{header, HeaderMap, Method};

use crate::config::HeaderPolicyConfig;
use crate::error::ValidationError;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Bucket shared by every client that sends no forwarding headers.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Identify the client for rate limiting.
pub fn client_identifier(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').map(str::trim).find(|hop| !hop.is_empty()));

    let real_ip = || {
        headers
            .get(X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

/// Methods that carry a JSON body through the pipeline.
pub fn is_body_bearing(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Header shape checks.
#[derive(Debug, Clone)]
pub struct HeaderValidator {
    blocked_agents: Vec<String>,
}

impl HeaderValidator {
    pub fn new(config: &HeaderPolicyConfig) -> Self {
        Self {
            blocked_agents: config
                .blocked_user_agents
                .iter()
                .map(|a| a.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn validate(&self, method: &Method, headers: &HeaderMap) -> Result<(), ValidationError> {
        if let Some(agent) = headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()) {
            let agent = agent.to_ascii_lowercase();
            if self.blocked_agents.iter().any(|blocked| agent.contains(blocked.as_str())) {
                return Err(ValidationError::AutomatedClient);
            }
        }

        if is_body_bearing(method) {
            let is_json = headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
                .unwrap_or(false);
            if !is_json {
                return Err(ValidationError::InvalidContentType);
            }
        }

        Ok(())
    }
}

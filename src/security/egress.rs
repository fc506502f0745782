//! Outbound (egress) call policy.
//!
//! # Decision procedure
//! ```text
//! parse absolute URL        → MalformedUrl
//! scheme == https           → SchemeNotAllowed
//! host vs blocked patterns  → PrivateNetworkBlocked
//! host in allowlist (or sub) → DomainNotAllowed
//! no userinfo               → CredentialsInUrl
//! ```
//!
//! # Known limitation
//! The private-network test matches the host *text* only. A public name
//! that resolves to a private address (DNS rebinding) is not caught.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use url::{Host, Url};

use crate::config::EgressConfig;
use crate::error::EgressPolicyError;
use crate::observability::metrics;

/// Decides whether this process may call a URL.
#[derive(Debug, Clone)]
pub struct EgressValidator {
    allowed_domains: Vec<String>,
    upload_domains: Vec<String>,
    blocked_hosts: Vec<Regex>,
}

impl EgressValidator {
    pub fn new(config: &EgressConfig) -> Result<Self, regex::Error> {
        let blocked_hosts = config
            .blocked_host_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            allowed_domains: lowercase_all(&config.allowed_domains),
            upload_domains: lowercase_all(&config.upload_domains),
            blocked_hosts,
        })
    }

    /// Validate `raw` and return the normalized URL.
    pub fn validate(&self, raw: &str) -> Result<Url, EgressPolicyError> {
        let result = self.evaluate(raw);
        match &result {
            Ok(url) => {
                tracing::debug!(url = %url, "Egress allowed");
                metrics::record_egress_decision("allowed");
            }
            Err(e) => {
                tracing::warn!(reason = %e, "Egress denied");
                metrics::record_egress_decision("denied");
            }
        }
        result
    }

    /// Validate a file upload URL: the general policy plus the upload allowlist.
    pub fn validate_upload(&self, raw: &str) -> Result<Url, EgressPolicyError> {
        let url = self.validate(raw)?;
        let host = host_text(&url).ok_or(EgressPolicyError::MalformedUrl)?;
        if !matches_domain(&host, &self.upload_domains) {
            return Err(EgressPolicyError::UploadDomainNotAllowed { host });
        }
        Ok(url)
    }

    fn evaluate(&self, raw: &str) -> Result<Url, EgressPolicyError> {
        let url = Url::parse(raw.trim()).map_err(|_| EgressPolicyError::MalformedUrl)?;

        if url.scheme() != "https" {
            return Err(EgressPolicyError::SchemeNotAllowed {
                scheme: url.scheme().to_string(),
            });
        }

        let host = host_text(&url).ok_or(EgressPolicyError::MalformedUrl)?;

        if self.blocked_hosts.iter().any(|p| p.is_match(&host)) {
            return Err(EgressPolicyError::PrivateNetworkBlocked { host });
        }

        if !matches_domain(&host, &self.allowed_domains) {
            return Err(EgressPolicyError::DomainNotAllowed { host });
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(EgressPolicyError::CredentialsInUrl);
        }

        Ok(url)
    }
}

/// Host as plain text: lowercase domain, dotted IPv4, or unbracketed IPv6.
fn host_text(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Domain(domain) => Some(domain.to_ascii_lowercase()),
        Host::Ipv4(addr) => Some(addr.to_string()),
        Host::Ipv6(addr) => Some(addr.to_string()),
    }
}

fn matches_domain(host: &str, domains: &[String]) -> bool {
    domains.iter().any(|domain| {
        host == domain
            || host
                .strip_suffix(domain.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

fn lowercase_all(domains: &[String]) -> Vec<String> {
    domains.iter().map(|d| d.to_ascii_lowercase()).collect()
}

/// Failure of an outbound call made through [`SafeFetcher`].
#[derive(Debug, thiserror::Error)]
pub enum EgressError {
    #[error("URL validation failed: {0}")]
    Policy(#[from] EgressPolicyError),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Outbound request failed: {0}")]
    Network(String),
}

/// HTTP client that only talks to destinations the validator accepts.
///
/// Every redirect hop is validated again. Calls are bounded by the configured
/// timeout and are never retried here.
#[derive(Debug, Clone)]
pub struct SafeFetcher {
    client: reqwest::Client,
    validator: Arc<EgressValidator>,
    timeout: Duration,
}

impl SafeFetcher {
    pub fn new(config: &EgressConfig, validator: Arc<EgressValidator>) -> Result<Self, EgressError> {
        let client = Self::client_builder(config, validator.clone())
            .build()
            .map_err(|e| EgressError::Network(e.to_string()))?;
        Ok(Self::with_client(client, validator, Duration::from_secs(config.timeout_secs)))
    }

    /// Client builder carrying the timeout, user agent, and redirect policy.
    pub fn client_builder(config: &EgressConfig, validator: Arc<EgressValidator>) -> reqwest::ClientBuilder {
        let max_redirects = config.max_redirects;
        let redirect = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() > max_redirects {
                return attempt.error("too many redirects");
            }
            match validator.evaluate(attempt.url().as_str()) {
                Ok(_) => attempt.follow(),
                Err(e) => attempt.error(e),
            }
        });

        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .redirect(redirect)
    }

    pub fn with_client(client: reqwest::Client, validator: Arc<EgressValidator>, timeout: Duration) -> Self {
        Self {
            client,
            validator,
            timeout,
        }
    }

    pub async fn get(&self, url: &str) -> Result<reqwest::Response, EgressError> {
        self.send(reqwest::Method::GET, url, None).await
    }

    /// Validate `url`, then send the request with an optional JSON body.
    pub async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, EgressError> {
        let url = self.validator.validate(url)?;

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        request.send().await.map_err(|e| self.classify(e))
    }

    fn classify(&self, error: reqwest::Error) -> EgressError {
        if error.is_timeout() {
            tracing::warn!(timeout = ?self.timeout, "Outbound request timed out");
            return EgressError::Timeout(self.timeout);
        }

        let mut source = std::error::Error::source(&error);
        while let Some(inner) = source {
            if let Some(policy) = inner.downcast_ref::<EgressPolicyError>() {
                return EgressError::Policy(policy.clone());
            }
            source = inner.source();
        }

        EgressError::Network(error.to_string())
    }
}

//! Named check stages.
//!
//! Every stage has the same contract: look at the request head, pass or fail.
//! The pipeline runs them in the order they were added.

use axum::http::{HeaderMap, Method};

use crate::error::GateResult;
use crate::security::{CsrfGuard, HeaderValidator, SlidingWindowLimiter};

/// Method, headers, and the identifier derived from them.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub headers: HeaderMap,
    /// Rate-limit identifier (forwarded IP or `unknown`).
    pub client_id: String,
}

/// One step of the pipeline.
pub trait SecurityCheck: Send + Sync {
    /// Stable name used in logs and metrics.
    fn name(&self) -> &'static str;

    fn check(&self, head: &RequestHead) -> GateResult<()>;
}

/// Counts the request against the client's sliding window.
#[derive(Debug, Clone)]
pub struct RateLimitStage {
    limiter: SlidingWindowLimiter,
}

impl RateLimitStage {
    pub fn new(limiter: SlidingWindowLimiter) -> Self {
        Self { limiter }
    }
}

impl SecurityCheck for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn check(&self, head: &RequestHead) -> GateResult<()> {
        self.limiter.check(&head.client_id)
    }
}

/// Rejects automated user agents and non-JSON bodies.
#[derive(Debug, Clone)]
pub struct HeaderStage {
    validator: HeaderValidator,
}

impl HeaderStage {
    pub fn new(validator: HeaderValidator) -> Self {
        Self { validator }
    }
}

impl SecurityCheck for HeaderStage {
    fn name(&self) -> &'static str {
        "headers"
    }

    fn check(&self, head: &RequestHead) -> GateResult<()> {
        Ok(self.validator.validate(&head.method, &head.headers)?)
    }
}

/// Double-submit verification; read-only methods pass.
#[derive(Debug, Clone, Default)]
pub struct CsrfStage {
    guard: CsrfGuard,
}

impl CsrfStage {
    pub fn new(guard: CsrfGuard) -> Self {
        Self { guard }
    }
}

impl SecurityCheck for CsrfStage {
    fn name(&self) -> &'static str {
        "csrf"
    }

    fn check(&self, head: &RequestHead) -> GateResult<()> {
        Ok(self.guard.verify_request(&head.method, &head.headers)?)
    }
}

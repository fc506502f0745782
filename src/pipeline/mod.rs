//! Security pipeline.
//!
//! # Data Flow
//! ```text
//! InboundRequest (method, headers, body)
//!     → identify client (forwarded-IP headers)
//!     → stage fold: rate_limit → headers → csrf   (first failure wins)
//!     → parse JSON body
//!     → sanitize body
//!     → GuardedRequest handed to the downstream handler
//! ```
//!
//! # Design Decisions
//! - Stages are an explicit ordered list, not nested wrappers
//! - Any failure short-circuits; later stages never run
//! - A panicking stage becomes a 500, never an unwound request task
//! - State (rate-limit store) is injected at construction

pub mod middleware;
pub mod stages;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use serde_json::Value;

use crate::config::GatekeeperConfig;
use crate::error::{GateError, GateResult, ValidationError};
use crate::observability::metrics;
use crate::security::{
    client_identifier, sanitize_value, CsrfGuard, HeaderValidator, RateLimitStore,
    SlidingWindowLimiter,
};

pub use middleware::{read_body, security_middleware, ClientId, SanitizedBody};
pub use stages::{CsrfStage, HeaderStage, RateLimitStage, RequestHead, SecurityCheck};

/// Request as received from the transport.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(method: Method, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            method,
            headers,
            body: body.into(),
        }
    }
}

/// Request that passed every check, with its body sanitized.
#[derive(Debug, Clone)]
pub struct GuardedRequest {
    head: RequestHead,
    body: Option<Value>,
}

impl GuardedRequest {
    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn client_id(&self) -> &str {
        &self.head.client_id
    }

    /// Sanitized body, `None` when the request had no body.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn into_body(self) -> Option<Value> {
        self.body
    }
}

/// Ordered security checks wrapped around a downstream handler.
pub struct SecurityPipeline {
    stages: Vec<Box<dyn SecurityCheck>>,
    max_body_bytes: usize,
}

impl std::fmt::Debug for SecurityPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityPipeline")
            .field("stages", &self.stage_names())
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl SecurityPipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Standard stage order built from configuration.
    pub fn from_config(config: &GatekeeperConfig, store: Arc<dyn RateLimitStore>) -> Self {
        Self::with_limiter(config, SlidingWindowLimiter::new(&config.rate_limit, store))
    }

    /// Standard stage order with a caller-built limiter (custom clock or store).
    pub fn with_limiter(config: &GatekeeperConfig, limiter: SlidingWindowLimiter) -> Self {
        let mut builder = Self::builder().max_body_bytes(config.listener.max_body_bytes);
        if config.rate_limit.enabled {
            builder = builder.stage(RateLimitStage::new(limiter));
        }
        builder
            .stage(HeaderStage::new(HeaderValidator::new(&config.headers)))
            .stage(CsrfStage::new(CsrfGuard::new()))
            .build()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Identify the client and run every stage in order.
    pub fn admit(&self, method: Method, headers: HeaderMap) -> GateResult<RequestHead> {
        let client_id = client_identifier(&headers);
        let head = RequestHead {
            method,
            headers,
            client_id,
        };

        for stage in &self.stages {
            if let Err(e) = run_stage(stage.as_ref(), &head) {
                self.reject(stage.name(), &head.client_id, &e);
                return Err(e);
            }
        }

        Ok(head)
    }

    /// Parse and sanitize the body of an admitted request.
    pub fn prepare(&self, head: RequestHead, body: &[u8]) -> GateResult<GuardedRequest> {
        if body.len() > self.max_body_bytes {
            let e = GateError::from(ValidationError::BodyTooLarge {
                limit: self.max_body_bytes,
            });
            self.reject("body", &head.client_id, &e);
            return Err(e);
        }

        let body = if body.is_empty() {
            None
        } else {
            match serde_json::from_slice::<Value>(body) {
                Ok(parsed) => Some(sanitize_value(parsed)),
                Err(_) => {
                    let e = GateError::from(ValidationError::InvalidJson);
                    self.reject("body", &head.client_id, &e);
                    return Err(e);
                }
            }
        };

        metrics::record_request("passed");
        Ok(GuardedRequest { head, body })
    }

    /// Run every check and sanitize the body.
    pub fn evaluate(&self, request: InboundRequest) -> GateResult<GuardedRequest> {
        let head = self.admit(request.method, request.headers)?;
        self.prepare(head, &request.body)
    }

    /// Evaluate `request` and hand it to `handler`, or answer with the failure.
    pub async fn run<F, Fut>(&self, request: InboundRequest, handler: F) -> Response
    where
        F: FnOnce(GuardedRequest) -> Fut,
        Fut: Future<Output = Response>,
    {
        let guarded = match self.evaluate(request) {
            Ok(guarded) => guarded,
            Err(e) => return e.into_response(),
        };

        match AssertUnwindSafe(async move { handler(guarded).await })
            .catch_unwind()
            .await
        {
            Ok(response) => response,
            Err(_) => GateError::internal("downstream handler panicked").into_response(),
        }
    }

    pub(crate) fn reject(&self, stage: &'static str, client_id: &str, error: &GateError) {
        tracing::warn!(stage, client = %client_id, status = error.status().as_u16(), reason = %error, "Request rejected");
        metrics::record_rejection(stage);
        metrics::record_request("rejected");
    }
}

fn run_stage(stage: &dyn SecurityCheck, head: &RequestHead) -> GateResult<()> {
    std::panic::catch_unwind(AssertUnwindSafe(|| stage.check(head)))
        .unwrap_or_else(|_| Err(GateError::internal(format!("stage '{}' panicked", stage.name()))))
}

/// Builder for a custom stage list.
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Box<dyn SecurityCheck>>,
    max_body_bytes: Option<usize>,
}

impl PipelineBuilder {
    /// Append a stage; stages run in insertion order.
    pub fn stage(mut self, stage: impl SecurityCheck + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = Some(limit);
        self
    }

    pub fn build(self) -> SecurityPipeline {
        SecurityPipeline {
            stages: self.stages,
            max_body_bytes: self
                .max_body_bytes
                .unwrap_or_else(|| crate::config::ListenerConfig::default().max_body_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CsrfError, RateLimitError};
    use crate::security::clock::MockClock;
    use crate::security::MemoryRateLimitStore;
    use axum::http::{header, HeaderValue, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn config(max: usize) -> GatekeeperConfig {
        let mut config = GatekeeperConfig::default();
        config.auth.secret = "pipeline-test-secret-32-bytes-long!".into();
        config.rate_limit.max_requests_per_window = max;
        config
    }

    fn pipeline(max: usize) -> (SecurityPipeline, Arc<MemoryRateLimitStore>) {
        let store = Arc::new(MemoryRateLimitStore::new());
        (SecurityPipeline::from_config(&config(max), store.clone()), store)
    }

    fn post_headers(csrf: &str, session: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        headers.insert("x-csrf-token", HeaderValue::from_str(csrf).unwrap());
        headers.insert("x-session-token", HeaderValue::from_str(session).unwrap());
        headers
    }

    #[test]
    fn test_standard_stage_order() {
        let (pipeline, _) = pipeline(60);
        assert_eq!(pipeline.stage_names(), vec!["rate_limit", "headers", "csrf"]);

        let mut cfg = config(60);
        cfg.rate_limit.enabled = false;
        let pipeline = SecurityPipeline::from_config(&cfg, Arc::new(MemoryRateLimitStore::new()));
        assert_eq!(pipeline.stage_names(), vec!["headers", "csrf"]);
    }

    #[test]
    fn test_valid_post_is_sanitized() {
        let (pipeline, store) = pipeline(60);
        let token = CsrfGuard::new().issue().csrf_token;
        let request = InboundRequest::new(
            Method::POST,
            post_headers(&token, &token),
            r#"{"name": "<b>Bob</b>", "tags": ["a & b"]}"#,
        );

        let guarded = pipeline.evaluate(request).unwrap();
        assert_eq!(guarded.client_id(), "203.0.113.9");
        assert_eq!(guarded.body(), Some(&serde_json::json!({"name": "Bob", "tags": ["a &amp; b"]})));
        assert_eq!(store.recorded("203.0.113.9"), 1);
    }

    #[test]
    fn test_get_without_body_or_csrf() {
        let (pipeline, _) = pipeline(60);
        let guarded = pipeline
            .evaluate(InboundRequest::new(Method::GET, HeaderMap::new(), Bytes::new()))
            .unwrap();
        assert_eq!(guarded.client_id(), "unknown");
        assert!(guarded.body().is_none());
    }

    #[test]
    fn test_rate_limit_runs_before_csrf() {
        let (pipeline, store) = pipeline(1);
        let bad = || InboundRequest::new(Method::POST, post_headers("aa", "bb"), "{}");

        // First attempt is counted, then fails CSRF.
        assert_eq!(
            pipeline.evaluate(bad()).unwrap_err(),
            GateError::Csrf(CsrfError::TokenMismatch)
        );
        assert_eq!(store.recorded("203.0.113.9"), 1);

        // Second attempt never reaches CSRF.
        assert_eq!(
            pipeline.evaluate(bad()).unwrap_err(),
            GateError::RateLimit(RateLimitError::RateExceeded { retry_after_secs: 60 })
        );
    }

    #[test]
    fn test_header_failure_skips_csrf() {
        let (pipeline, _) = pipeline(60);
        let mut headers = post_headers("aa", "bb");
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let err = pipeline
            .evaluate(InboundRequest::new(Method::POST, headers, "{}"))
            .unwrap_err();
        assert_eq!(err, GateError::Validation(ValidationError::InvalidContentType));
    }

    #[test]
    fn test_invalid_json_rejected() {
        let (pipeline, _) = pipeline(60);
        let token = CsrfGuard::new().issue().csrf_token;
        let err = pipeline
            .evaluate(InboundRequest::new(Method::POST, post_headers(&token, &token), "{not json"))
            .unwrap_err();
        assert_eq!(err, GateError::Validation(ValidationError::InvalidJson));
    }

    #[test]
    fn test_body_limit() {
        let mut cfg = config(60);
        cfg.listener.max_body_bytes = 16;
        let pipeline = SecurityPipeline::from_config(&cfg, Arc::new(MemoryRateLimitStore::new()));
        let token = CsrfGuard::new().issue().csrf_token;

        let err = pipeline
            .evaluate(InboundRequest::new(
                Method::POST,
                post_headers(&token, &token),
                r#"{"name": "far too long for the limit"}"#,
            ))
            .unwrap_err();
        assert_eq!(err, GateError::Validation(ValidationError::BodyTooLarge { limit: 16 }));
    }

    #[test]
    fn test_quota_resets_after_window() {
        let cfg = config(2);
        let clock = MockClock::new(Instant::now());
        let limiter = SlidingWindowLimiter::with_clock(
            &cfg.rate_limit,
            Arc::new(MemoryRateLimitStore::new()),
            Arc::new(clock.clone()),
        );
        let pipeline = SecurityPipeline::with_limiter(&cfg, limiter);
        let get = || InboundRequest::new(Method::GET, HeaderMap::new(), Bytes::new());

        assert!(pipeline.evaluate(get()).is_ok());
        assert!(pipeline.evaluate(get()).is_ok());
        assert!(pipeline.evaluate(get()).is_err());

        clock.advance(Duration::from_secs(60));
        assert!(pipeline.evaluate(get()).is_ok());
    }

    struct PanickingStage;

    impl SecurityCheck for PanickingStage {
        fn name(&self) -> &'static str {
            "panics"
        }

        fn check(&self, _head: &RequestHead) -> GateResult<()> {
            panic!("stage bug")
        }
    }

    struct CountingStage(Arc<AtomicUsize>);

    impl SecurityCheck for CountingStage {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn check(&self, _head: &RequestHead) -> GateResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_panicking_stage_is_500_and_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = SecurityPipeline::builder()
            .stage(PanickingStage)
            .stage(CountingStage(calls.clone()))
            .build();

        let response = pipeline
            .run(
                InboundRequest::new(Method::GET, HeaderMap::new(), Bytes::new()),
                |_| async { StatusCode::OK.into_response() },
            )
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_500() {
        let pipeline = SecurityPipeline::builder().build();
        let response = pipeline
            .run(
                InboundRequest::new(Method::GET, HeaderMap::new(), Bytes::new()),
                |_| async {
                    if true {
                        panic!("handler bug");
                    }
                    StatusCode::OK.into_response()
                },
            )
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_rejection_never_reaches_handler() {
        let (pipeline, _) = pipeline(60);
        let reached = Arc::new(AtomicUsize::new(0));
        let seen = reached.clone();

        let response = pipeline
            .run(
                InboundRequest::new(Method::DELETE, HeaderMap::new(), Bytes::new()),
                move |_| async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    StatusCode::OK.into_response()
                },
            )
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }
}

//! Shared builders for integration tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response};
use axum::Router;
use serde_json::Value;

use request_gatekeeper::config::GatekeeperConfig;
use request_gatekeeper::security::{CsrfTokenPair, TokenAuthenticator};
use request_gatekeeper::GatekeeperServer;

pub const SECRET: &str = "integration-test-secret-at-least-32-bytes";

/// Defaults plus a signing secret.
pub fn test_config() -> GatekeeperConfig {
    let mut config = GatekeeperConfig::default();
    config.auth.secret = SECRET.to_string();
    config
}

pub fn app(config: GatekeeperConfig) -> Router {
    GatekeeperServer::new(config).unwrap().router()
}

pub fn token_for(subject: &str) -> String {
    TokenAuthenticator::new(&test_config().auth)
        .unwrap()
        .issue(subject, &format!("{}@example.com", subject))
        .unwrap()
}

pub fn csrf_pair() -> CsrfTokenPair {
    request_gatekeeper::security::CsrfGuard::new().issue()
}

/// Request builder with the headers a well-behaved browser client sends.
pub struct TestRequest {
    builder: axum::http::request::Builder,
    body: Body,
}

impl TestRequest {
    pub fn get(uri: &str) -> Self {
        Self {
            builder: Request::get(uri).header(header::USER_AGENT, "Mozilla/5.0 (X11; Linux x86_64)"),
            body: Body::empty(),
        }
    }

    pub fn post(uri: &str, body: &Value) -> Self {
        Self {
            builder: Request::post(uri)
                .header(header::USER_AGENT, "Mozilla/5.0 (X11; Linux x86_64)")
                .header(header::CONTENT_TYPE, "application/json"),
            body: Body::from(body.to_string()),
        }
    }

    /// Set a header, replacing any earlier value.
    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        if let Some(headers) = self.builder.headers_mut() {
            headers.insert(name, HeaderValue::from_str(value).unwrap());
        }
        self
    }

    pub fn raw_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", &format!("Bearer {}", token))
    }

    pub fn csrf(self, pair: &CsrfTokenPair) -> Self {
        self.header("x-csrf-token", &pair.csrf_token)
            .header("x-session-token", &pair.session_token)
    }

    pub fn from_ip(self, ip: &str) -> Self {
        self.header("x-forwarded-for", ip)
    }

    pub fn build(self) -> Request<Body> {
        self.builder.body(self.body).unwrap()
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

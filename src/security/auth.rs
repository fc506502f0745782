//! Bearer token authentication.
//!
//! Tokens are HS256 JWTs signed with the configured secret. Verification
//! returns the decoded claims map untouched; callers pick the identity field
//! they need.

use std::sync::Arc;

use axum::http::{header, HeaderMap, Method};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::AuthConfig;
use crate::error::{AuthError, GateError, GateResult};
use crate::security::csrf::CsrfGuard;
use crate::security::sanitize::validate_input;

const BEARER_PREFIX: &str = "Bearer ";

/// Claims written into tokens issued by this service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user) identifier.
    pub sub: String,
    pub email: String,
    /// Issued at (seconds since epoch).
    pub iat: u64,
    /// Expires at (seconds since epoch).
    pub exp: u64,
}

impl TokenClaims {
    pub fn new(subject_id: impl Into<String>, email: impl Into<String>, ttl_secs: u64) -> Self {
        let now = jsonwebtoken::get_current_timestamp();
        Self {
            sub: subject_id.into(),
            email: email.into(),
            iat: now,
            exp: now.saturating_add(ttl_secs),
        }
    }
}

/// Verified caller. Wraps the claims exactly as they were decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Identity {
    claims: Map<String, Value>,
}

impl Identity {
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    pub fn into_claims(self) -> Map<String, Value> {
        self.claims
    }

    /// `sub`, or the legacy `id` claim.
    pub fn subject_id(&self) -> Option<&str> {
        self.claims
            .get("sub")
            .or_else(|| self.claims.get("id"))
            .and_then(Value::as_str)
    }

    pub fn email(&self) -> Option<&str> {
        self.claims.get("email").and_then(Value::as_str)
    }

    pub fn issued_at(&self) -> Option<u64> {
        self.claims.get("iat").and_then(Value::as_u64)
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.claims.get("exp").and_then(Value::as_u64)
    }
}

/// Issues and verifies bearer tokens.
#[derive(Clone)]
pub struct TokenAuthenticator {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    validation: Arc<Validation>,
    max_token_length: usize,
    token_ttl_secs: u64,
}

impl std::fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthenticator")
            .field("max_token_length", &self.max_token_length)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenAuthenticator {
    pub fn new(config: &AuthConfig) -> GateResult<Self> {
        if config.secret.is_empty() {
            return Err(GateError::internal("token signing secret is not configured"));
        }
        if config.secret.len() < 32 {
            tracing::warn!("Token signing secret is shorter than recommended (32 bytes)");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_secs;
        validation.validate_aud = false;

        Ok(Self {
            encoding_key: Arc::new(EncodingKey::from_secret(config.secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(config.secret.as_bytes())),
            validation: Arc::new(validation),
            max_token_length: config.max_token_length,
            token_ttl_secs: config.token_ttl_secs,
        })
    }

    /// Sign a token for a subject with the configured lifetime.
    pub fn issue(&self, subject_id: &str, email: &str) -> GateResult<String> {
        self.issue_claims(&TokenClaims::new(subject_id, email, self.token_ttl_secs))
    }

    pub fn issue_claims(&self, claims: &TokenClaims) -> GateResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| GateError::internal(format!("failed to sign token: {}", e)))
    }

    /// Authenticate from the `Authorization` header alone.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix(BEARER_PREFIX))
            .ok_or(AuthError::MissingOrMalformed)?;

        self.verify(token)
    }

    /// Authenticate a request, checking CSRF first on state-changing methods.
    ///
    /// When the CSRF check fails its error is returned and the token is
    /// never looked at.
    pub fn authenticate_request(
        &self,
        csrf: &CsrfGuard,
        method: &Method,
        headers: &HeaderMap,
    ) -> GateResult<Identity> {
        csrf.verify_request(method, headers)?;
        Ok(self.authenticate(headers)?)
    }

    /// Verify a raw token string.
    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        if !validate_input(token, self.max_token_length) {
            return Err(AuthError::InvalidFormat);
        }

        decode::<Map<String, Value>>(token, &self.decoding_key, &self.validation)
            .map(|data| Identity { claims: data.claims })
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                AuthError::InvalidOrExpired
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "unit-test-secret-with-at-least-32-bytes";

    fn authenticator(secret: &str) -> TokenAuthenticator {
        TokenAuthenticator::new(&AuthConfig {
            secret: secret.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_round_trip_claims() {
        let auth = authenticator(SECRET);
        let token = auth.issue("user-42", "ann@example.com").unwrap();

        let identity = auth.authenticate(&bearer(&token)).unwrap();
        assert_eq!(identity.subject_id(), Some("user-42"));
        assert_eq!(identity.email(), Some("ann@example.com"));
        assert!(identity.expires_at().unwrap() > identity.issued_at().unwrap());
    }

    #[test]
    fn test_missing_or_malformed_header() {
        let auth = authenticator(SECRET);
        assert_eq!(auth.authenticate(&HeaderMap::new()), Err(AuthError::MissingOrMalformed));

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwdw=="));
        assert_eq!(auth.authenticate(&basic), Err(AuthError::MissingOrMalformed));
    }

    #[test]
    fn test_empty_token_rejected() {
        let auth = authenticator(SECRET);
        assert_eq!(auth.authenticate(&bearer("")), Err(AuthError::InvalidFormat));
    }

    #[test]
    fn test_script_token_rejected_before_signature() {
        let auth = authenticator(SECRET);
        assert_eq!(auth.verify("abc<script>alert(1)"), Err(AuthError::InvalidFormat));
        assert_eq!(auth.verify(&"a".repeat(501)), Err(AuthError::InvalidFormat));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = authenticator("another-secret-that-is-also-32-bytes!!");
        let token = issuer.issue("user-1", "a@example.com").unwrap();
        assert_eq!(authenticator(SECRET).verify(&token), Err(AuthError::InvalidOrExpired));
    }

    #[test]
    fn test_expired_token_rejected() {
        let auth = authenticator(SECRET);
        let now = jsonwebtoken::get_current_timestamp();
        let claims = TokenClaims {
            sub: "user-1".into(),
            email: "a@example.com".into(),
            iat: now - 3600,
            exp: now - 10,
        };
        let token = auth.issue_claims(&claims).unwrap();
        assert_eq!(auth.verify(&token), Err(AuthError::InvalidOrExpired));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let auth = authenticator(SECRET);
        assert_eq!(auth.verify("not.a.jwt"), Err(AuthError::InvalidOrExpired));
    }

    #[test]
    fn test_csrf_checked_before_token() {
        let auth = authenticator(SECRET);
        let csrf = CsrfGuard::new();
        // No bearer header either: the CSRF failure must win.
        let err = auth
            .authenticate_request(&csrf, &Method::POST, &HeaderMap::new())
            .unwrap_err();
        assert_eq!(err, GateError::Csrf(crate::error::CsrfError::TokenMissing));

        let token = auth.issue("user-1", "a@example.com").unwrap();
        let identity = auth
            .authenticate_request(&csrf, &Method::GET, &bearer(&token))
            .unwrap();
        assert_eq!(identity.subject_id(), Some("user-1"));
    }

    #[test]
    fn test_empty_secret_refused() {
        assert!(TokenAuthenticator::new(&AuthConfig::default()).is_err());
    }
}

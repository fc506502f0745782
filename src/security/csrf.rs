//! Double-submit CSRF protection.
//!
//! The client receives a pair of random tokens and echoes both in custom
//! headers on every state-changing request. The server keeps no session
//! storage: verification only requires the two headers to be byte-identical.
//!
//! # States (client side, see [`CsrfSession`])
//! ```text
//! PENDING --tokens()/regenerate()--> ISSUED
//! ISSUED  --clear()----------------> PENDING
//! ```

use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::error::CsrfError;

/// Header carrying the CSRF token.
pub const CSRF_TOKEN_HEADER: &str = "x-csrf-token";
/// Header carrying the session token.
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";
/// Response header set on CSRF rejections.
pub const CSRF_ERROR_HEADER: &str = "x-csrf-error";

/// Random bytes per token (hex-encoded to twice this length).
pub const TOKEN_BYTES: usize = 32;

/// Returns true for methods CSRF protection applies to.
pub fn is_state_changing(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// A freshly issued token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenPair {
    pub csrf_token: String,
    pub session_token: String,
}

/// Stateless verifier and issuer of double-submit tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsrfGuard;

impl CsrfGuard {
    pub fn new() -> Self {
        Self
    }

    /// Generate a token pair from the OS random source.
    ///
    /// Verification requires the two values to be byte-equal, so both fields
    /// carry the same secret; the client stores and echoes each one.
    pub fn issue(&self) -> CsrfTokenPair {
        let token = random_token();
        CsrfTokenPair {
            csrf_token: token.clone(),
            session_token: token,
        }
    }

    /// Verify the header pair for a request with the given method.
    ///
    /// Read-only methods pass unconditionally.
    pub fn verify_request(&self, method: &Method, headers: &HeaderMap) -> Result<(), CsrfError> {
        if !is_state_changing(method) {
            return Ok(());
        }

        let csrf = headers.get(CSRF_TOKEN_HEADER).map(HeaderValue::as_bytes);
        let session = headers.get(SESSION_TOKEN_HEADER).map(HeaderValue::as_bytes);
        self.verify(csrf, session)
    }

    /// Compare two tokens in constant time.
    ///
    /// Both must be present and non-empty. The running time does not depend
    /// on the position of the first differing byte.
    pub fn verify(&self, csrf_token: Option<&[u8]>, session_token: Option<&[u8]>) -> Result<(), CsrfError> {
        let (csrf, session) = match (csrf_token, session_token) {
            (Some(c), Some(s)) if !c.is_empty() && !s.is_empty() => (c, s),
            _ => return Err(CsrfError::TokenMissing),
        };

        if bool::from(csrf.ct_eq(session)) {
            Ok(())
        } else {
            Err(CsrfError::TokenMismatch)
        }
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Client-side holder of a token pair for the life of a session.
///
/// `None` is the PENDING state, `Some` is ISSUED.
#[derive(Debug, Clone, Default)]
pub struct CsrfSession {
    pair: Option<CsrfTokenPair>,
}

impl CsrfSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume a session from a previously stored pair.
    pub fn restore(pair: CsrfTokenPair) -> Self {
        Self { pair: Some(pair) }
    }

    pub fn is_issued(&self) -> bool {
        self.pair.is_some()
    }

    /// Current pair, issuing one first if none exists.
    pub fn tokens(&mut self, guard: &CsrfGuard) -> &CsrfTokenPair {
        self.pair.get_or_insert_with(|| guard.issue())
    }

    /// Replace the current pair with a fresh one.
    pub fn regenerate(&mut self, guard: &CsrfGuard) -> &CsrfTokenPair {
        self.pair.insert(guard.issue())
    }

    /// Forget the pair (logout).
    pub fn clear(&mut self) {
        self.pair = None;
    }

    /// Add both token headers when `method` is state-changing.
    pub fn apply(&mut self, guard: &CsrfGuard, method: &Method, headers: &mut HeaderMap) {
        if !is_state_changing(method) {
            return;
        }
        let pair = self.tokens(guard);
        // Hex strings are always valid header values.
        if let (Ok(csrf), Ok(session)) = (
            HeaderValue::from_str(&pair.csrf_token),
            HeaderValue::from_str(&pair.session_token),
        ) {
            headers.insert(CSRF_TOKEN_HEADER, csrf);
            headers.insert(SESSION_TOKEN_HEADER, session);
        }
    }

    /// True when a response says the pair was rejected and should be regenerated.
    pub fn should_regenerate(status: StatusCode, headers: &HeaderMap) -> bool {
        status == StatusCode::FORBIDDEN && headers.contains_key(CSRF_ERROR_HEADER)
    }
}

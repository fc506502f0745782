//! Route handlers.
//!
//! Every handler runs after the security middleware, so bodies are already
//! parsed and sanitized and arrive through the [`SanitizedBody`] extension.

use std::sync::LazyLock;

use axum::extract::State;
use axum::http::{HeaderMap, Method};
use axum::{Extension, Json};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{GateResult, ValidationError};
use crate::http::server::AppState;
use crate::pipeline::SanitizedBody;
use crate::security::{validate_input, CsrfTokenPair, Identity};

/// Also refuses `&`: the body arrives entity-escaped, so an `&` means the
/// address held a character the sanitizer rewrote.
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@&]+@[^\s@&]+\.[^\s@&]+$").expect("email pattern is valid")
});

const MAX_SUBJECT_LENGTH: usize = 128;

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Issue a fresh double-submit pair.
pub async fn csrf_token(State(state): State<AppState>) -> Json<CsrfTokenPair> {
    Json(state.csrf.issue())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest {
    subject_id: String,
    email: String,
}

/// Sign a token for `{subjectId, email}`. Mounted only when enabled.
pub async fn issue_token(
    State(state): State<AppState>,
    Extension(body): Extension<SanitizedBody>,
) -> GateResult<Json<Value>> {
    let request: TokenRequest = body.parse()?;

    if !validate_input(&request.subject_id, MAX_SUBJECT_LENGTH) {
        return Err(invalid("subjectId"));
    }
    if !EMAIL_PATTERN.is_match(&request.email) {
        return Err(invalid("email"));
    }

    let token = state.authenticator.issue(&request.subject_id, &request.email)?;
    tracing::info!(subject = %request.subject_id, "Token issued");

    Ok(Json(json!({
        "token": token,
        "expiresIn": state.config.auth.token_ttl_secs,
    })))
}

/// Claims of the authenticated caller.
pub async fn me(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
) -> GateResult<Json<Identity>> {
    let identity = state.authenticator.authenticate_request(&state.csrf, &method, &headers)?;
    Ok(Json(identity))
}

pub async fn echo(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    Extension(body): Extension<SanitizedBody>,
) -> GateResult<Json<Value>> {
    let identity = state.authenticator.authenticate_request(&state.csrf, &method, &headers)?;

    Ok(Json(json!({
        "subjectId": identity.subject_id(),
        "body": body.0,
    })))
}

#[derive(Debug, Deserialize)]
struct EgressCheckRequest {
    url: String,
    #[serde(default)]
    upload: bool,
}

/// Run the egress policy on `{url, upload?}` without making the call.
pub async fn egress_check(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    Extension(body): Extension<SanitizedBody>,
) -> GateResult<Json<Value>> {
    state.authenticator.authenticate_request(&state.csrf, &method, &headers)?;
    let request: EgressCheckRequest = body.parse()?;

    let url = if request.upload {
        state.egress.validate_upload(&request.url)?
    } else {
        state.egress.validate(&request.url)?
    };

    Ok(Json(json!({
        "allowed": true,
        "url": url.as_str(),
    })))
}

fn invalid(field: &str) -> crate::error::GateError {
    ValidationError::InvalidField {
        field: field.to_string(),
    }
    .into()
}

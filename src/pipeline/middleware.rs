//! Axum adapter for [`SecurityPipeline`].
//!
//! Head checks run before the body is read, so a throttled or forged request
//! is rejected without buffering its payload. The sanitized body replaces the
//! original one for the downstream handler.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::SecurityPipeline;
use crate::error::{GateError, GateResult, ValidationError};

/// Identifier the request was rate-limited under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

/// Body after parsing and sanitization, `None` for bodiless requests.
#[derive(Debug, Clone, Default)]
pub struct SanitizedBody(pub Option<Value>);

impl SanitizedBody {
    /// Deserialize the sanitized body into a handler's request type.
    pub fn parse<T: DeserializeOwned>(&self) -> GateResult<T> {
        let value = self.0.clone().ok_or(ValidationError::InvalidJson)?;
        serde_json::from_value(value).map_err(|_| ValidationError::InvalidJson.into())
    }
}

pub async fn security_middleware(
    State(pipeline): State<Arc<SecurityPipeline>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let head = match pipeline.admit(parts.method.clone(), parts.headers.clone()) {
        Ok(head) => head,
        Err(e) => return e.into_response(),
    };

    let bytes = match read_body(body, pipeline.max_body_bytes()).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let e = GateError::from(e);
            pipeline.reject("body", &head.client_id, &e);
            return e.into_response();
        }
    };

    let guarded = match pipeline.prepare(head, &bytes) {
        Ok(guarded) => guarded,
        Err(e) => return e.into_response(),
    };

    parts.extensions.insert(ClientId(guarded.client_id().to_string()));
    let sanitized = guarded.into_body();

    let body = match &sanitized {
        Some(value) => match serde_json::to_vec(value) {
            Ok(encoded) => Body::from(encoded),
            Err(e) => return GateError::internal(format!("failed to re-encode body: {}", e)).into_response(),
        },
        None => Body::empty(),
    };
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.extensions.insert(SanitizedBody(sanitized));

    next.run(Request::from_parts(parts, body)).await
}

/// Buffer `body`, stopping as soon as it exceeds `limit` bytes.
///
/// A transport failure is reported as unreadable, not as oversized.
pub async fn read_body(body: Body, limit: usize) -> Result<Bytes, ValidationError> {
    let mut stream = body.into_data_stream();
    let mut buffered = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            tracing::debug!(error = %e, "Request body read failed");
            ValidationError::UnreadableBody
        })?;
        if buffered.len() + chunk.len() > limit {
            return Err(ValidationError::BodyTooLarge { limit });
        }
        buffered.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(buffered))
}

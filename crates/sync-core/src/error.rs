use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tracing::error;

/// The error hierarchy shared by the Router and the Replicator (§7).
///
/// Every variant maps deterministically to an HTTP status via
/// [`SyncError::status_code`]; the Router's `IntoResponse` impl and the
/// Replicator's `self.error` reporting both go through this same mapping.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("invalid JSON: {0}")]
    BadJson(String),
    #[error("invalid parameter: {0}")]
    BadParam(String),
    #[error("invalid document id: {0}")]
    BadId(String),
    #[error("invalid attachment: {0}")]
    BadAttachment(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("document deleted: {0}")]
    Deleted(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("duplicate: {0}")]
    Duplicate(String),
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("internal server error: {0}")]
    ServerError(String),
    #[error("cancelled")]
    Cancelled,
    #[error("network error: {0}")]
    Network(String),
}

impl SyncError {
    /// The §6 status-code mapping, expressed once and reused by both the
    /// Router's `IntoResponse` impl and any caller that needs the raw code
    /// without building a response (e.g. the Replicator's `self.error`).
    pub fn status_code(&self) -> StatusCode {
        match self {
            SyncError::BadRequest(_)
            | SyncError::BadJson(_)
            | SyncError::BadParam(_)
            | SyncError::BadId(_)
            | SyncError::BadAttachment(_) => StatusCode::BAD_REQUEST,
            SyncError::NotFound(_) | SyncError::Deleted(_) => StatusCode::NOT_FOUND,
            SyncError::Conflict(_) => StatusCode::CONFLICT,
            SyncError::Duplicate(_) => StatusCode::PRECONDITION_FAILED,
            SyncError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            SyncError::Unauthorized => StatusCode::UNAUTHORIZED,
            SyncError::Forbidden => StatusCode::FORBIDDEN,
            SyncError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SyncError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
            SyncError::Network(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// The short machine-readable error name CouchDB clients expect in the
    /// `error` field of the `{error, reason}` envelope.
    pub fn error_name(&self) -> &'static str {
        match self {
            SyncError::BadRequest(_) => "bad_request",
            SyncError::BadJson(_) => "bad_json",
            SyncError::BadParam(_) => "bad_param",
            SyncError::BadId(_) => "bad_id",
            SyncError::BadAttachment(_) => "bad_attachment",
            SyncError::NotFound(_) => "not_found",
            SyncError::Deleted(_) => "deleted",
            SyncError::Conflict(_) => "conflict",
            SyncError::Duplicate(_) => "duplicate",
            SyncError::UnsupportedType(_) => "unsupported_type",
            SyncError::Unauthorized => "unauthorized",
            SyncError::Forbidden => "forbidden",
            SyncError::ServerError(_) => "server_error",
            SyncError::Cancelled => "cancelled",
            SyncError::Network(_) => "network_error",
        }
    }

    /// `true` for the platform-specific "request cancelled" condition that
    /// `stop()` produces in flight; these must be swallowed rather than
    /// surfaced as replication failures (§4.5 Error filtering).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: &'static str,
    reason: String,
}

impl IntoResponse for SyncError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(%status, error = %self, "request failed");
        }
        let body = Json(ErrorEnvelope {
            error: self.error_name(),
            reason: self.to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_section_6_mapping() {
        assert_eq!(
            SyncError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SyncError::Duplicate("x".into()).status_code(),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(
            SyncError::UnsupportedType("x".into()).status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(SyncError::Cancelled.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn cancelled_is_detected_for_error_filtering() {
        assert!(SyncError::Cancelled.is_cancelled());
        assert!(!SyncError::NotFound("x".into()).is_cancelled());
    }
}

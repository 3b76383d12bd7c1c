use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ragcore_domain::ErrorKind;
use serde_json::json;

pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::BAD_REQUEST, message: msg.into() }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::NOT_FOUND, message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::INTERNAL_SERVER_ERROR, message: msg.into() }
    }

    /// Maps the §7 taxonomy to HTTP status, the single translation point every lower-crate error
    /// funnels through on its way out of the control plane.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = match kind {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::PermissionDenied | ErrorKind::TenantMismatch => StatusCode::FORBIDDEN,
            ErrorKind::AlreadyExists | ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::UpstreamUnavailable | ErrorKind::RetriableTransport => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError { status, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "ok": false, "message": self.message }));
        (self.status, body).into_response()
    }
}

impl From<ragcore_store::StoreError> for ApiError {
    fn from(e: ragcore_store::StoreError) -> Self {
        ApiError::from_kind(e.kind(), e.to_string())
    }
}

impl From<ragcore_ingest::IngestError> for ApiError {
    fn from(e: ragcore_ingest::IngestError) -> Self {
        ApiError::from_kind(e.kind(), e.sanitized_message())
    }
}

impl From<ragcore_graphrag::GraphRagError> for ApiError {
    fn from(e: ragcore_graphrag::GraphRagError) -> Self {
        ApiError::from_kind(e.kind(), e.to_string())
    }
}

impl From<ragcore_domain::DomainError> for ApiError {
    fn from(e: ragcore_domain::DomainError) -> Self {
        ApiError::from_kind(e.kind(), e.to_string())
    }
}

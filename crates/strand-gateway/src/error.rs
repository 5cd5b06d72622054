use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use strand_core::error::StrandError;

/// Maps engine errors onto HTTP responses with a `{"error": ...}` body.
pub struct ApiError(pub StrandError);

impl From<StrandError> for ApiError {
    fn from(err: StrandError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            StrandError::Validation(_) => StatusCode::BAD_REQUEST,
            StrandError::UnknownGraph(_) | StrandError::UnknownRun(_) => StatusCode::NOT_FOUND,
            StrandError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

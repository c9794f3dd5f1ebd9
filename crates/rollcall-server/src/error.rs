use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rollcall_shared::TreeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid path or payload: {0}")]
    Tree(#[from] TreeError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Missing or invalid bearer token")]
    Unauthorized,

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Tree(_) | ServerError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::Snapshot(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Snapshot error".to_string())
            }
            ServerError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Authentication failed")]
    AuthError,
    #[error("Refresh token required")]
    MissingToken,
    #[error("Invalid refresh token")]
    InvalidToken,
    #[error("Token does not have refresh privileges")]
    InsufficientScope,
    #[error("Refresh token has expired")]
    ExpiredToken,
    #[error("Not found")]
    NotFound,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal server error")]
    Internal,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            Self::AuthError => {
                tracing::debug!("Authentication failed");
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            Self::MissingToken => {
                tracing::debug!("Refresh token missing");
                (StatusCode::UNAUTHORIZED, "Refresh token required".to_string())
            }
            Self::InvalidToken => {
                tracing::debug!("Refresh token not recognized");
                (StatusCode::UNAUTHORIZED, "Invalid refresh token".to_string())
            }
            Self::InsufficientScope => {
                tracing::debug!("Token lacks refresh capability");
                (StatusCode::FORBIDDEN, "Token does not have refresh privileges".to_string())
            }
            Self::ExpiredToken => {
                tracing::debug!("Refresh token expired");
                (StatusCode::UNAUTHORIZED, "Refresh token has expired".to_string())
            }
            Self::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "Not found".to_string())
            }
            Self::BadRequest(msg) => {
                tracing::debug!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, msg)
            }
            Self::Conflict(msg) => {
                tracing::debug!(message = %msg, "Conflict");
                (StatusCode::CONFLICT, msg)
            }
            Self::Internal => {
                tracing::error!("Internal server error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

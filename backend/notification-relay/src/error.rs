use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use relay_protocol::{ProtocolError, PushResponse};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Invalid request: {0}")]
    Protocol(#[from] ProtocolError),

    /// The push target has no live connection; the notification is dropped.
    #[error("User not connected")]
    NotConnected,
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<envy::Error> for AppError {
    fn from(e: envy::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Protocol(_) => StatusCode::BAD_REQUEST,
            AppError::NotConnected => StatusCode::NOT_FOUND,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(PushResponse::failed(self.to_string()))
    }
}

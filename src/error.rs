use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::error;
use serde_json::json;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Application error taxonomy. Every service returns these; controllers rely
/// on the `ResponseError` impl to turn them into HTTP responses.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Authorization(String),

    #[error("payment signature verification failed")]
    InvalidSignature,

    #[error("webhook signature verification failed")]
    InvalidWebhookSignature,

    #[error("invalid QR token: {0}")]
    InvalidToken(String),

    #[error("QR token has expired")]
    ExpiredToken,

    #[error("{0}")]
    InvalidState(String),

    #[error("payment gateway error: {0}")]
    Gateway(String),

    #[error("payment gateway unreachable: {0}")]
    GatewayTimeout(String),

    #[error("storage error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(entity: &str) -> Self {
        Error::NotFound(entity.to_string())
    }

    fn public_message(&self) -> String {
        match self {
            Error::Persistence(e) => {
                error!("Storage failure: {}", e);
                if is_development() {
                    format!("storage error: {}", e)
                } else {
                    "An internal error occurred. Please try again.".to_string()
                }
            }
            Error::Internal(msg) => {
                error!("Internal error: {}", msg);
                if is_development() {
                    msg.clone()
                } else {
                    "An internal error occurred. Please try again.".to_string()
                }
            }
            other => other.to_string(),
        }
    }
}

fn is_development() -> bool {
    std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()) != "production"
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::InvalidToken(_) | Error::ExpiredToken => {
                StatusCode::BAD_REQUEST
            }
            Error::InvalidSignature | Error::InvalidWebhookSignature => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Authorization(_) => StatusCode::FORBIDDEN,
            Error::InvalidState(_) => StatusCode::CONFLICT,
            Error::Gateway(_) => StatusCode::BAD_GATEWAY,
            Error::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Persistence(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.public_message(),
        }))
    }
}

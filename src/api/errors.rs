use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::models::{ErrorClass, LedgerError};

pub const INVALID_SPEND_MESSAGE: &str = "Please provide a valid points value.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    InvalidRequest(String)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Ledger(ledger_error) => match ledger_error.class() {
                ErrorClass::BadRequest => (StatusCode::BAD_REQUEST, ledger_error.to_string()),
                ErrorClass::Internal => {
                    error!("{ledger_error}");
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
                }
            },
            ApiError::InvalidRequest(message) => (StatusCode::BAD_REQUEST, message.clone())
        };

        (status, message).into_response()
    }
}

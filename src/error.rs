use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::fetcher::FetchError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, empty or malformed request input.
    #[error("{0}")]
    ClientInput(String),

    #[error("{}", remote_message(.0))]
    RemoteContent(#[from] FetchError),

    /// Bytes that do not parse as a supported image.
    #[error("{0}")]
    InvalidImage(String),

    #[error("{context}: {message}")]
    Internal {
        context: &'static str,
        message: String,
    },
}

fn remote_message(err: &FetchError) -> String {
    match err {
        FetchError::Request(e) => format!("Error downloading image: {}", e),
        other => other.to_string(),
    }
}

impl ApiError {
    pub fn internal(context: &'static str, err: impl std::fmt::Display) -> Self {
        ApiError::Internal {
            context,
            message: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ClientInput(_) | ApiError::RemoteContent(_) | ApiError::InvalidImage(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(error = %message, "request failed");
        } else {
            tracing::warn!(error = %message, "rejected request");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

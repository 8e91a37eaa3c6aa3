//! Error types for the detector.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::types::ErrorBody;

/// Client-caused failures. The display text is the exact `error` field
/// returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Request must be JSON")]
    NotJson,

    #[error("No text provided")]
    MissingText,
}

/// Server-side failures while loading the model or running it.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Fetching or building the tokenizer/model failed. The host stays
    /// uninitialized so the next caller retries.
    #[error("Failed to load model '{model}': {source:#}")]
    Load {
        model: String,
        #[source]
        source: anyhow::Error,
    },

    /// `infer` was called before `ensure_ready` succeeded.
    #[error("Model is not loaded")]
    NotReady,

    /// Tokenization or the forward pass failed.
    #[error("Inference failed: {0:#}")]
    Inference(#[source] anyhow::Error),
}

/// Everything the `/analyze` handler can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(err) => {
                tracing::debug!(error = %err, "rejected request");
                (StatusCode::BAD_REQUEST, Json(ErrorBody::new(err.to_string()))).into_response()
            }
            ApiError::Model(err) => {
                tracing::error!(error = %err, "error processing request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody::internal(err.to_string())),
                )
                    .into_response()
            }
        }
    }
}

//! Core client error types.

use inkframe_api_client::ApiError;
use thiserror::Error;

/// Core error type.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

/// Core result type.
pub type Result<T> = std::result::Result<T, CoreError>;

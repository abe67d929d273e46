//! Crate-wide error taxonomy.
//!
//! Only two variants abort a whole request: [`EngineError::InvalidRequest`]
//! (the caller can fix the request and retry) and [`EngineError::Internal`]
//! (an invariant was violated). Everything that can go wrong for a single
//! file — I/O, a corrupt JPEG, a canceled worker — is captured per item and
//! recorded in the response details instead of being raised.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("settings error: {0}")]
    Settings(String),
    #[error("operation canceled")]
    Canceled,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for EngineError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(value: serde_json::Error) -> Self {
        Self::Settings(value.to_string())
    }
}

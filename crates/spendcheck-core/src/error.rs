//! Error types for SpendCheck

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A remote provider (document store, OCR, model, push, storage) rejected a call
    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    #[error("{0} not configured")]
    NotConfigured(&'static str),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    pub(crate) fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Error::Provider {
            provider,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

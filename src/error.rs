// src/error.rs

//! Unified error handling for the alert pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Persistence is unavailable or inconsistent
    #[error("Storage error: {0}")]
    Storage(String),

    /// The scrape source failed for a shelter
    #[error("Scrape error for {shelter}: {message}")]
    Scrape { shelter: String, message: String },

    /// A channel failed to deliver a message
    #[error("Delivery error on {channel}: {message}")]
    Delivery { channel: String, message: String },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a scrape error for a shelter.
    pub fn scrape(shelter: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Scrape {
            shelter: shelter.into(),
            message: message.to_string(),
        }
    }

    /// Create a delivery error for a channel.
    pub fn delivery(channel: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self::Delivery {
            channel: channel.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = AppError::scrape("happy-tails", "timeout");
        assert_eq!(err.to_string(), "Scrape error for happy-tails: timeout");

        let err = AppError::delivery("sms", "gateway returned 503");
        assert_eq!(err.to_string(), "Delivery error on sms: gateway returned 503");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AppError = io.into();
        assert!(matches!(err, AppError::Io(_)));
    }
}

//! Error types for the mobile form.
//!
//! All errors are represented by the `FormError` enum. Rendering and layout
//! never surface these to their callers; they are logged and the form degrades
//! to a smaller rendering instead.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all form operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum FormError {
    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, TOML).
    #[error("{0}")]
    Convert(String),

    /// Persisted settings errors.
    #[error("{0}")]
    Settings(String),

    /// Host graph access errors (missing node, missing widget).
    #[error("{0}")]
    Graph(String),

    /// A registered node or widget handler failed.
    #[error("handler for '{kind}' failed: {message}")]
    Handler {
        kind: String,
        message: String,
    },

    /// Extension initialization errors.
    #[error("{0}")]
    Extension(String),

    /// Media upload errors.
    #[error("{0}")]
    Upload(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),
}

impl FormError {
    pub fn handler(
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        FormError::Handler {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<FormError> for String {
    fn from(val: FormError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for FormError {
    fn from(error: std::io::Error) -> Self {
        FormError::IoError(error.to_string())
    }
}

impl From<FormError> for std::io::Error {
    fn from(val: FormError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for FormError {
    fn from(_: FromUtf8Error) -> Self {
        FormError::Convert("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for FormError {
    fn from(error: serde_json::Error) -> Self {
        FormError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for FormError {
    fn from(error: toml::de::Error) -> Self {
        FormError::Config(error.to_string())
    }
}

impl From<reqwest::Error> for FormError {
    fn from(error: reqwest::Error) -> Self {
        FormError::Upload(error.to_string())
    }
}

impl From<jsonschema::ValidationError<'_>> for FormError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        FormError::Config(error.to_string())
    }
}

//! Error types for Tabulaire.
//!
//! All fallible operations in the crate return [`Result`], built on a single
//! [`TabulaireError`] enum. Error handling policy:
//!
//! - System errors (`std::io::Error`) bubble up unchanged via `#[from]` so
//!   callers can distinguish real filesystem problems from pipeline failures.
//! - Pipeline errors are wrapped with stage context (which stage, which page)
//!   and preserve their cause through `#[source]`.
//! - Degraded-but-recoverable conditions are *not* errors: they accumulate in
//!   the `warnings` list of the affected result (see the pipeline module).

use thiserror::Error;

/// Result type alias using [`TabulaireError`].
pub type Result<T> = std::result::Result<T, TabulaireError>;

/// Main error type for all Tabulaire operations.
///
/// Only fatal conditions surface here: no renderable pages, an OCR engine
/// that failed on every pass of every page, invalid configuration. Anything
/// the pipeline can work around is reported as a warning instead.
#[derive(Debug, Error)]
pub enum TabulaireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {message}")]
    ImageProcessing {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("OCR error: {message}")]
    Ocr {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl From<serde_json::Error> for TabulaireError {
    fn from(err: serde_json::Error) -> Self {
        TabulaireError::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl TabulaireError {
    /// Create an ImageProcessing error
    pub fn image_processing<S: Into<String>>(message: S) -> Self {
        Self::ImageProcessing {
            message: message.into(),
            source: None,
        }
    }

    /// Create an Ocr error
    pub fn ocr<S: Into<String>>(message: S) -> Self {
        Self::Ocr {
            message: message.into(),
            source: None,
        }
    }

    /// Create an Ocr error with source
    pub fn ocr_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Ocr {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a Validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            source: None,
        }
    }
}

//! Error types for the viewer engine
//!
//! Every load attempt ends either in a ready scene or in exactly one of these
//! errors. They are terminal for the attempt: the session moves to its error
//! state and a retry is always a new load.

use thiserror::Error;

use crate::loader::ModelFormat;

/// Errors surfaced by the loading pipeline and the graphics setup
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewerError {
    /// The filename extension does not map to a supported format
    #[error("Unsupported model format: .{extension}")]
    UnsupportedFormat { extension: String },

    /// The model bytes (or a referenced resource) could not be fetched
    #[error("Failed to fetch model: {0}")]
    FetchError(String),

    /// The bytes were fetched but are not a valid model of the detected format
    #[error("Failed to parse {format} model: {message}")]
    ParseError { format: ModelFormat, message: String },

    /// The model has no measurable extent, so it cannot be scaled
    #[error("Model contains no measurable geometry")]
    EmptyGeometry,

    /// A graphics resource could not be allocated
    #[error("Graphics setup failed: {0}")]
    SetupError(String),
}

impl ViewerError {
    pub fn parse(format: ModelFormat, message: impl Into<String>) -> Self {
        Self::ParseError {
            format,
            message: message.into(),
        }
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        Self::FetchError(message.into())
    }
}

/// Result alias used across the library
pub type ViewerResult<T> = Result<T, ViewerError>;

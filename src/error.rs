//! Error types for template field extraction

use thiserror::Error;

use crate::ocr::OcrError;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Extraction error type
///
/// Per-field failures are recovered into a result record by the field
/// extractor. Everything that reaches the caller is fatal for the request
/// (or, for `Preprocessing`, for the image it names).
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Normalized coordinates mapped to a zero-area pixel region
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Image preprocessing failed: {0}")]
    Preprocessing(String),

    #[error("OCR engine failure: {0}")]
    OcrEngine(#[from] OcrError),

    /// A required backend or renderer is missing or misconfigured
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// PDF rasterization failed
    #[error("Document error: {0}")]
    Document(String),

    /// The run's deadline passed while a field was in flight
    #[error("extraction timed out")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for ExtractionError {
    fn from(err: image::ImageError) -> Self {
        ExtractionError::Preprocessing(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ExtractionError {
    fn from(err: tokio::task::JoinError) -> Self {
        ExtractionError::Preprocessing(format!("Task join error: {}", err))
    }
}

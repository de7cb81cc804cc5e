//! Template OCR
//!
//! Extracts the text of named regions ("fields") from scanned documents and
//! rebuilds word/line/paragraph structure for full-page OCR.
//!
//! # Modules
//!
//! - `extract`: template field extraction over page images
//! - `ocr`: engines, full-page OCR and layout reconstruction
//! - `preprocess`: image cleanup ahead of recognition
//! - `input`: document type detection and page splitting
//! - `geometry`: normalized-to-pixel region conversion

pub mod config;
pub mod error;
pub mod extract;
pub mod geometry;
pub mod input;
pub mod ocr;
#[cfg(feature = "pdf")]
pub mod pdf;
pub mod preprocess;
pub mod template;

pub use config::Config;
pub use error::{ExtractionError, Result};
pub use extract::{DocumentExtraction, ExtractionOptions, TemplateExtractor};
pub use ocr::{OcrService, UnifiedOcrResult};
pub use template::{FieldExtractionResult, FieldStatus, TemplateField};

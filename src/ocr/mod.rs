//! OCR Module
//!
//! Full-page recognition and the engine plumbing shared with template
//! extraction.
//!
//! Supports two backends, selected once from configuration:
//! - Tesseract (local, requires installation)
//! - OCR.space (hosted API)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use template_ocr::{config::Config, ocr::OcrService};
//!
//! let config = Config::from_env()?;
//! let service = OcrService::from_config(&config);
//! service.ensure_available().await?;
//!
//! let result = service.process_image(&png_bytes, Some("eng"), true).await?;
//! for paragraph in &result.paragraphs {
//!     println!("{}", paragraph.text);
//! }
//! ```

mod hocr;
pub mod layout;
pub mod provider;
mod service;
mod types;

pub use hocr::parse_hocr_words;
pub use provider::{mean_word_confidence, OcrEngine, OcrSpaceEngine, OcrWorker, TesseractEngine};
pub use service::OcrService;
pub use types::{
    validate_language, BoundingBox, GeometrySource, OcrBlock, OcrEngineKind, OcrError, OcrLine,
    OcrParagraph, OcrWord, UnifiedOcrResult,
};

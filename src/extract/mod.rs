//! Template extraction
//!
//! Crops each template field out of its page image, OCRs it, and collects
//! the results per page and per document.

mod aggregator;
mod field;

pub use aggregator::{
    DocumentExtraction, ExtractionOptions, ExtractionSummary, TemplateExtractor, TIMEOUT_NOTE,
};
pub use field::{interpret, FieldExtractor, LOW_CONFIDENCE_NOTE, NO_REGION_NOTE, NO_TEXT_NOTE};

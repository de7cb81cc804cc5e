//! Single-field extraction
//!
//! region -> crop -> preprocess -> OCR -> trimmed text + diagnostic note.
//! Every failure is folded into the returned result so sibling fields keep
//! going.

use image::DynamicImage;

use crate::error::{ExtractionError, Result};
use crate::ocr::OcrWorker;
use crate::preprocess::ImagePreprocessor;
use crate::template::{FieldExtractionResult, TemplateField, LOW_CONFIDENCE};

pub const NO_REGION_NOTE: &str = "No region";
pub const NO_TEXT_NOTE: &str = "No text detected in marked region";
pub const LOW_CONFIDENCE_NOTE: &str = "Low confidence — text may be unclear or partially obscured";

/// Extracts template fields from decoded page images with a borrowed worker
pub struct FieldExtractor<'a> {
    worker: &'a mut dyn OcrWorker,
    preprocessor: &'a ImagePreprocessor,
    language: &'a str,
    aggressive: bool,
}

impl<'a> FieldExtractor<'a> {
    pub fn new(
        worker: &'a mut dyn OcrWorker,
        preprocessor: &'a ImagePreprocessor,
        language: &'a str,
        aggressive: bool,
    ) -> Self {
        Self {
            worker,
            preprocessor,
            language,
            aggressive,
        }
    }

    /// Extract one field; never fails
    pub async fn extract(&mut self, field: &TemplateField, page: &DynamicImage) -> FieldExtractionResult {
        match self.try_extract(field, page).await {
            Ok(result) => {
                tracing::info!(
                    "Field \"{}\": {:?} ({}%)",
                    field.field_name,
                    result.raw_text.as_deref().map(preview),
                    result.confidence
                );
                result
            }
            Err(ExtractionError::InvalidRegion(reason)) => {
                tracing::debug!("Field \"{}\": {}", field.field_name, reason);
                FieldExtractionResult::failed(field, NO_REGION_NOTE)
            }
            Err(e) => {
                tracing::warn!("Error extracting field \"{}\": {}", field.field_name, e);
                FieldExtractionResult::failed(field, format!("Error: {}", e))
            }
        }
    }

    async fn try_extract(
        &mut self,
        field: &TemplateField,
        page: &DynamicImage,
    ) -> Result<FieldExtractionResult> {
        let region = field.region().pixel_region(page.width(), page.height())?;

        tracing::debug!(
            "Extracting region: x={}, y={}, w={}, h={} from {}x{}",
            region.left,
            region.top,
            region.width,
            region.height,
            page.width(),
            page.height()
        );

        let crop = page.crop_imm(region.left, region.top, region.width, region.height);
        let preprocessor = self.preprocessor.clone();
        let aggressive = self.aggressive;
        let buffer =
            tokio::task::spawn_blocking(move || preprocessor.process(&crop, aggressive)).await??;

        let ocr = self.worker.recognize(&buffer, self.language).await?;
        Ok(interpret(field, &ocr.text, ocr.confidence))
    }
}

/// Build the result record from raw OCR text and confidence
pub fn interpret(field: &TemplateField, text: &str, confidence: f64) -> FieldExtractionResult {
    let text = text.trim();
    let notes = if text.is_empty() {
        Some(NO_TEXT_NOTE.to_string())
    } else if confidence < LOW_CONFIDENCE {
        Some(LOW_CONFIDENCE_NOTE.to_string())
    } else {
        None
    };

    FieldExtractionResult {
        field_id: field.field_id.clone(),
        field_name: field.field_name.clone(),
        page_number: field.page_number,
        raw_text: (!text.is_empty()).then(|| text.to_string()),
        confidence,
        notes,
    }
}

fn preview(text: &str) -> String {
    text.chars().take(30).collect()
}

#[cfg(test)]
mod tests {
    use image::RgbImage;

    use super::*;
    use crate::config::PreprocessConfig;
    use crate::ocr::provider::mock::MockEngine;
    use crate::ocr::OcrEngine;
    use crate::template::FieldStatus;

    fn field(x: f64, y: f64, w: f64, h: f64) -> TemplateField {
        serde_json::from_value(serde_json::json!({
            "field_id": "f-1",
            "template_id": "t-1",
            "field_name": "total",
            "page_number": 1,
            "x_norm": x, "y_norm": y, "w_norm": w, "h_norm": h
        }))
        .unwrap()
    }

    fn page() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 60, image::Rgb([230, 230, 230])))
    }

    fn preprocessor() -> ImagePreprocessor {
        ImagePreprocessor::new(PreprocessConfig {
            aggressive_width: 48,
            mild_width: 32,
            binarize_threshold: 140,
        })
    }

    #[test]
    fn test_interpret_notes() {
        let f = field(0.1, 0.1, 0.2, 0.2);

        let good = interpret(&f, "  INV-001 \n", 91.0);
        assert_eq!(good.raw_text.as_deref(), Some("INV-001"));
        assert_eq!(good.notes, None);
        assert_eq!(good.status(), FieldStatus::Good);

        let low = interpret(&f, "INV-0O1", 42.0);
        assert_eq!(low.notes.as_deref(), Some(LOW_CONFIDENCE_NOTE));
        assert_eq!(low.status(), FieldStatus::LowConfidence);

        let empty = interpret(&f, " \n ", 95.0);
        assert_eq!(empty.raw_text, None);
        assert_eq!(empty.confidence, 95.0);
        assert_eq!(empty.notes.as_deref(), Some(NO_TEXT_NOTE));
        assert_eq!(empty.status(), FieldStatus::NoData);
    }

    #[tokio::test]
    async fn test_extract_calls_worker_once() {
        let engine = MockEngine::replying(&[("  $42.00  ", 88.0)]);
        let mut worker = engine.start_worker().await.unwrap();
        let pre = preprocessor();

        let mut extractor = FieldExtractor::new(worker.as_mut(), &pre, "eng", true);
        let result = extractor.extract(&field(0.5, 0.5, 0.25, 0.25), &page()).await;

        assert_eq!(result.raw_text.as_deref(), Some("$42.00"));
        assert_eq!(result.confidence, 88.0);
        assert_eq!(engine.recognize_calls(), 1);
    }

    #[tokio::test]
    async fn test_degenerate_region_skips_ocr() {
        let engine = MockEngine::replying(&[("should not be read", 99.0)]);
        let mut worker = engine.start_worker().await.unwrap();
        let pre = preprocessor();

        let mut extractor = FieldExtractor::new(worker.as_mut(), &pre, "eng", false);
        let result = extractor.extract(&field(0.5, 0.5, 0.0, 0.25), &page()).await;

        assert_eq!(result.raw_text, None);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.notes.as_deref(), Some(NO_REGION_NOTE));
        assert_eq!(engine.recognize_calls(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_failed_result() {
        let engine = MockEngine::replying(&[("x", 90.0)]).failing_on(&[1]);
        let mut worker = engine.start_worker().await.unwrap();
        let pre = preprocessor();

        let mut extractor = FieldExtractor::new(worker.as_mut(), &pre, "eng", true);
        let result = extractor.extract(&field(0.0, 0.0, 0.5, 0.5), &page()).await;

        assert_eq!(result.raw_text, None);
        assert_eq!(result.confidence, 0.0);
        let notes = result.notes.unwrap();
        assert!(notes.starts_with("Error: "), "{}", notes);
        assert!(notes.contains("simulated failure"));
    }
}

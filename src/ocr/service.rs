//! OCR Service
//!
//! Owns the configured engine and runs whole-image OCR with structure
//! reconstruction.

use std::sync::Arc;

use super::layout::build_structure;
use super::provider::{OcrEngine, OcrSpaceEngine, TesseractEngine};
use super::types::{validate_language, OcrEngineKind, UnifiedOcrResult};
use crate::config::Config;
use crate::error::{ExtractionError, Result};
use crate::input::{detect_kind, DocumentKind};
use crate::preprocess::ImagePreprocessor;

/// OCR service bound to a single engine chosen at construction time
#[derive(Clone)]
pub struct OcrService {
    engine: Arc<dyn OcrEngine>,
    preprocessor: ImagePreprocessor,
    default_language: String,
}

impl OcrService {
    /// Build the engine named by the configuration
    pub fn from_config(config: &Config) -> Self {
        let engine: Arc<dyn OcrEngine> = match config.engine {
            OcrEngineKind::Tesseract => Arc::new(TesseractEngine::new(&config.tesseract)),
            OcrEngineKind::OcrSpace => Arc::new(OcrSpaceEngine::new(&config.ocr_space)),
        };
        Self {
            engine,
            preprocessor: ImagePreprocessor::new(config.preprocess.clone()),
            default_language: config.extraction.language.clone(),
        }
    }

    /// Use an explicit engine (custom backends, tests)
    pub fn with_engine(
        engine: Arc<dyn OcrEngine>,
        preprocessor: ImagePreprocessor,
        default_language: &str,
    ) -> Self {
        Self {
            engine,
            preprocessor,
            default_language: default_language.to_string(),
        }
    }

    pub fn engine(&self) -> Arc<dyn OcrEngine> {
        self.engine.clone()
    }

    pub fn engine_kind(&self) -> OcrEngineKind {
        self.engine.kind()
    }

    pub fn preprocessor(&self) -> &ImagePreprocessor {
        &self.preprocessor
    }

    /// Fail fast when the configured engine cannot run
    pub async fn ensure_available(&self) -> Result<()> {
        if self.engine.is_available().await {
            Ok(())
        } else {
            Err(ExtractionError::Configuration(format!(
                "{} OCR engine is not available",
                self.engine.kind()
            )))
        }
    }

    /// OCR a whole image and rebuild its word/line/paragraph structure.
    ///
    /// Any failure is fatal for the request.
    pub async fn process_image(
        &self,
        image_data: &[u8],
        language: Option<&str>,
        preprocess: bool,
    ) -> Result<UnifiedOcrResult> {
        let lang = language.unwrap_or(&self.default_language);
        validate_language(lang)?;

        match detect_kind(image_data)? {
            DocumentKind::Image => {}
            DocumentKind::Pdf => {
                return Err(ExtractionError::InvalidInput(
                    "Full-page OCR expects an image, got a PDF".to_string(),
                ))
            }
        }

        let image_data = if preprocess {
            tracing::info!("Preprocessing image for better OCR accuracy");
            let preprocessor = self.preprocessor.clone();
            let data = image_data.to_vec();
            tokio::task::spawn_blocking(move || preprocessor.process_bytes(&data, true)).await??
        } else {
            image_data.to_vec()
        };

        let mut worker = self.engine.start_worker().await?;
        let recognized = worker.recognize(&image_data, lang).await;
        if let Err(e) = worker.terminate().await {
            tracing::warn!("Failed to release OCR worker: {}", e);
        }
        let result = build_structure(recognized?);

        tracing::info!(
            "OCR completed. Engine: {}, Confidence: {}%, Words: {}",
            result.engine,
            result.confidence,
            result.words.len()
        );
        Ok(result)
    }

    /// Download an image and OCR it
    pub async fn process_url(
        &self,
        url: &str,
        language: Option<&str>,
        preprocess: bool,
    ) -> Result<UnifiedOcrResult> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| ExtractionError::InvalidInput(format!("Invalid image URL: {}", e)))?;

        tracing::info!("Downloading image from URL: {}", parsed);
        let response = reqwest::get(parsed)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ExtractionError::InvalidInput(format!("Failed to download image: {}", e)))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExtractionError::InvalidInput(format!("Failed to read image body: {}", e)))?;

        self.process_image(&bytes, language, preprocess).await
    }
}

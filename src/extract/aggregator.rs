//! Multi-page template extraction
//!
//! Binds template fields to the submitted page images by page number and
//! runs them in template order through one worker per run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::Serialize;
use tokio::time::Instant;

use super::field::FieldExtractor;
use crate::config::Config;
use crate::error::{ExtractionError, Result};
use crate::input::{load_pages, DocumentKind};
use crate::ocr::{validate_language, OcrEngine, OcrService, OcrWorker};
use crate::preprocess::ImagePreprocessor;
use crate::template::{FieldExtractionResult, PageExtractionBatch, SkippedField, TemplateField};

/// Note on the field that was in flight when the deadline passed
pub const TIMEOUT_NOTE: &str = "Error: extraction timed out";

/// Per-request extraction options
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    pub language: String,
    pub aggressive: bool,
    /// Deadline for the whole run
    pub timeout: Option<Duration>,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            aggressive: true,
            timeout: None,
        }
    }
}

impl From<&Config> for ExtractionOptions {
    fn from(config: &Config) -> Self {
        Self {
            language: config.extraction.language.clone(),
            aggressive: config.extraction.aggressive,
            timeout: config.extraction.timeout,
        }
    }
}

/// Everything one extraction run produced
#[derive(Debug, Clone, Serialize)]
pub struct DocumentExtraction {
    /// Number of submitted page images
    pub total_pages: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<DocumentKind>,
    /// Pages that had fields, ascending
    pub pages: Vec<PageExtractionBatch>,
    /// All results, by page then template order
    pub results: Vec<FieldExtractionResult>,
    /// Fields cut off by the deadline
    pub not_attempted: Vec<SkippedField>,
    pub timed_out: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Counts derived from the flat result list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtractionSummary {
    pub total_pages: usize,
    pub pages_with_data: usize,
    pub fields_attempted: usize,
    pub fields_with_text: usize,
}

impl DocumentExtraction {
    fn empty(total_pages: usize) -> Self {
        let now = Utc::now();
        Self {
            total_pages,
            file_type: None,
            pages: Vec::new(),
            results: Vec::new(),
            not_attempted: Vec::new(),
            timed_out: false,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn summary(&self) -> ExtractionSummary {
        let mut pages_with_data: Vec<u32> = self
            .results
            .iter()
            .filter(|r| r.has_text())
            .map(|r| r.page_number)
            .collect();
        pages_with_data.dedup();

        ExtractionSummary {
            total_pages: self.total_pages,
            pages_with_data: pages_with_data.len(),
            fields_attempted: self.results.len(),
            fields_with_text: self.results.iter().filter(|r| r.has_text()).count(),
        }
    }

    /// Write results back onto the matching template fields
    pub fn apply_to(&self, fields: &mut [TemplateField]) {
        for field in fields.iter_mut() {
            if let Some(result) = self.results.iter().find(|r| r.field_id == field.field_id) {
                field.apply_extraction(result);
            }
        }
    }
}

/// Runs template extraction over page images
#[derive(Clone)]
pub struct TemplateExtractor {
    engine: Arc<dyn OcrEngine>,
    preprocessor: ImagePreprocessor,
    render_scale: f32,
}

impl TemplateExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>, preprocessor: ImagePreprocessor) -> Self {
        Self {
            engine,
            preprocessor,
            render_scale: 2.0,
        }
    }

    pub fn from_service(service: &OcrService, config: &Config) -> Self {
        Self {
            engine: service.engine(),
            preprocessor: service.preprocessor().clone(),
            render_scale: config.pdf.render_scale,
        }
    }

    /// Extract fields from an uploaded image or PDF
    pub async fn extract_document(
        &self,
        document: Vec<u8>,
        fields: &[TemplateField],
        options: &ExtractionOptions,
    ) -> Result<DocumentExtraction> {
        validate_language(&options.language)?;
        let pages = load_pages(document, self.render_scale).await?;
        let mut extraction = self.extract(&pages.pages, fields, options).await?;
        extraction.file_type = Some(pages.kind);
        Ok(extraction)
    }

    /// Extract fields from page images (page 1 first)
    pub async fn extract(
        &self,
        pages: &[Vec<u8>],
        fields: &[TemplateField],
        options: &ExtractionOptions,
    ) -> Result<DocumentExtraction> {
        validate_language(&options.language)?;
        if pages.is_empty() {
            return Err(ExtractionError::InvalidInput("No page images submitted".to_string()));
        }

        let plan = plan_pages(pages.len(), fields);
        if plan.is_empty() {
            tracing::info!("No template fields fall on the {} submitted pages", pages.len());
            return Ok(DocumentExtraction::empty(pages.len()));
        }

        let mut worker = self.engine.start_worker().await?;
        let extraction = self
            .run(worker.as_mut(), pages, &plan, options)
            .await;
        if let Err(e) = worker.terminate().await {
            tracing::warn!("Failed to release OCR worker: {}", e);
        }

        let summary = extraction.summary();
        tracing::info!(
            "Extraction complete: {}/{} fields extracted{}",
            summary.fields_with_text,
            summary.fields_attempted,
            if extraction.timed_out { " (timed out)" } else { "" }
        );
        Ok(extraction)
    }

    async fn run(
        &self,
        worker: &mut dyn OcrWorker,
        pages: &[Vec<u8>],
        plan: &[(u32, Vec<&TemplateField>)],
        options: &ExtractionOptions,
    ) -> DocumentExtraction {
        let mut extraction = DocumentExtraction::empty(pages.len());
        let deadline = options.timeout.map(|t| Instant::now() + t);
        let mut extractor =
            FieldExtractor::new(worker, &self.preprocessor, &options.language, options.aggressive);

        for (page_number, page_fields) in plan {
            let page_number = *page_number;

            if extraction.timed_out || deadline_passed(deadline) {
                extraction.timed_out = true;
                extraction
                    .not_attempted
                    .extend(page_fields.iter().map(|f| SkippedField::from(*f)));
                continue;
            }

            tracing::info!("Page {}: Extracting {} fields...", page_number, page_fields.len());

            let image = match decode_page(&pages[page_number as usize - 1]).await {
                Ok(image) => image,
                Err(e) => {
                    tracing::error!("Page {}: {}", page_number, e);
                    let results: Vec<FieldExtractionResult> = page_fields
                        .iter()
                        .map(|f| FieldExtractionResult::failed(f, format!("Error: {}", e)))
                        .collect();
                    extraction.results.extend(results.iter().cloned());
                    extraction.pages.push(PageExtractionBatch {
                        page_number,
                        fields: results,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };

            let mut batch = PageExtractionBatch {
                page_number,
                fields: Vec::with_capacity(page_fields.len()),
                error: None,
            };

            for field in page_fields {
                if extraction.timed_out {
                    extraction.not_attempted.push(SkippedField::from(*field));
                    continue;
                }

                let result = match deadline {
                    None => extractor.extract(field, &image).await,
                    Some(deadline) => {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        if remaining.is_zero() {
                            extraction.timed_out = true;
                            extraction.not_attempted.push(SkippedField::from(*field));
                            continue;
                        }
                        match tokio::time::timeout(remaining, extractor.extract(field, &image)).await {
                            Ok(result) => result,
                            Err(_) => {
                                tracing::warn!("Field \"{}\": deadline reached", field.field_name);
                                extraction.timed_out = true;
                                FieldExtractionResult::failed(
                                    field,
                                    format!("Error: {}", ExtractionError::Timeout),
                                )
                            }
                        }
                    }
                };
                batch.fields.push(result);
            }

            let found = batch.fields.iter().filter(|r| r.has_text()).count();
            tracing::info!(
                "Page {}: {}/{} fields extracted",
                page_number,
                found,
                page_fields.len()
            );

            extraction.results.extend(batch.fields.iter().cloned());
            if !batch.fields.is_empty() {
                extraction.pages.push(batch);
            }
        }

        extraction.finished_at = Utc::now();
        extraction
    }
}

/// Fields grouped by page, ascending, keeping template order within a page.
/// Pages without fields and fields without a page image are left out.
fn plan_pages(page_count: usize, fields: &[TemplateField]) -> Vec<(u32, Vec<&TemplateField>)> {
    let mut plan = Vec::new();
    for page_number in 1..=page_count as u32 {
        let page_fields: Vec<&TemplateField> =
            fields.iter().filter(|f| f.page_number == page_number).collect();
        if page_fields.is_empty() {
            tracing::info!("Page {}: No fields defined, skipping", page_number);
            continue;
        }
        plan.push((page_number, page_fields));
    }
    plan
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.map(|d| Instant::now() >= d).unwrap_or(false)
}

async fn decode_page(data: &[u8]) -> Result<DynamicImage> {
    let data = data.to_vec();
    let image = tokio::task::spawn_blocking(move || image::load_from_memory(&data)).await??;
    Ok(image)
}

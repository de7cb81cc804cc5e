//! Template field records and extraction results

use serde::{Deserialize, Serialize};

use crate::geometry::NormalizedRegion;

/// Derived quality tier of an extracted field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    /// No extraction has run yet
    #[default]
    Pending,
    Good,
    LowConfidence,
    NoData,
}

/// Confidence at or above which a non-empty value is `Good`
pub const GOOD_CONFIDENCE: f64 = 85.0;
/// Confidence below which a non-empty value gets a low-confidence note
pub const LOW_CONFIDENCE: f64 = 50.0;

impl FieldStatus {
    /// Classify an extraction by confidence and whether any text came back.
    ///
    /// Non-empty text below the low-confidence floor still counts as
    /// `LowConfidence`; only missing text is `NoData`.
    pub fn classify(confidence: f64, text: Option<&str>) -> Self {
        match text.map(str::trim) {
            None | Some("") => FieldStatus::NoData,
            Some(_) if confidence >= GOOD_CONFIDENCE => FieldStatus::Good,
            Some(_) => FieldStatus::LowConfidence,
        }
    }
}

/// A named region on one page of a template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateField {
    pub field_id: String,
    pub template_id: String,
    pub field_name: String,
    #[serde(default)]
    pub label: Option<String>,
    /// 1-indexed page
    pub page_number: u32,
    pub x_norm: f64,
    pub y_norm: f64,
    pub w_norm: f64,
    pub h_norm: f64,
    #[serde(default)]
    pub sample_value: Option<String>,
    #[serde(default)]
    pub sample_extracted_value: Option<String>,
    /// 0-100
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub field_status: FieldStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TemplateField {
    pub fn region(&self) -> NormalizedRegion {
        NormalizedRegion::new(self.x_norm, self.y_norm, self.w_norm, self.h_norm)
    }

    /// Record an extraction outcome on this field
    pub fn apply_extraction(&mut self, result: &FieldExtractionResult) {
        self.sample_extracted_value = result.raw_text.clone();
        self.confidence_score = Some(result.confidence);
        self.field_status = result.status();
        self.notes = result.notes.clone();
    }
}

/// Outcome of extracting one field from one page image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldExtractionResult {
    pub field_id: String,
    pub field_name: String,
    pub page_number: u32,
    /// Trimmed text; `None` when nothing was recognized or extraction failed
    pub raw_text: Option<String>,
    pub confidence: f64,
    pub notes: Option<String>,
}

impl FieldExtractionResult {
    /// Result for a field whose extraction failed outright
    pub fn failed(field: &TemplateField, notes: impl Into<String>) -> Self {
        Self {
            field_id: field.field_id.clone(),
            field_name: field.field_name.clone(),
            page_number: field.page_number,
            raw_text: None,
            confidence: 0.0,
            notes: Some(notes.into()),
        }
    }

    pub fn has_text(&self) -> bool {
        self.raw_text.as_deref().map(|t| !t.trim().is_empty()).unwrap_or(false)
    }

    pub fn status(&self) -> FieldStatus {
        FieldStatus::classify(self.confidence, self.raw_text.as_deref())
    }
}

/// Results for one page image, in template field order
#[derive(Debug, Clone, Serialize)]
pub struct PageExtractionBatch {
    pub page_number: u32,
    pub fields: Vec<FieldExtractionResult>,
    /// Set when the page image itself could not be used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A field that was never attempted because the run hit its deadline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedField {
    pub field_id: String,
    pub field_name: String,
    pub page_number: u32,
}

impl From<&TemplateField> for SkippedField {
    fn from(field: &TemplateField) -> Self {
        Self {
            field_id: field.field_id.clone(),
            field_name: field.field_name.clone(),
            page_number: field.page_number,
        }
    }
}

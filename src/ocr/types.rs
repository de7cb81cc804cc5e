//! OCR Types
//!
//! Backend-neutral result types shared by every OCR engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// OCR engine type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrEngineKind {
    /// Tesseract OCR (local)
    Tesseract,
    /// OCR.space hosted API
    OcrSpace,
}

impl Default for OcrEngineKind {
    fn default() -> Self {
        Self::Tesseract
    }
}

impl FromStr for OcrEngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tesseract" => Ok(Self::Tesseract),
            "ocrspace" | "ocr.space" | "ocr_space" => Ok(Self::OcrSpace),
            other => Err(format!("Unknown OCR engine: {}", other)),
        }
    }
}

impl fmt::Display for OcrEngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tesseract => write!(f, "tesseract"),
            Self::OcrSpace => write!(f, "ocrspace"),
        }
    }
}

/// Pixel-space bounding box
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Build from corner coordinates (`x0,y0` top-left, `x1,y1` bottom-right)
    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x: x0,
            y: y0,
            w: x1 - x0,
            h: y1 - y0,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// Smallest box containing every input box, `None` for an empty input
    pub fn union<'a, I>(boxes: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a BoundingBox>,
    {
        let mut iter = boxes.into_iter();
        let first = iter.next()?;
        let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.right(), first.bottom());
        for b in iter {
            x0 = x0.min(b.x);
            y0 = y0.min(b.y);
            x1 = x1.max(b.right());
            y1 = y1.max(b.bottom());
        }
        Some(Self::from_corners(x0, y0, x1, y1))
    }
}

/// Single recognized word
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    /// Confidence (0-100)
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// Words clustered into one text line, ordered left to right
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrLine {
    pub text: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
    pub words: Vec<OcrWord>,
}

/// Lines clustered into one paragraph, ordered top to bottom
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrParagraph {
    pub text: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
    pub lines: Vec<OcrLine>,
}

/// Blocks carry no finer grouping than paragraphs
pub type OcrBlock = OcrParagraph;

/// Where word geometry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometrySource {
    /// Boxes reported by the backend (overlay or markup)
    Backend,
    /// Boxes estimated from line-broken plain text; not usable for region targeting
    Synthesized,
    /// No words at all
    None,
}

/// Normalized OCR result shared by every engine
#[derive(Debug, Clone, Serialize)]
pub struct UnifiedOcrResult {
    /// Recognized text
    pub text: String,
    /// Confidence score (0-100)
    pub confidence: f64,
    /// Engine used
    pub engine: OcrEngineKind,
    pub words: Vec<OcrWord>,
    pub lines: Vec<OcrLine>,
    pub paragraphs: Vec<OcrParagraph>,
    pub blocks: Vec<OcrBlock>,
    pub geometry: GeometrySource,
    /// Raw hOCR markup, when the engine produced it
    #[serde(skip)]
    pub markup: Option<String>,
}

impl UnifiedOcrResult {
    /// Result with text and confidence only; structure is filled in later
    pub fn plain(engine: OcrEngineKind, text: String, confidence: f64) -> Self {
        Self {
            text,
            confidence,
            engine,
            words: Vec::new(),
            lines: Vec::new(),
            paragraphs: Vec::new(),
            blocks: Vec::new(),
            geometry: GeometrySource::None,
            markup: None,
        }
    }
}

/// OCR error types
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("OCR provider not available: {0}")]
    ProviderNotAvailable(String),

    #[error("OCR processing failed: {0}")]
    ProcessingError(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid language code: {0}")]
    InvalidLanguage(String),
}

/// Validate language code to prevent argument injection
///
/// Accepts tesseract-style codes such as `eng`, `chi_sim` or `eng+deu`.
pub fn validate_language(lang: &str) -> Result<(), OcrError> {
    if lang.is_empty() || lang.len() > 20 {
        return Err(OcrError::InvalidLanguage(format!(
            "invalid length for {:?}",
            lang
        )));
    }
    for c in lang.chars() {
        if !c.is_ascii_alphanumeric() && c != '+' && c != '_' {
            return Err(OcrError::InvalidLanguage(format!(
                "invalid character {:?} in {:?}",
                c, lang
            )));
        }
    }
    Ok(())
}

//! Configuration management for template-ocr

use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ExtractionError, Result};
use crate::ocr::OcrEngineKind;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: OcrEngineKind,
    pub tesseract: TesseractConfig,
    pub ocr_space: OcrSpaceConfig,
    pub extraction: ExtractionConfig,
    pub preprocess: PreprocessConfig,
    pub pdf: PdfConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TesseractConfig {
    /// Path to the tesseract executable (default: "tesseract" - uses PATH)
    pub binary_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrSpaceConfig {
    pub endpoint: String,
    pub api_key: String,
    /// OCR.space engine number; 2 is the more accurate one
    pub engine: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    pub language: String,
    pub aggressive: bool,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreprocessConfig {
    pub aggressive_width: u32,
    pub mild_width: u32,
    pub binarize_threshold: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PdfConfig {
    pub render_scale: f32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            engine: OcrEngineKind::Tesseract,
            tesseract: TesseractConfig {
                binary_path: "tesseract".to_string(),
            },
            ocr_space: OcrSpaceConfig::default(),
            extraction: ExtractionConfig::default(),
            preprocess: PreprocessConfig::default(),
            pdf: PdfConfig { render_scale: 2.0 },
        }
    }
}

impl Default for OcrSpaceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.ocr.space/parse/image".to_string(),
            api_key: "helloworld".to_string(),
            engine: 2,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            aggressive: true,
            timeout: None,
        }
    }
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            aggressive_width: 3000,
            mild_width: 2500,
            binarize_threshold: 140,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Unknown engine names are a configuration error; malformed numbers fall
    /// back to their defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let engine = match env::var("OCR_ENGINE") {
            Ok(value) => value.parse::<OcrEngineKind>().map_err(ExtractionError::Configuration)?,
            Err(_) => defaults.engine,
        };

        Ok(Config {
            engine,
            tesseract: TesseractConfig {
                binary_path: env::var("TESSERACT_PATH").unwrap_or(defaults.tesseract.binary_path),
            },
            ocr_space: OcrSpaceConfig {
                endpoint: env::var("OCRSPACE_URL").unwrap_or(defaults.ocr_space.endpoint),
                api_key: env::var("OCRSPACE_API_KEY").unwrap_or(defaults.ocr_space.api_key),
                engine: parse_or("OCRSPACE_ENGINE", defaults.ocr_space.engine),
            },
            extraction: ExtractionConfig {
                language: env::var("OCR_LANGUAGE").unwrap_or(defaults.extraction.language),
                aggressive: parse_or("OCR_AGGRESSIVE", defaults.extraction.aggressive),
                timeout: parse_opt::<u64>("EXTRACTION_TIMEOUT_SECS").map(Duration::from_secs),
            },
            preprocess: PreprocessConfig {
                aggressive_width: parse_or("OCR_AGGRESSIVE_WIDTH", defaults.preprocess.aggressive_width),
                mild_width: parse_or("OCR_MILD_WIDTH", defaults.preprocess.mild_width),
                binarize_threshold: parse_or(
                    "OCR_BINARIZE_THRESHOLD",
                    defaults.preprocess.binarize_threshold,
                ),
            },
            pdf: PdfConfig {
                render_scale: parse_or("PDF_RENDER_SCALE", defaults.pdf.render_scale).clamp(0.1, 4.0),
            },
        })
    }
}

fn parse_or<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value for {}: {:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// Optional setting; a malformed value is logged and treated as unset
fn parse_opt<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid value for {}: {:?}, ignoring", key, raw);
            None
        }
    }
}

//! OCR Engines
//!
//! Defines the engine/worker traits and the two backends: a local Tesseract
//! process and the hosted OCR.space API.
//!
//! An engine is chosen once from configuration. Each extraction run starts a
//! worker from it, uses that worker for every recognition call, and terminates
//! it when the run ends.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::types::{BoundingBox, OcrEngineKind, OcrError, OcrWord, UnifiedOcrResult};
use crate::config::{OcrSpaceConfig, TesseractConfig};

/// OCR engine: configuration-level handle that starts workers
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Get the engine type
    fn kind(&self) -> OcrEngineKind;

    /// Check if the engine can run
    async fn is_available(&self) -> bool;

    /// Acquire a worker for one extraction run
    async fn start_worker(&self) -> Result<Box<dyn OcrWorker>, OcrError>;
}

/// Live recognition handle owned by a single extraction run
#[async_trait]
pub trait OcrWorker: Send {
    /// Perform OCR on an encoded image
    async fn recognize(&mut self, image_data: &[u8], language: &str)
        -> Result<UnifiedOcrResult, OcrError>;

    /// Release the worker's resources
    async fn terminate(self: Box<Self>) -> Result<(), OcrError>;
}

/// Tesseract OCR engine (local CLI)
pub struct TesseractEngine {
    binary_path: String,
}

impl TesseractEngine {
    pub fn new(config: &TesseractConfig) -> Self {
        Self {
            binary_path: config.binary_path.clone(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn kind(&self) -> OcrEngineKind {
        OcrEngineKind::Tesseract
    }

    async fn is_available(&self) -> bool {
        let result = Command::new(&self.binary_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        matches!(result, Ok(status) if status.success())
    }

    async fn start_worker(&self) -> Result<Box<dyn OcrWorker>, OcrError> {
        Ok(Box::new(TesseractWorker::new(self.binary_path.clone())?))
    }
}

/// Tesseract worker; owns a scratch directory for image and output files
struct TesseractWorker {
    binary_path: String,
    scratch: tempfile::TempDir,
}

impl TesseractWorker {
    fn new(binary_path: String) -> Result<Self, OcrError> {
        let scratch = tempfile::Builder::new()
            .prefix("template-ocr-")
            .tempdir()
            .map_err(|e| OcrError::ProcessingError(format!("Failed to create scratch dir: {}", e)))?;
        tracing::debug!("Started tesseract worker in {}", scratch.path().display());
        Ok(Self {
            binary_path,
            scratch,
        })
    }

    fn run_paths(&self) -> (PathBuf, PathBuf) {
        let id = uuid::Uuid::new_v4();
        let dir = self.scratch.path();
        (
            dir.join(format!("input_{}.png", id)),
            dir.join(format!("output_{}", id)),
        )
    }
}

#[async_trait]
impl OcrWorker for TesseractWorker {
    async fn recognize(
        &mut self,
        image_data: &[u8],
        language: &str,
    ) -> Result<UnifiedOcrResult, OcrError> {
        let (input_path, output_base) = self.run_paths();

        tokio::fs::write(&input_path, image_data)
            .await
            .map_err(|e| OcrError::ProcessingError(format!("Failed to write temp file: {}", e)))?;

        // psm 3 = automatic page segmentation, oem 1 = LSTM only
        let output = Command::new(&self.binary_path)
            .arg(&input_path)
            .arg(&output_base)
            .arg("-l")
            .arg(language)
            .arg("--oem")
            .arg("1")
            .arg("--psm")
            .arg("3")
            .arg("-c")
            .arg("preserve_interword_spaces=1")
            .arg("txt")
            .arg("hocr")
            .arg("tsv")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| OcrError::ProcessingError(format!("Failed to run tesseract: {}", e)))?;

        let _ = tokio::fs::remove_file(&input_path).await;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::ProcessingError(format!(
                "Tesseract failed: {}",
                stderr.trim()
            )));
        }

        let text = read_output(&output_base, "txt").await?;
        let hocr = read_output(&output_base, "hocr").await.ok();
        let confidence = match read_output(&output_base, "tsv").await {
            Ok(tsv) => mean_word_confidence(&tsv),
            Err(e) => {
                tracing::warn!("No TSV output from tesseract, confidence unknown: {}", e);
                0.0
            }
        };

        let mut result = UnifiedOcrResult::plain(OcrEngineKind::Tesseract, text, confidence);
        result.markup = hocr;
        Ok(result)
    }

    async fn terminate(self: Box<Self>) -> Result<(), OcrError> {
        let path = self.scratch.path().to_path_buf();
        self.scratch.close().map_err(|e| {
            OcrError::ProcessingError(format!(
                "Failed to remove scratch dir {}: {}",
                path.display(),
                e
            ))
        })
    }
}

async fn read_output(base: &Path, extension: &str) -> Result<String, OcrError> {
    let path = base.with_extension(extension);
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| OcrError::ProcessingError(format!("Failed to read {}: {}", path.display(), e)));
    let _ = tokio::fs::remove_file(&path).await;
    content
}

/// Rounded mean of the word-level confidences in tesseract TSV output
///
/// Columns: level page_num block_num par_num line_num word_num left top width
/// height conf text. Rows with negative confidence are structural, not words.
pub fn mean_word_confidence(tsv: &str) -> f64 {
    let confidences: Vec<f64> = tsv
        .lines()
        .skip(1)
        .filter_map(|row| {
            let cols: Vec<&str> = row.split('\t').collect();
            if cols.len() < 12 || cols[0] != "5" || cols[11].trim().is_empty() {
                return None;
            }
            cols[10].trim().parse::<f64>().ok().filter(|c| *c >= 0.0)
        })
        .collect();

    if confidences.is_empty() {
        return 0.0;
    }
    (confidences.iter().sum::<f64>() / confidences.len() as f64).round()
}

/// Confidence reported for OCR.space results, which carry none
const OCR_SPACE_CONFIDENCE: f64 = 90.0;

/// OCR.space hosted API engine
pub struct OcrSpaceEngine {
    config: OcrSpaceConfig,
}

impl OcrSpaceEngine {
    pub fn new(config: &OcrSpaceConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl OcrEngine for OcrSpaceEngine {
    fn kind(&self) -> OcrEngineKind {
        OcrEngineKind::OcrSpace
    }

    async fn is_available(&self) -> bool {
        !self.config.endpoint.is_empty() && !self.config.api_key.is_empty()
    }

    async fn start_worker(&self) -> Result<Box<dyn OcrWorker>, OcrError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| OcrError::ProviderNotAvailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Box::new(OcrSpaceWorker {
            client,
            config: self.config.clone(),
        }))
    }
}

struct OcrSpaceWorker {
    client: reqwest::Client,
    config: OcrSpaceConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OcrSpaceResponse {
    #[serde(default)]
    parsed_results: Option<Vec<ParsedResult>>,
    #[serde(default)]
    is_errored_on_processing: bool,
    /// String or array of strings
    #[serde(default)]
    error_message: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParsedResult {
    #[serde(default)]
    parsed_text: String,
    #[serde(default)]
    text_overlay: Option<TextOverlay>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TextOverlay {
    #[serde(default)]
    lines: Vec<OverlayLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OverlayLine {
    #[serde(default)]
    words: Vec<OverlayWord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OverlayWord {
    #[serde(default)]
    word_text: String,
    #[serde(default)]
    left: f64,
    #[serde(default)]
    top: f64,
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
}

impl OcrSpaceResponse {
    fn error_text(&self) -> String {
        match &self.error_message {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join("; "),
            _ => "OCR.space processing failed".to_string(),
        }
    }

    fn into_result(self) -> Result<UnifiedOcrResult, OcrError> {
        if self.is_errored_on_processing {
            return Err(OcrError::ApiError(self.error_text()));
        }
        let message = self.error_text();
        let parsed = self
            .parsed_results
            .and_then(|results| results.into_iter().next())
            .ok_or(OcrError::ApiError(message))?;

        let words = parsed
            .text_overlay
            .map(|overlay| {
                overlay
                    .lines
                    .into_iter()
                    .flat_map(|line| line.words)
                    .filter(|w| !w.word_text.trim().is_empty())
                    .map(|w| OcrWord {
                        text: w.word_text,
                        confidence: OCR_SPACE_CONFIDENCE,
                        bbox: BoundingBox::new(w.left, w.top, w.width, w.height),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut result = UnifiedOcrResult::plain(
            OcrEngineKind::OcrSpace,
            parsed.parsed_text,
            OCR_SPACE_CONFIDENCE,
        );
        result.words = words;
        Ok(result)
    }
}

#[async_trait]
impl OcrWorker for OcrSpaceWorker {
    async fn recognize(
        &mut self,
        image_data: &[u8],
        language: &str,
    ) -> Result<UnifiedOcrResult, OcrError> {
        use base64::Engine;

        let image_base64 = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(image_data)
        );
        let engine = self.config.engine.to_string();

        let form = [
            ("apikey", self.config.api_key.as_str()),
            ("base64Image", image_base64.as_str()),
            ("language", language),
            ("isOverlayRequired", "true"),
            ("detectOrientation", "true"),
            ("scale", "true"),
            ("OCREngine", engine.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| OcrError::ApiError(format!("Failed to call OCR.space: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::ApiError(format!(
                "OCR.space returned {}: {}",
                status, body
            )));
        }

        let parsed: OcrSpaceResponse = response
            .json()
            .await
            .map_err(|e| OcrError::ApiError(format!("Failed to parse response: {}", e)))?;

        parsed.into_result()
    }

    async fn terminate(self: Box<Self>) -> Result<(), OcrError> {
        Ok(())
    }
}

/// Mock engine for testing
#[cfg(test)]
pub mod mock {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    /// Call counters shared between the engine and its workers
    #[derive(Debug, Default)]
    pub struct MockStats {
        pub workers_started: usize,
        pub workers_terminated: usize,
        pub recognize_calls: usize,
    }

    #[derive(Clone)]
    pub struct MockEngine {
        pub stats: Arc<Mutex<MockStats>>,
        /// Replies returned in call order; the last one repeats
        pub replies: Vec<(String, f64)>,
        /// 1-based call numbers that fail
        pub failing_calls: HashSet<usize>,
        pub delay: Option<Duration>,
        pub available: bool,
    }

    impl MockEngine {
        pub fn replying(replies: &[(&str, f64)]) -> Self {
            Self {
                stats: Arc::new(Mutex::new(MockStats::default())),
                replies: replies.iter().map(|(t, c)| (t.to_string(), *c)).collect(),
                failing_calls: HashSet::new(),
                delay: None,
                available: true,
            }
        }

        pub fn failing_on(mut self, calls: &[usize]) -> Self {
            self.failing_calls = calls.iter().copied().collect();
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn recognize_calls(&self) -> usize {
            self.stats.lock().recognize_calls
        }

        pub fn workers(&self) -> (usize, usize) {
            let stats = self.stats.lock();
            (stats.workers_started, stats.workers_terminated)
        }
    }

    #[async_trait]
    impl OcrEngine for MockEngine {
        fn kind(&self) -> OcrEngineKind {
            OcrEngineKind::Tesseract
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn start_worker(&self) -> Result<Box<dyn OcrWorker>, OcrError> {
            if !self.available {
                return Err(OcrError::ProviderNotAvailable("mock disabled".to_string()));
            }
            self.stats.lock().workers_started += 1;
            Ok(Box::new(MockWorker {
                engine: self.clone(),
            }))
        }
    }

    pub struct MockWorker {
        engine: MockEngine,
    }

    #[async_trait]
    impl OcrWorker for MockWorker {
        async fn recognize(
            &mut self,
            _image_data: &[u8],
            _language: &str,
        ) -> Result<UnifiedOcrResult, OcrError> {
            let call = {
                let mut stats = self.engine.stats.lock();
                stats.recognize_calls += 1;
                stats.recognize_calls
            };
            if let Some(delay) = self.engine.delay {
                tokio::time::sleep(delay).await;
            }
            if self.engine.failing_calls.contains(&call) {
                return Err(OcrError::ProcessingError(format!("simulated failure on call {}", call)));
            }
            let (text, confidence) = self
                .engine
                .replies
                .get(call - 1)
                .or_else(|| self.engine.replies.last())
                .cloned()
                .unwrap_or_default();
            Ok(UnifiedOcrResult::plain(OcrEngineKind::Tesseract, text, confidence))
        }

        async fn terminate(self: Box<Self>) -> Result<(), OcrError> {
            self.engine.stats.lock().workers_terminated += 1;
            Ok(())
        }
    }
}

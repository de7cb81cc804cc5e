//! Document input handling
//!
//! Turns an uploaded buffer into the 1-indexed page-image sequence consumed by
//! extraction. Images pass through as a single page; PDFs are rasterized.

use serde::Serialize;

use crate::error::{ExtractionError, Result};

/// Kind of uploaded document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Image,
    Pdf,
}

/// Raster formats accepted as page images
const ACCEPTED_IMAGE_FORMATS: &[image::ImageFormat] = &[
    image::ImageFormat::Jpeg,
    image::ImageFormat::Png,
    image::ImageFormat::WebP,
    image::ImageFormat::Bmp,
    image::ImageFormat::Tiff,
];

/// Detect the document kind from magic bytes
pub fn detect_kind(data: &[u8]) -> Result<DocumentKind> {
    if data.starts_with(b"%PDF") {
        return Ok(DocumentKind::Pdf);
    }
    match image::guess_format(data) {
        Ok(format) if ACCEPTED_IMAGE_FORMATS.contains(&format) => Ok(DocumentKind::Image),
        Ok(format) => Err(ExtractionError::InvalidInput(format!(
            "Invalid file type: {:?}",
            format
        ))),
        Err(_) => Err(ExtractionError::InvalidInput("Invalid file type".to_string())),
    }
}

/// Ordered page images of one uploaded document
#[derive(Debug, Clone)]
pub struct PageImages {
    pub kind: DocumentKind,
    /// Encoded page images, page 1 first
    pub pages: Vec<Vec<u8>>,
}

impl PageImages {
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Split an uploaded document into page images
pub async fn load_pages(data: Vec<u8>, render_scale: f32) -> Result<PageImages> {
    match detect_kind(&data)? {
        DocumentKind::Image => Ok(PageImages {
            kind: DocumentKind::Image,
            pages: vec![data],
        }),
        DocumentKind::Pdf => {
            tracing::info!("Converting PDF to images...");
            let pages = render_pdf(data, render_scale).await?;
            tracing::info!("PDF converted: {} pages", pages.len());
            Ok(PageImages {
                kind: DocumentKind::Pdf,
                pages,
            })
        }
    }
}

#[cfg(feature = "pdf")]
async fn render_pdf(data: Vec<u8>, render_scale: f32) -> Result<Vec<Vec<u8>>> {
    crate::pdf::PdfRasterizer::new(render_scale).render_all(data).await
}

#[cfg(not(feature = "pdf"))]
async fn render_pdf(_data: Vec<u8>, _render_scale: f32) -> Result<Vec<Vec<u8>>> {
    Err(ExtractionError::Configuration(
        "PDF support not enabled (build with the `pdf` feature)".to_string(),
    ))
}

//! PDF rasterization
//!
//! Renders every page of a PDF to PNG with MuPDF so template fields can be
//! cropped from page images.
//!
//! MuPDF documents are not thread-safe. Rendering happens on a blocking
//! thread, serialized by a process-wide lock, and the document never leaves
//! that thread.

use std::io::Cursor;

use image::DynamicImage;
use mupdf::{Colorspace, Document, Matrix};
use parking_lot::Mutex;

use crate::error::{ExtractionError, Result};

static MUPDF_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Page renderer for PDF uploads
#[derive(Debug, Clone, Copy)]
pub struct PdfRasterizer {
    scale: f32,
}

impl Default for PdfRasterizer {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl PdfRasterizer {
    pub fn new(scale: f32) -> Self {
        Self {
            scale: scale.clamp(0.1, 4.0),
        }
    }

    /// Render all pages, page 1 first. Any page failure fails the whole document.
    pub async fn render_all(&self, data: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        let scale = self.scale;
        tokio::task::spawn_blocking(move || {
            let _guard = MUPDF_LOCK.lock();
            render_pages(&data, scale)
        })
        .await
        .map_err(|e| ExtractionError::Document(format!("Task join error: {}", e)))?
    }
}

fn render_pages(data: &[u8], scale: f32) -> Result<Vec<Vec<u8>>> {
    let doc = Document::from_bytes(data, "application/pdf")
        .map_err(|e| ExtractionError::Document(format!("Failed to open PDF: {}", e)))?;
    let page_count = doc
        .page_count()
        .map_err(|e| ExtractionError::Document(format!("Failed to count pages: {}", e)))?;
    tracing::info!("PDF has {} pages", page_count);

    let matrix = Matrix::new_scale(scale, scale);
    let colorspace = Colorspace::device_rgb();
    let mut pages = Vec::with_capacity(page_count.max(0) as usize);

    for index in 0..page_count {
        let page_number = index + 1;
        let rendered = doc
            .load_page(index)
            .and_then(|page| page.to_pixmap(&matrix, &colorspace, false, true))
            .map_err(|e| {
                ExtractionError::Document(format!(
                    "Failed to convert PDF page {}: {}",
                    page_number, e
                ))
            })?;
        pages.push(encode_pixmap(&rendered)?);
        tracing::debug!("Page {}/{} converted to image", page_number, page_count);
    }

    Ok(pages)
}

fn encode_pixmap(pixmap: &mupdf::Pixmap) -> Result<Vec<u8>> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    let mut rgb_buffer = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let offset = (y * width as usize + x) * n;
            let r = samples.get(offset).copied().unwrap_or(0);
            let g = samples.get(offset + 1).copied().unwrap_or(0);
            let b = samples.get(offset + 2).copied().unwrap_or(0);
            rgb_buffer.extend_from_slice(&[r, g, b]);
        }
    }

    let img = image::RgbImage::from_raw(width, height, rgb_buffer)
        .ok_or_else(|| ExtractionError::Document("Failed to create image buffer".to_string()))?;

    let mut output = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut output), image::ImageFormat::Png)
        .map_err(|e| ExtractionError::Document(e.to_string()))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal two-page PDF
    fn two_page_pdf() -> Vec<u8> {
        b"%PDF-1.4
1 0 obj
<< /Type /Catalog /Pages 2 0 R >>
endobj
2 0 obj
<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>
endobj
3 0 obj
<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 100] /Resources << >> >>
endobj
4 0 obj
<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 100] /Resources << >> >>
endobj
trailer
<< /Size 5 /Root 1 0 R >>
%%EOF"
            .to_vec()
    }

    #[tokio::test]
    async fn test_render_all_pages() {
        let pages = PdfRasterizer::new(1.0).render_all(two_page_pdf()).await.unwrap();
        assert_eq!(pages.len(), 2);
        let first = image::load_from_memory(&pages[0]).unwrap();
        assert_eq!((first.width(), first.height()), (200, 100));
    }

    #[tokio::test]
    async fn test_garbage_is_document_error() {
        let result = PdfRasterizer::default().render_all(b"%PDF-garbage".to_vec()).await;
        assert!(matches!(result, Err(ExtractionError::Document(_))));
    }
}

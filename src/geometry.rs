//! Normalized-to-pixel region mapping

use serde::{Deserialize, Serialize};

use crate::error::{ExtractionError, Result};

/// Normalized rectangle (0-1 fractions of page width/height)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRegion {
    pub x_norm: f64,
    pub y_norm: f64,
    pub w_norm: f64,
    pub h_norm: f64,
}

/// Pixel-space rectangle, always inside the source image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelRegion {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl NormalizedRegion {
    pub fn new(x_norm: f64, y_norm: f64, w_norm: f64, h_norm: f64) -> Self {
        Self {
            x_norm,
            y_norm,
            w_norm,
            h_norm,
        }
    }

    /// Map to pixel coordinates for an image of `image_width` x `image_height`.
    ///
    /// Regions reaching past the image are clamped to its bounds. Returns `None`
    /// when the clamped region has no area.
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> Option<PixelRegion> {
        let (left, width) = clamp_axis(self.x_norm, self.w_norm, image_width)?;
        let (top, height) = clamp_axis(self.y_norm, self.h_norm, image_height)?;
        Some(PixelRegion {
            left,
            top,
            width,
            height,
        })
    }

    /// Like [`to_pixels`](Self::to_pixels), with an empty region as an error
    pub fn pixel_region(&self, image_width: u32, image_height: u32) -> Result<PixelRegion> {
        self.to_pixels(image_width, image_height).ok_or_else(|| {
            ExtractionError::InvalidRegion(format!(
                "({}, {}, {}, {}) is empty on a {}x{} image",
                self.x_norm, self.y_norm, self.w_norm, self.h_norm, image_width, image_height
            ))
        })
    }
}

/// Clamp one axis: `start = max(round(pos * extent), 0)`,
/// `len = min(round(size * extent), extent - start)`.
fn clamp_axis(pos: f64, size: f64, extent: u32) -> Option<(u32, u32)> {
    if !pos.is_finite() || !size.is_finite() || extent == 0 {
        return None;
    }
    let extent = extent as i64;
    let start = ((pos * extent as f64).round() as i64).max(0);
    let len = ((size * extent as f64).round() as i64).min(extent - start);
    if len <= 0 {
        return None;
    }
    Some((start as u32, len as u32))
}

impl PixelRegion {
    pub fn right(&self) -> u32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.top + self.height
    }
}

use image::RgbImage;

use crate::{
    error::{FidelityError, Result},
    image_utils::max_channel_delta,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelDiffResult {
    pub differing_pixels: u64,
    pub total_pixels: u64,
    pub percent: f64,
}

/// Counts pixels whose largest per-channel delta exceeds the fuzz threshold.
pub struct PixelDiffer {
    threshold: f64,
}

impl PixelDiffer {
    /// `fuzz` is a fraction of the channel range, e.g. `0.02` for 2 %.
    pub fn new(fuzz: f64) -> Self {
        Self {
            threshold: fuzz * 255.0,
        }
    }

    pub fn compute(&self, a: &RgbImage, b: &RgbImage) -> Result<PixelDiffResult> {
        if a.dimensions() != b.dimensions() {
            return Err(FidelityError::DimensionMismatch {
                design: a.dimensions(),
                implementation: b.dimensions(),
            });
        }

        let total_pixels = a.width() as u64 * a.height() as u64;
        let differing_pixels = a
            .pixels()
            .zip(b.pixels())
            .filter(|(pa, pb)| max_channel_delta(pa, pb) as f64 > self.threshold)
            .count() as u64;

        let percent = if total_pixels == 0 {
            0.0
        } else {
            differing_pixels as f64 / total_pixels as f64 * 100.0
        };

        Ok(PixelDiffResult {
            differing_pixels,
            total_pixels,
            percent,
        })
    }
}

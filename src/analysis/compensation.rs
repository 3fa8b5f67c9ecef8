use image::{Rgb, RgbImage};

use crate::{BoundingBox, image_utils::is_ink};

/// Removes a uniform colour shift from the implementation's ink pixels inside
/// each region, so that SSIM and pixel-diff see structure rather than hue.
///
/// The shift is the per-channel mean difference (design minus implementation)
/// over pixels that are ink in both images. Background pixels are left alone.
pub struct ColorCompensator {
    background: Rgb<u8>,
    ink_threshold: u8,
}

impl ColorCompensator {
    pub fn new(background: Rgb<u8>, ink_threshold: u8) -> Self {
        Self {
            background,
            ink_threshold,
        }
    }

    /// Per-channel offset to add to implementation ink, or `None` when the two
    /// crops share no ink pixels.
    pub fn offset(&self, design: &RgbImage, implementation: &RgbImage, bounds: &BoundingBox) -> Option<[f64; 3]> {
        let mut sums = [0i64; 3];
        let mut shared = 0i64;

        for y in bounds.y..bounds.bottom() {
            for x in bounds.x..bounds.right() {
                let d = design.get_pixel(x, y);
                let i = implementation.get_pixel(x, y);
                if self.is_ink(d) && self.is_ink(i) {
                    for c in 0..3 {
                        sums[c] += d[c] as i64 - i[c] as i64;
                    }
                    shared += 1;
                }
            }
        }

        (shared > 0).then(|| sums.map(|s| s as f64 / shared as f64))
    }

    /// Returns a copy of `implementation` with every region's ink shifted.
    pub fn compensate(&self, design: &RgbImage, implementation: &RgbImage, regions: &[BoundingBox]) -> RgbImage {
        let mut compensated = implementation.clone();

        for bounds in regions {
            let Some(offset) = self.offset(design, implementation, bounds) else {
                continue;
            };
            if offset.iter().all(|o| o.abs() < 0.5) {
                continue;
            }

            for y in bounds.y..bounds.bottom() {
                for x in bounds.x..bounds.right() {
                    let original = *implementation.get_pixel(x, y);
                    if !self.is_ink(&original) {
                        continue;
                    }
                    let shift = |c: usize| (original[c] as f64 + offset[c]).round().clamp(0.0, 255.0) as u8;
                    compensated.put_pixel(x, y, Rgb([shift(0), shift(1), shift(2)]));
                }
            }
        }

        compensated
    }

    fn is_ink(&self, pixel: &Rgb<u8>) -> bool {
        is_ink(pixel, &self.background, self.ink_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    fn rectangle(color: Rgb<u8>) -> RgbImage {
        let mut image = RgbImage::from_pixel(40, 20, WHITE);
        for y in 5..15 {
            for x in 10..30 {
                image.put_pixel(x, y, color);
            }
        }
        image
    }

    #[test]
    fn test_uniform_recolour_is_removed() {
        let design = rectangle(Rgb([0, 0, 0]));
        let implementation = rectangle(Rgb([26, 26, 26]));
        let region = BoundingBox::new(10, 5, 20, 10);

        let compensator = ColorCompensator::new(WHITE, 24);
        let offset = compensator.offset(&design, &implementation, &region).unwrap();
        assert_eq!(offset, [-26.0, -26.0, -26.0]);

        let compensated = compensator.compensate(&design, &implementation, &[region]);
        assert_eq!(compensated, design);
    }

    #[test]
    fn test_pixels_outside_regions_are_untouched() {
        let design = rectangle(Rgb([0, 0, 0]));
        let implementation = rectangle(Rgb([26, 26, 26]));
        let region = BoundingBox::new(10, 5, 10, 10);

        let compensated = ColorCompensator::new(WHITE, 24).compensate(&design, &implementation, &[region]);
        assert_eq!(compensated.get_pixel(12, 7), &Rgb([0, 0, 0]));
        assert_eq!(compensated.get_pixel(25, 7), &Rgb([26, 26, 26]));
        assert_eq!(compensated.get_pixel(0, 0), &WHITE);
    }

    #[test]
    fn test_no_shared_ink_means_no_offset() {
        let design = RgbImage::from_pixel(10, 10, WHITE);
        let implementation = rectangle(Rgb([0, 0, 0]));
        let region = BoundingBox::new(0, 0, 10, 10);

        let compensator = ColorCompensator::new(WHITE, 24);
        assert!(compensator.offset(&design, &implementation, &region).is_none());
    }
}

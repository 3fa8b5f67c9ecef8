use image::{DynamicImage, Rgb, RgbImage, imageops::{self, FilterType}};
use log::{debug, warn};

use crate::{
    cancel::CancellationToken,
    detection::{Category, Discrepancy, FixCategory, MeasuredValue, Severity, Signal},
    error::{FidelityError, Result},
    input::{Image, ImageSource},
};

/// Both images at the design's dimensions, plus the mismatch note if the
/// implementation had to be resized.
#[derive(Debug, Clone)]
pub struct NormalizedPair {
    pub design: Image,
    pub implementation: Image,
    pub original_implementation_size: (u32, u32),
    pub mismatch: Option<Discrepancy>,
}

impl NormalizedPair {
    pub fn dimensions(&self) -> (u32, u32) {
        self.design.dimensions()
    }

    pub fn was_resized(&self) -> bool {
        self.mismatch.is_some()
    }
}

pub struct ImageLoader;

impl ImageLoader {
    pub fn load(source: &ImageSource) -> Result<Image> {
        Self::load_with_cancel(source, &CancellationToken::new())
    }

    pub fn load_with_cancel(source: &ImageSource, cancel: &CancellationToken) -> Result<Image> {
        cancel.check()?;
        let name = source.name();

        let decoded = match source {
            ImageSource::Path(path) => {
                let bytes = std::fs::read(path)
                    .map_err(|e| FidelityError::image_load(&name, format!("unreadable: {e}")))?;
                Self::decode(&name, &bytes)?
            }
            ImageSource::Bytes { data, .. } => Self::decode(&name, data)?,
        };

        cancel.check()?;

        let color = decoded.color();
        let channels = color.channel_count();
        let bits_per_channel = (color.bits_per_pixel() / channels.max(1) as u16) as u8;
        let pixels = Self::flatten(&decoded);

        debug!(
            "loaded {} ({}x{}, {} channels, {} bit)",
            name,
            pixels.width(),
            pixels.height(),
            channels,
            bits_per_channel
        );

        Image::with_depth(pixels, channels, bits_per_channel, name)
    }

    fn decode(name: &str, bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(FidelityError::image_load(name, "input is empty"));
        }

        let image = image::load_from_memory(bytes)
            .map_err(|e| FidelityError::image_load(name, format!("corrupt or unsupported: {e}")))?;

        if image.width() == 0 || image.height() == 0 {
            return Err(FidelityError::image_load(name, "image has zero width or height"));
        }

        Ok(image)
    }

    /// Converts to 8-bit RGB, compositing any alpha channel over white.
    fn flatten(image: &DynamicImage) -> RgbImage {
        if !image.color().has_alpha() {
            return image.to_rgb8();
        }

        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut rgb = RgbImage::new(width, height);

        for (x, y, pixel) in rgba.enumerate_pixels() {
            let alpha = pixel[3] as f64 / 255.0;
            let blend = |c: u8| (c as f64 * alpha + 255.0 * (1.0 - alpha)).round().clamp(0.0, 255.0) as u8;
            rgb.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
        }

        rgb
    }

    /// Brings the implementation to the design's dimensions. A size mismatch is
    /// never fatal here; it becomes a High structural discrepancy instead.
    pub fn normalize(design: Image, implementation: Image) -> NormalizedPair {
        let (design_w, design_h) = design.dimensions();
        let (impl_w, impl_h) = implementation.dimensions();

        if (design_w, design_h) == (impl_w, impl_h) {
            return NormalizedPair {
                design,
                implementation,
                original_implementation_size: (impl_w, impl_h),
                mismatch: None,
            };
        }

        warn!(
            "implementation is {}x{} but design is {}x{}; resizing implementation",
            impl_w, impl_h, design_w, design_h
        );

        let resized = imageops::resize(implementation.pixels(), design_w, design_h, FilterType::Triangle);
        let delta = (design_w as f64 - impl_w as f64)
            .abs()
            .max((design_h as f64 - impl_h as f64).abs());

        let mismatch = Discrepancy {
            category: Category::Structure,
            signal: Signal::Dimensions,
            region: None,
            measured: MeasuredValue::Text(format!("{impl_w}x{impl_h}")),
            expected: MeasuredValue::Text(format!("{design_w}x{design_h}")),
            delta,
            severity: Severity::High,
            fix: FixCategory::MatchViewport,
            description: format!(
                "Implementation captured at {impl_w}x{impl_h}, design is {design_w}x{design_h}; compared after resizing"
            ),
        };

        let implementation = Image {
            pixels: resized,
            channels: implementation.channels,
            bits_per_channel: implementation.bits_per_channel,
            origin: implementation.origin,
        };

        NormalizedPair {
            design,
            implementation,
            original_implementation_size: (impl_w, impl_h),
            mismatch: Some(mismatch),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).expect("encode png");
        buffer.into_inner()
    }

    #[test]
    fn test_load_rejects_empty_and_corrupt_input() {
        let empty = ImageSource::bytes("empty.png", Vec::new());
        assert!(matches!(ImageLoader::load(&empty), Err(FidelityError::ImageLoad { .. })));

        let garbage = ImageSource::bytes("garbage.png", vec![0x13, 0x37, 0x00, 0x42]);
        assert!(matches!(ImageLoader::load(&garbage), Err(FidelityError::ImageLoad { .. })));
    }

    #[test]
    fn test_load_missing_file_is_image_load_error() {
        let missing = ImageSource::path("/definitely/not/here/design.png");
        assert!(matches!(ImageLoader::load(&missing), Err(FidelityError::ImageLoad { .. })));
    }

    #[test]
    fn test_load_composites_alpha_over_white() {
        let rgba = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        let source = ImageSource::bytes("transparent.png", png_bytes(&DynamicImage::ImageRgba8(rgba)));

        let image = ImageLoader::load(&source).expect("load");
        assert_eq!(image.channels(), 4);
        assert_eq!(image.pixels().get_pixel(1, 1), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_load_respects_cancellation() {
        let rgb = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));
        let source = ImageSource::bytes("ok.png", png_bytes(&DynamicImage::ImageRgb8(rgb)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            ImageLoader::load_with_cancel(&source, &cancel),
            Err(FidelityError::Cancelled)
        ));
    }

    #[test]
    fn test_normalize_resizes_and_records_mismatch() {
        let design = Image::from_rgb(RgbImage::from_pixel(40, 20, Rgb([255, 255, 255])), "design").unwrap();
        let implementation = Image::from_rgb(RgbImage::from_pixel(80, 40, Rgb([255, 255, 255])), "impl").unwrap();

        let pair = ImageLoader::normalize(design, implementation);
        assert_eq!(pair.implementation.dimensions(), (40, 20));
        assert_eq!(pair.original_implementation_size, (80, 40));

        let mismatch = pair.mismatch.expect("mismatch recorded");
        assert_eq!(mismatch.category, Category::Structure);
        assert_eq!(mismatch.severity, Severity::High);
        assert_eq!(mismatch.delta, 40.0);
    }

    #[test]
    fn test_normalize_same_size_is_untouched() {
        let design = Image::from_rgb(RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])), "design").unwrap();
        let implementation = Image::from_rgb(RgbImage::from_pixel(8, 8, Rgb([4, 5, 6])), "impl").unwrap();

        let pair = ImageLoader::normalize(design, implementation);
        assert!(!pair.was_resized());
        assert_eq!(pair.implementation.pixels().get_pixel(0, 0), &Rgb([4, 5, 6]));
    }
}

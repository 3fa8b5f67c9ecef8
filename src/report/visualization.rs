use std::path::Path;

use image::{GrayImage, Luma, Rgb, RgbImage, imageops};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::{
    BoundingBox, Comparison,
    detection::Severity,
    error::{FidelityError, Result},
    image_utils::max_channel_delta,
    input::loader::NormalizedPair,
};

/// Layout of the written diff image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffStyle {
    /// Heat map blended over the design.
    #[default]
    Overlay,
    /// Design, implementation and overlay in one strip.
    SideBySide,
}

#[derive(Debug, Clone)]
pub struct VisualizationConfig {
    pub style: DiffStyle,
    pub overlay_opacity: f32,
    pub border_thickness: u32,
    /// Draw every compared region, not only those with findings.
    pub show_regions: bool,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            style: DiffStyle::Overlay,
            overlay_opacity: 0.5,
            border_thickness: 2,
            show_regions: true,
        }
    }
}

const REGION_COLOR: Rgb<u8> = Rgb([128, 128, 128]);

pub struct Visualizer {
    config: VisualizationConfig,
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            config: VisualizationConfig::default(),
        }
    }

    pub fn with_config(config: VisualizationConfig) -> Self {
        Self { config }
    }

    /// Largest per-channel difference at every pixel.
    pub fn diff_map(&self, design: &RgbImage, implementation: &RgbImage) -> GrayImage {
        let (width, height) = design.dimensions();
        let mut map = GrayImage::new(width, height);

        for (x, y, pixel) in design.enumerate_pixels() {
            if x < implementation.width() && y < implementation.height() {
                let delta = max_channel_delta(pixel, implementation.get_pixel(x, y));
                map.put_pixel(x, y, Luma([delta]));
            }
        }

        map
    }

    pub fn create_heatmap(&self, gray: &GrayImage) -> RgbImage {
        let (width, height) = gray.dimensions();
        let mut heatmap = RgbImage::new(width, height);

        for (x, y, pixel) in gray.enumerate_pixels() {
            let intensity = pixel[0] as f32 / 255.0;
            heatmap.put_pixel(x, y, self.intensity_to_color(intensity));
        }

        heatmap
    }

    /// Blue (unchanged) through green and yellow to red (every channel off).
    fn intensity_to_color(&self, intensity: f32) -> Rgb<u8> {
        let t = intensity.clamp(0.0, 1.0) * 4.0;
        let (r, g, b) = match t {
            t if t < 1.0 => (0.0, t, 1.0),
            t if t < 2.0 => (0.0, 1.0, 2.0 - t),
            t if t < 3.0 => (t - 2.0, 1.0, 0.0),
            t => (1.0, 4.0 - t, 0.0),
        };
        Rgb([(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8])
    }

    pub fn overlay_heatmap(&self, original: &RgbImage, heatmap: &RgbImage) -> RgbImage {
        let (width, height) = original.dimensions();
        let mut result = RgbImage::new(width, height);
        let alpha = self.config.overlay_opacity;

        for (x, y, orig) in original.enumerate_pixels() {
            let heat = heatmap.get_pixel(
                x.min(heatmap.width().saturating_sub(1)),
                y.min(heatmap.height().saturating_sub(1)),
            );

            let blend = |c: usize| ((1.0 - alpha) * orig[c] as f32 + alpha * heat[c] as f32) as u8;
            result.put_pixel(x, y, Rgb([blend(0), blend(1), blend(2)]));
        }

        result
    }

    /// The diff image in the configured style. Needs a comparison made with
    /// `retain_images`.
    pub fn render(&self, comparison: &Comparison) -> Result<RgbImage> {
        let pair = comparison.images.as_ref().ok_or_else(|| {
            FidelityError::Configuration("comparison was made without retained images; nothing to render".into())
        })?;

        Ok(match self.config.style {
            DiffStyle::Overlay => self.render_overlay(pair, comparison),
            DiffStyle::SideBySide => self.create_comparison(pair, comparison),
        })
    }

    /// Difference heat map over the design, with compared regions outlined in
    /// grey and every located discrepancy outlined in its severity colour.
    fn render_overlay(&self, pair: &NormalizedPair, comparison: &Comparison) -> RgbImage {
        let design = pair.design.pixels();
        let implementation = pair.implementation.pixels();

        let heatmap = self.create_heatmap(&self.diff_map(design, implementation));
        let mut canvas = self.overlay_heatmap(design, &heatmap);

        if self.config.show_regions {
            for region in &comparison.regions {
                self.draw_border(&mut canvas, &region.bounds, REGION_COLOR);
            }
        }

        let mut located = comparison
            .discrepancies
            .iter()
            .filter_map(|d| d.region.as_ref().map(|r| (d.severity, r.bounds)))
            .collect::<Vec<_>>();
        // Worst findings are drawn last so they stay on top.
        located.sort_by_key(|(severity, _)| *severity);
        for (severity, bounds) in located {
            self.draw_border(&mut canvas, &bounds, severity_color(severity));
        }

        canvas
    }

    /// Design, implementation and overlay side by side.
    fn create_comparison(&self, pair: &NormalizedPair, comparison: &Comparison) -> RgbImage {
        let design = pair.design.pixels();
        let implementation = pair.implementation.pixels();
        let diff = self.render_overlay(pair, comparison);
        let panels = [design, implementation, &diff];

        let padding = 10u32;
        let (width, height) = design.dimensions();
        let total_width = width * panels.len() as u32 + padding * (panels.len() as u32 + 1);
        let total_height = height + padding * 2;

        let mut result = RgbImage::from_pixel(total_width, total_height, Rgb([40, 40, 40]));
        let mut x_offset = padding;
        for panel in panels {
            imageops::overlay(&mut result, panel, x_offset as i64, padding as i64);
            x_offset += width + padding;
        }

        result
    }

    pub fn save<P: AsRef<Path>>(&self, comparison: &Comparison, path: P) -> Result<()> {
        self.render(comparison)?.save(path)?;
        Ok(())
    }

    fn draw_border(&self, image: &mut RgbImage, bounds: &BoundingBox, color: Rgb<u8>) {
        if bounds.width == 0 || bounds.height == 0 {
            return;
        }

        for t in 0..self.config.border_thickness {
            let x = bounds.x as i32 - t as i32;
            let y = bounds.y as i32 - t as i32;
            let rect = Rect::at(x, y).of_size(bounds.width + 2 * t, bounds.height + 2 * t);
            draw_hollow_rect_mut(image, rect, color);
        }
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

pub fn severity_color(severity: Severity) -> Rgb<u8> {
    match severity {
        Severity::None => Rgb([0, 200, 0]),
        Severity::Low => Rgb([255, 220, 0]),
        Severity::Medium => Rgb([255, 140, 0]),
        Severity::High => Rgb([220, 0, 0]),
    }
}

use std::{collections::BTreeMap, time::Instant};

use image::RgbImage;
use log::{debug, warn};
use rayon::prelude::*;

use crate::{
    MetricResult, RegionMetrics,
    analysis::{
        MetricConfig,
        color::delta_e_srgb,
        compensation::ColorCompensator,
        phash::PerceptualHasher,
        pixel_diff::PixelDiffer,
        segmentation::{Region, Segmentation},
        ssim::SsimCalculator,
    },
    error::{FidelityError, Result},
    image_utils::{content_bounds, crop, mean_color},
    input::loader::NormalizedPair,
};

pub const IMAGE_SAMPLE: &str = "image";

struct GlobalMetrics {
    ssim: f64,
    pixel_diff_percent: f64,
    color_delta_e: BTreeMap<String, f64>,
}

impl GlobalMetrics {
    fn into_result(self, phash_distance: u32, short_circuited: bool) -> MetricResult {
        MetricResult {
            ssim: self.ssim,
            pixel_diff_percent: self.pixel_diff_percent,
            phash_distance,
            color_delta_e: self.color_delta_e,
            global_ssim: self.ssim,
            global_pixel_diff_percent: self.pixel_diff_percent,
            regions: Vec::new(),
            short_circuited,
        }
    }
}

pub struct MetricEngine {
    config: MetricConfig,
    ssim: SsimCalculator,
    differ: PixelDiffer,
    hasher: PerceptualHasher,
}

impl MetricEngine {
    pub fn new() -> Self {
        Self::with_config(MetricConfig::default())
    }

    pub fn with_config(config: MetricConfig) -> Self {
        Self {
            ssim: SsimCalculator::new(config.ssim_window, config.ssim_k1, config.ssim_k2),
            differ: PixelDiffer::new(config.pixel_fuzz),
            hasher: PerceptualHasher::new(),
            config,
        }
    }

    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    /// Whole-image comparison without regions or colour compensation.
    pub fn compare(&self, design: &RgbImage, implementation: &RgbImage) -> Result<MetricResult> {
        Self::check_dimensions(design, implementation)?;
        let phash_distance = self.hasher.distance(design, implementation);
        let global = self.measure_global(design, implementation, implementation)?;
        Ok(global.into_result(phash_distance, false))
    }

    /// Whole image plus every region of the segmentation. Headline SSIM is the
    /// worst of the global and regional values, headline pixel-diff likewise.
    pub fn compare_regions(&self, pair: &NormalizedPair, segmentation: &Segmentation) -> Result<MetricResult> {
        let start = Instant::now();
        let design = pair.design.pixels();
        let implementation = pair.implementation.pixels();
        Self::check_dimensions(design, implementation)?;

        let phash_distance = self.hasher.distance(design, implementation);
        if phash_distance > self.config.gross_mismatch_distance && self.config.short_circuit_on_gross_mismatch {
            warn!(
                "perceptual hash distance {} exceeds {}; skipping region analysis",
                phash_distance, self.config.gross_mismatch_distance
            );
            let global = self.measure_global(design, implementation, implementation)?;
            return Ok(global.into_result(phash_distance, true));
        }

        let bounds = segmentation.bounds();
        let compensated;
        let structural = if self.config.color_compensation && !bounds.is_empty() {
            compensated = ColorCompensator::new(segmentation.background, segmentation.ink_threshold)
                .compensate(design, implementation, &bounds);
            &compensated
        } else {
            implementation
        };

        let (global, regions) = self.join(
            || self.measure_global(design, implementation, structural),
            || self.measure_regions(structural, segmentation),
        );
        let global = global?;
        let regions = regions?;

        let ssim = regions.iter().map(|r| r.ssim).fold(global.ssim, f64::min);
        let pixel_diff_percent = regions
            .iter()
            .map(|r| r.pixel_diff_percent)
            .fold(global.pixel_diff_percent, f64::max);

        let mut color_delta_e = global.color_delta_e;
        for region in &regions {
            color_delta_e.insert(region.sample_id.clone(), region.delta_e);
        }

        debug!(
            "compared {}x{} with {} regions in {:?}: ssim {:.4}, pixel diff {:.2}%, phash {}",
            design.width(),
            design.height(),
            regions.len(),
            start.elapsed(),
            ssim,
            pixel_diff_percent,
            phash_distance
        );

        Ok(MetricResult {
            ssim,
            pixel_diff_percent,
            phash_distance,
            color_delta_e,
            global_ssim: global.ssim,
            global_pixel_diff_percent: global.pixel_diff_percent,
            regions,
            short_circuited: false,
        })
    }

    /// `raw` feeds colour sampling; `structural` (possibly colour
    /// compensated) feeds SSIM and pixel-diff. Callers hash the raw pair once
    /// themselves.
    fn measure_global(
        &self,
        design: &RgbImage,
        raw: &RgbImage,
        structural: &RgbImage,
    ) -> Result<GlobalMetrics> {
        let ((ssim, diff), color_delta_e) = self.join(
            || {
                self.join(
                    || self.ssim.compute(design, structural),
                    || self.differ.compute(design, structural),
                )
            },
            || self.sample_colors(design, raw),
        );

        Ok(GlobalMetrics {
            ssim: ssim?,
            pixel_diff_percent: diff?.percent,
            color_delta_e,
        })
    }

    fn measure_regions(&self, structural: &RgbImage, segmentation: &Segmentation) -> Result<Vec<RegionMetrics>> {
        let measure = |(index, region): (usize, &Region)| self.measure_region(index, region, structural, segmentation);

        if self.config.parallel {
            segmentation.regions.par_iter().enumerate().map(measure).collect()
        } else {
            segmentation.regions.iter().enumerate().map(measure).collect()
        }
    }

    fn measure_region(
        &self,
        index: usize,
        region: &Region,
        structural: &RgbImage,
        segmentation: &Segmentation,
    ) -> Result<RegionMetrics> {
        let bounds = region.bounds();
        let compensated = crop(structural, &bounds);

        let ssim = self.ssim.compute(region.design(), &compensated)?;
        let diff = self.differ.compute(region.design(), &compensated)?;
        let delta_e = delta_e_srgb(mean_color(region.design()), mean_color(region.implementation()));

        let background = &segmentation.background;
        let threshold = segmentation.ink_threshold;

        Ok(RegionMetrics {
            sample_id: format!("region[{index}]:{}", region.label()),
            label: region.label().to_string(),
            bounds,
            ssim,
            pixel_diff_percent: diff.percent,
            delta_e,
            design_content: content_bounds(region.design(), background, threshold),
            implementation_content: content_bounds(region.implementation(), background, threshold),
        })
    }

    fn sample_colors(&self, design: &RgbImage, implementation: &RgbImage) -> BTreeMap<String, f64> {
        let mut samples = BTreeMap::new();
        samples.insert(
            IMAGE_SAMPLE.to_string(),
            delta_e_srgb(mean_color(design), mean_color(implementation)),
        );

        for sample in &self.config.samples {
            if sample.x >= design.width() || sample.y >= design.height() {
                warn!(
                    "colour sample '{}' at ({}, {}) is outside the image; ignored",
                    sample.id, sample.x, sample.y
                );
                continue;
            }

            let to_f64 = |p: &image::Rgb<u8>| [p[0] as f64, p[1] as f64, p[2] as f64];
            let expected = to_f64(design.get_pixel(sample.x, sample.y));
            let measured = to_f64(implementation.get_pixel(sample.x, sample.y));
            samples.insert(sample.id.clone(), delta_e_srgb(expected, measured));
        }

        samples
    }

    fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        if self.config.parallel {
            rayon::join(a, b)
        } else {
            (a(), b())
        }
    }

    fn check_dimensions(design: &RgbImage, implementation: &RgbImage) -> Result<()> {
        if design.dimensions() != implementation.dimensions() {
            return Err(FidelityError::DimensionMismatch {
                design: design.dimensions(),
                implementation: implementation.dimensions(),
            });
        }
        Ok(())
    }
}

impl Default for MetricEngine {
    fn default() -> Self {
        Self::new()
    }
}

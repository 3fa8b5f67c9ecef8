use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{
        metrics::MetricEngine,
        segmentation::{Region, RegionSegmenter, RegionSource},
    },
    cancel::CancellationToken,
    config::FidelityConfig,
    detection::{Discrepancy, RegionRef, classifier::DiscrepancyClassifier},
    error::{FidelityError, Result},
    input::{
        Image, ImageSource,
        layout::{LayoutMetadata, RegionSpec},
        loader::{ImageLoader, NormalizedPair},
    },
    iteration::{IterationController, IterationDecision, IterationState},
    scoring::{FidelityScore, FidelityScorer},
};

pub mod analysis;
pub mod cancel;
pub mod config;
pub mod detection;
pub mod error;
pub mod image_utils;
pub mod input;
pub mod iteration;
pub mod report;
pub mod scoring;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// True when the boxes share at least one pixel or touch along an edge.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.x <= other.right() && other.x <= self.right() && self.y <= other.bottom() && other.y <= self.bottom()
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let x2 = self.right().max(other.right());
        let y2 = self.bottom().max(other.bottom());

        BoundingBox::new(x, y, x2 - x, y2 - y)
    }

    /// Trims the box to a `width` x `height` image. `None` if nothing is left.
    pub fn clamp(&self, width: u32, height: u32) -> Option<BoundingBox> {
        if self.x >= width || self.y >= height || self.width == 0 || self.height == 0 {
            return None;
        }

        Some(BoundingBox::new(
            self.x,
            self.y,
            self.right().min(width) - self.x,
            self.bottom().min(height) - self.y,
        ))
    }

    pub fn offset(&self, dx: u32, dy: u32) -> BoundingBox {
        BoundingBox::new(self.x.saturating_add(dx), self.y.saturating_add(dy), self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionMetrics {
    /// Key of this region's average-colour entry in `MetricResult::color_delta_e`.
    pub sample_id: String,
    pub label: String,
    pub bounds: BoundingBox,
    pub ssim: f64,
    pub pixel_diff_percent: f64,
    pub delta_e: f64,
    /// Ink bounds inside the design crop, relative to the region origin.
    pub design_content: Option<BoundingBox>,
    pub implementation_content: Option<BoundingBox>,
}

impl RegionMetrics {
    pub fn to_ref(&self) -> RegionRef {
        RegionRef {
            label: self.label.clone(),
            bounds: self.bounds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub ssim: f64,
    pub pixel_diff_percent: f64,
    pub phash_distance: u32,
    pub color_delta_e: BTreeMap<String, f64>,
    pub global_ssim: f64,
    pub global_pixel_diff_percent: f64,
    pub regions: Vec<RegionMetrics>,
    #[serde(default)]
    pub short_circuited: bool,
}

/// Optional structured inputs that accompany an image pair.
#[derive(Debug, Clone, Default)]
pub struct ComparisonInputs {
    pub regions: Option<Vec<RegionSpec>>,
    pub layout: Option<LayoutMetadata>,
    /// Keep the normalized pixels on the `Comparison`, e.g. to render a diff.
    pub retain_images: bool,
}

#[derive(Debug, Clone)]
pub struct Comparison {
    /// Present only when `ComparisonInputs::retain_images` was set. Region
    /// crops are always released once metrics are computed.
    pub images: Option<NormalizedPair>,
    pub regions: Vec<RegionRef>,
    pub region_source: RegionSource,
    pub metrics: MetricResult,
    pub discrepancies: Vec<Discrepancy>,
    pub score: FidelityScore,
}

#[derive(Debug, Clone)]
pub struct IterationOutcome {
    pub comparison: Comparison,
    pub decision: IterationDecision,
}

/// Loader, segmenter, metric engine, classifier and scorer wired together
/// from one validated configuration.
pub struct FidelityEngine {
    config: FidelityConfig,
    segmenter: RegionSegmenter,
    metrics: MetricEngine,
    classifier: DiscrepancyClassifier,
    scorer: FidelityScorer,
}

impl FidelityEngine {
    pub fn new() -> Result<Self> {
        Self::with_config(FidelityConfig::default())
    }

    pub fn with_config(config: FidelityConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            segmenter: RegionSegmenter::with_config(config.segmentation.clone()),
            metrics: MetricEngine::with_config(config.metrics.clone()),
            classifier: DiscrepancyClassifier::new(config.thresholds.clone())
                .with_gross_mismatch_distance(config.metrics.gross_mismatch_distance),
            scorer: FidelityScorer::new(config.weights.clone(), config.thresholds.clone())?,
            config,
        })
    }

    pub fn config(&self) -> &FidelityConfig {
        &self.config
    }

    pub fn compare_sources(
        &self,
        design: &ImageSource,
        implementation: &ImageSource,
        inputs: &ComparisonInputs,
        cancel: &CancellationToken,
    ) -> Result<Comparison> {
        let design = ImageLoader::load_with_cancel(design, cancel)?;
        let implementation = ImageLoader::load_with_cancel(implementation, cancel)?;
        self.compare_images(design, implementation, inputs, cancel)
    }

    pub fn compare_images(
        &self,
        design: Image,
        implementation: Image,
        inputs: &ComparisonInputs,
        cancel: &CancellationToken,
    ) -> Result<Comparison> {
        let pair = ImageLoader::normalize(design, implementation);
        let segmentation = self
            .segmenter
            .segment(&pair, inputs.regions.as_deref(), inputs.layout.as_ref(), cancel)?;
        cancel.check()?;

        let metrics = self.metrics.compare_regions(&pair, &segmentation)?;
        let mut discrepancies = self
            .classifier
            .classify(&metrics, Some(&segmentation), inputs.layout.as_ref());
        if let Some(mismatch) = &pair.mismatch {
            discrepancies.insert(0, mismatch.clone());
        }

        let score = self.scorer.score(&metrics, &discrepancies);
        debug!(
            "comparison scored {} with {} discrepancies",
            score.total,
            discrepancies.len()
        );

        Ok(Comparison {
            images: inputs.retain_images.then_some(pair),
            regions: segmentation.regions.iter().map(Region::to_ref).collect(),
            region_source: segmentation.source,
            metrics,
            discrepancies,
            score,
        })
    }

    pub fn controller(&self) -> Result<IterationController> {
        IterationController::new(self.config.iteration.clone(), self.config.weights.clone())
    }

    pub fn resume_controller(&self, state: IterationState) -> Result<IterationController> {
        IterationController::resume(self.config.iteration.clone(), self.config.weights.clone(), state)
    }

    /// One refinement attempt. A failed or cancelled comparison leaves the
    /// controller's history untouched.
    pub fn run_iteration(
        &self,
        controller: &mut IterationController,
        design: &ImageSource,
        implementation: &ImageSource,
        inputs: &ComparisonInputs,
        cancel: &CancellationToken,
    ) -> Result<IterationOutcome> {
        if controller.status().is_terminal() {
            return Err(FidelityError::IterationClosed(controller.status()));
        }

        let mut comparison = self.compare_sources(design, implementation, inputs, cancel)?;
        cancel.check()?;

        let decision = controller.record(comparison.score.clone(), &comparison.discrepancies)?;
        if let Some(stamped) = controller.state().latest() {
            comparison.score = stamped.clone();
        }

        Ok(IterationOutcome { comparison, decision })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_geometry() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(10, 0, 5, 5);
        let c = BoundingBox::new(30, 30, 5, 5);

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert_eq!(a.union(&b), BoundingBox::new(0, 0, 15, 10));
        assert_eq!(a.area(), 100);

        assert_eq!(BoundingBox::new(8, 8, 10, 10).clamp(12, 10), Some(BoundingBox::new(8, 8, 4, 2)));
        assert_eq!(BoundingBox::new(12, 0, 1, 1).clamp(12, 10), None);
    }

    #[test]
    fn test_images_are_released_unless_retained() {
        let engine = FidelityEngine::new().unwrap();
        let scene = || {
            let mut pixels = image::RgbImage::from_pixel(60, 40, image::Rgb([255, 255, 255]));
            for y in 10..20 {
                for x in 10..30 {
                    pixels.put_pixel(x, y, image::Rgb([0, 0, 0]));
                }
            }
            Image::from_rgb(pixels, "scene").unwrap()
        };
        let cancel = CancellationToken::new();

        let released = engine
            .compare_images(scene(), scene(), &ComparisonInputs::default(), &cancel)
            .unwrap();
        assert!(released.images.is_none());
        assert_eq!(released.regions.len(), 1);
        assert_eq!(released.regions[0].bounds, BoundingBox::new(10, 10, 20, 10));
        assert_eq!(released.region_source, RegionSource::AutoDetected);

        let inputs = ComparisonInputs {
            retain_images: true,
            ..Default::default()
        };
        let retained = engine.compare_images(scene(), scene(), &inputs, &cancel).unwrap();
        assert_eq!(retained.images.map(|pair| pair.dimensions()), Some((60, 40)));
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        let mut config = FidelityConfig::default();
        config.weights.color = 0;
        assert!(matches!(FidelityEngine::with_config(config), Err(FidelityError::Configuration(_))));
    }
}

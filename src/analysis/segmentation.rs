use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::{
    distance_transform::Norm,
    morphology::dilate,
    region_labelling::{Connectivity, connected_components},
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    BoundingBox,
    cancel::CancellationToken,
    detection::RegionRef,
    error::{FidelityError, Result},
    image_utils::{crop, dominant_border_color, ink_mask},
    input::{
        layout::{LayoutMetadata, RegionSpec},
        loader::NormalizedPair,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub auto_detect: bool,
    /// Largest per-channel distance from the background still counted as background.
    pub ink_threshold: u8,
    /// Ink closer than this many pixels is grouped into one region.
    pub merge_gap: u32,
    pub min_region_area: u64,
    pub max_auto_regions: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            auto_detect: true,
            ink_threshold: 24,
            merge_gap: 4,
            min_region_area: 16,
            max_auto_regions: 32,
        }
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.merge_gap > 255 {
            return Err(FidelityError::Configuration(
                "segmentation merge_gap must be at most 255".into(),
            ));
        }
        if self.max_auto_regions == 0 && self.auto_detect {
            return Err(FidelityError::Configuration(
                "max_auto_regions must be at least 1 when auto_detect is enabled".into(),
            ));
        }
        Ok(())
    }
}

/// A comparable sub-area with its pixels cropped from both images.
#[derive(Debug, Clone)]
pub struct Region {
    label: String,
    bounds: BoundingBox,
    design: RgbImage,
    implementation: RgbImage,
}

impl Region {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn design(&self) -> &RgbImage {
        &self.design
    }

    pub fn implementation(&self) -> &RgbImage {
        &self.implementation
    }

    pub fn to_ref(&self) -> RegionRef {
        RegionRef {
            label: self.label.clone(),
            bounds: self.bounds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionSource {
    Supplied,
    Layout,
    AutoDetected,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRegion {
    pub spec: RegionSpec,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Segmentation {
    pub regions: Vec<Region>,
    pub skipped: Vec<SkippedRegion>,
    pub background: Rgb<u8>,
    pub ink_threshold: u8,
    pub source: RegionSource,
}

impl Segmentation {
    pub fn bounds(&self) -> Vec<BoundingBox> {
        self.regions.iter().map(Region::bounds).collect()
    }
}

pub struct RegionSegmenter {
    config: SegmentationConfig,
}

impl RegionSegmenter {
    pub fn new() -> Self {
        Self::with_config(SegmentationConfig::default())
    }

    pub fn with_config(config: SegmentationConfig) -> Self {
        Self { config }
    }

    /// Splits the pair into regions. Explicit boxes win over layout element
    /// boxes, which win over auto-detection.
    pub fn segment(
        &self,
        pair: &NormalizedPair,
        supplied: Option<&[RegionSpec]>,
        layout: Option<&LayoutMetadata>,
        cancel: &CancellationToken,
    ) -> Result<Segmentation> {
        let design = pair.design.pixels();
        let implementation = pair.implementation.pixels();
        let background = dominant_border_color(design);

        let layout_specs = layout.map(LayoutMetadata::region_specs).unwrap_or_default();

        let (specs, source) = match supplied {
            Some(specs) if !specs.is_empty() => (specs.to_vec(), RegionSource::Supplied),
            _ if !layout_specs.is_empty() => (layout_specs, RegionSource::Layout),
            _ if self.config.auto_detect => {
                let specs = self
                    .detect(design, implementation, &background)
                    .into_iter()
                    .enumerate()
                    .map(|(i, b)| RegionSpec::new(format!("auto-{i}"), b.x, b.y, b.width, b.height))
                    .collect();
                (specs, RegionSource::AutoDetected)
            }
            _ => (Vec::new(), RegionSource::None),
        };

        let (width, height) = pair.dimensions();
        let mut regions = Vec::with_capacity(specs.len());
        let mut skipped = Vec::new();

        for (i, spec) in specs.into_iter().enumerate() {
            cancel.check()?;

            let label = if spec.label.is_empty() {
                format!("region-{i}")
            } else {
                spec.label.clone()
            };

            match Self::resolve(&label, &spec, width, height) {
                Ok(bounds) => regions.push(Region {
                    label,
                    bounds,
                    design: crop(design, &bounds),
                    implementation: crop(implementation, &bounds),
                }),
                Err(FidelityError::InvalidRegion { reason, .. }) => {
                    warn!("skipping region '{}': {}", label, reason);
                    skipped.push(SkippedRegion {
                        spec: RegionSpec { label, ..spec },
                        reason,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            "segmented {}x{} into {} regions ({:?}), {} skipped",
            width,
            height,
            regions.len(),
            source,
            skipped.len()
        );

        Ok(Segmentation {
            regions,
            skipped,
            background,
            ink_threshold: self.config.ink_threshold,
            source,
        })
    }

    /// Clamps a box to the image. Zero-area boxes and boxes entirely outside
    /// the image are rejected.
    pub fn resolve(label: &str, spec: &RegionSpec, width: u32, height: u32) -> Result<BoundingBox> {
        if spec.width == 0 || spec.height == 0 {
            return Err(FidelityError::invalid_region(label, "box has zero area"));
        }

        spec.bounds().clamp(width, height).ok_or_else(|| {
            FidelityError::invalid_region(
                label,
                format!(
                    "box at ({}, {}) lies outside the {}x{} image",
                    spec.x, spec.y, width, height
                ),
            )
        })
    }

    /// Best-effort element boxes from ink present in either image.
    pub fn detect(&self, design: &RgbImage, implementation: &RgbImage, background: &Rgb<u8>) -> Vec<BoundingBox> {
        let threshold = self.config.ink_threshold;
        let mut ink = ink_mask(design, background, threshold);
        let implementation_ink = ink_mask(implementation, background, threshold);
        for (a, b) in ink.pixels_mut().zip(implementation_ink.pixels()) {
            a.0[0] = a.0[0].max(b.0[0]);
        }

        let grouped = if self.config.merge_gap > 0 {
            dilate(&ink, Norm::LInf, self.config.merge_gap.min(255) as u8)
        } else {
            ink.clone()
        };

        let boxes = Self::component_boxes(&ink, &grouped);
        let mut boxes = merge_overlapping(boxes)
            .into_iter()
            .filter(|b| b.area() >= self.config.min_region_area)
            .collect::<Vec<_>>();

        boxes.sort_by(|a, b| b.area().cmp(&a.area()).then_with(|| (a.y, a.x).cmp(&(b.y, b.x))));
        boxes.truncate(self.config.max_auto_regions);
        boxes.sort_by_key(|b| (b.y, b.x));
        boxes
    }

    /// Tight boxes around the original ink of each dilated component.
    fn component_boxes(ink: &GrayImage, grouped: &GrayImage) -> Vec<BoundingBox> {
        let labels = connected_components(grouped, Connectivity::Eight, Luma([0u8]));
        let count = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;

        let mut extents: Vec<Option<(u32, u32, u32, u32)>> = vec![None; count + 1];
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label.0[0] as usize;
            if label == 0 || ink.get_pixel(x, y).0[0] == 0 {
                continue;
            }
            let extent = extents[label].get_or_insert((x, y, x, y));
            extent.0 = extent.0.min(x);
            extent.1 = extent.1.min(y);
            extent.2 = extent.2.max(x);
            extent.3 = extent.3.max(y);
        }

        extents
            .into_iter()
            .flatten()
            .map(|(x0, y0, x1, y1)| BoundingBox::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1))
            .collect()
    }
}

impl Default for RegionSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

/// Repeatedly unions overlapping boxes until none overlap.
fn merge_overlapping(boxes: Vec<BoundingBox>) -> Vec<BoundingBox> {
    if boxes.is_empty() {
        return boxes;
    }

    let mut merged = Vec::new();
    let mut used = vec![false; boxes.len()];

    for i in 0..boxes.len() {
        if used[i] {
            continue;
        }

        let mut current = boxes[i];
        used[i] = true;

        loop {
            let mut found = false;
            for j in 0..boxes.len() {
                if used[j] {
                    continue;
                }

                if current.overlaps(&boxes[j]) {
                    current = current.union(&boxes[j]);
                    used[j] = true;
                    found = true;
                }
            }

            if !found {
                break;
            }
        }

        merged.push(current);
    }

    merged
}

use crate::{
    BoundingBox, MetricResult, RegionMetrics,
    analysis::segmentation::Segmentation,
    detection::{
        Category, Discrepancy, FixCategory, MeasuredValue, RegionRef, Severity, Signal,
        thresholds::{SeverityThresholds, Tiers},
    },
    input::layout::{EffectSpec, FontSpec, LayoutElement, LayoutMetadata},
};

/// What a numeric finding is about; the rest of the discrepancy is filled in
/// per measurement.
#[derive(Clone, Copy)]
struct Finding {
    category: Category,
    signal: Signal,
    fix: FixCategory,
}

impl Finding {
    const fn new(category: Category, signal: Signal, fix: FixCategory) -> Self {
        Self { category, signal, fix }
    }

    fn numeric(
        self,
        region: Option<RegionRef>,
        measured: f64,
        expected: f64,
        severity: Severity,
        description: String,
    ) -> Discrepancy {
        Discrepancy {
            category: self.category,
            signal: self.signal,
            region,
            measured: MeasuredValue::Number(measured),
            expected: MeasuredValue::Number(expected),
            delta: measured - expected,
            severity,
            fix: self.fix,
            description,
        }
    }
}

const GLOBAL_SSIM: Finding = Finding::new(Category::Structure, Signal::Ssim, FixCategory::RestructureLayout);
const GLOBAL_PIXEL_DIFF: Finding = Finding::new(Category::Structure, Signal::PixelDiff, FixCategory::RestructureLayout);
const REGION_SSIM: Finding = Finding::new(Category::Structure, Signal::Ssim, FixCategory::ReviewRegion);
const REGION_PIXEL_DIFF: Finding = Finding::new(Category::Structure, Signal::PixelDiff, FixCategory::ReviewRegion);
const COLOR: Finding = Finding::new(Category::Color, Signal::DeltaE, FixCategory::AdjustColor);
const FONT_SIZE: Finding = Finding::new(Category::Typography, Signal::FontSize, FixCategory::AdjustTypography);
const FONT_WEIGHT: Finding = Finding::new(Category::Typography, Signal::FontWeight, FixCategory::AdjustTypography);
const LINE_HEIGHT: Finding = Finding::new(Category::Typography, Signal::LineHeight, FixCategory::AdjustTypography);
const CORNER_RADIUS: Finding = Finding::new(Category::Effects, Signal::CornerRadius, FixCategory::AdjustEffects);
const SHADOW_BLUR: Finding = Finding::new(Category::Effects, Signal::ShadowBlur, FixCategory::AdjustEffects);
const OPACITY: Finding = Finding::new(Category::Effects, Signal::Opacity, FixCategory::AdjustEffects);

/// Turns raw metrics and layout deltas into severity-ranked discrepancies.
/// Only findings above `Severity::None` are returned.
pub struct DiscrepancyClassifier {
    thresholds: SeverityThresholds,
    gross_mismatch_distance: u32,
}

impl DiscrepancyClassifier {
    pub fn new(thresholds: SeverityThresholds) -> Self {
        Self {
            thresholds,
            gross_mismatch_distance: 24,
        }
    }

    pub fn with_gross_mismatch_distance(mut self, distance: u32) -> Self {
        self.gross_mismatch_distance = distance;
        self
    }

    pub fn thresholds(&self) -> &SeverityThresholds {
        &self.thresholds
    }

    pub fn classify(
        &self,
        metrics: &MetricResult,
        segmentation: Option<&Segmentation>,
        layout: Option<&LayoutMetadata>,
    ) -> Vec<Discrepancy> {
        let mut found = Vec::new();

        self.classify_global(metrics, &mut found);
        for region in &metrics.regions {
            self.classify_region(region, &mut found);
        }
        self.classify_colors(metrics, &mut found);

        if let Some(layout) = layout {
            for element in &layout.elements {
                self.classify_element(element, &mut found);
            }
        }

        if let Some(segmentation) = segmentation {
            for skipped in &segmentation.skipped {
                found.push(Discrepancy {
                    category: Category::Structure,
                    signal: Signal::RegionSkipped,
                    region: None,
                    measured: MeasuredValue::Box(skipped.spec.bounds()),
                    expected: MeasuredValue::Text("non-empty box within the image".into()),
                    delta: 0.0,
                    severity: Severity::Medium,
                    fix: FixCategory::ReviewRegion,
                    description: format!("Region '{}' skipped: {}", skipped.spec.label, skipped.reason),
                });
            }
        }

        found.retain(|d| d.severity > Severity::None);
        found.sort_by(|a, b| b.severity.cmp(&a.severity));
        found
    }

    fn classify_global(&self, metrics: &MetricResult, found: &mut Vec<Discrepancy>) {
        if metrics.phash_distance > self.gross_mismatch_distance {
            let distance = metrics.phash_distance as f64;
            found.push(
                Finding::new(Category::Structure, Signal::PerceptualHash, FixCategory::RestructureLayout).numeric(
                    None,
                    distance,
                    0.0,
                    Severity::High,
                    format!(
                        "Perceptual hash distance {} exceeds {}; layouts differ grossly",
                        metrics.phash_distance, self.gross_mismatch_distance
                    ),
                ),
            );
        }

        let ssim = metrics.global_ssim;
        found.push(GLOBAL_SSIM.numeric(
            None,
            ssim,
            1.0,
            self.thresholds.ssim.classify(ssim),
            format!("Whole-image structural similarity is {ssim:.4}"),
        ));

        let percent = metrics.global_pixel_diff_percent;
        found.push(GLOBAL_PIXEL_DIFF.numeric(
            None,
            percent,
            0.0,
            self.thresholds.pixel_diff_percent.classify(percent),
            format!("{percent:.2}% of all pixels differ"),
        ));
    }

    fn classify_region(&self, region: &RegionMetrics, found: &mut Vec<Discrepancy>) {
        let region_ref = || Some(region.to_ref());

        found.push(REGION_SSIM.numeric(
            region_ref(),
            region.ssim,
            1.0,
            self.thresholds.ssim.classify(region.ssim),
            format!("Structural similarity in '{}' is {:.4}", region.label, region.ssim),
        ));

        found.push(REGION_PIXEL_DIFF.numeric(
            region_ref(),
            region.pixel_diff_percent,
            0.0,
            self.thresholds.pixel_diff_percent.classify(region.pixel_diff_percent),
            format!("{:.2}% of pixels in '{}' differ", region.pixel_diff_percent, region.label),
        ));

        match (region.design_content, region.implementation_content) {
            (Some(expected), Some(measured)) => {
                let expected = expected.offset(region.bounds.x, region.bounds.y);
                let measured = measured.offset(region.bounds.x, region.bounds.y);
                self.compare_boxes(&region.label, region_ref(), &expected, &measured, Signal::ContentOffset, found);
            }
            (Some(expected), None) => found.push(Self::presence(
                region_ref(),
                MeasuredValue::Text("nothing rendered".into()),
                MeasuredValue::Box(expected.offset(region.bounds.x, region.bounds.y)),
                format!("Content expected in '{}' is missing from the implementation", region.label),
            )),
            (None, Some(measured)) => found.push(Self::presence(
                region_ref(),
                MeasuredValue::Box(measured.offset(region.bounds.x, region.bounds.y)),
                MeasuredValue::Text("empty area".into()),
                format!("Implementation renders content in '{}' where the design is empty", region.label),
            )),
            (None, None) => {}
        }
    }

    fn presence(region: Option<RegionRef>, measured: MeasuredValue, expected: MeasuredValue, description: String) -> Discrepancy {
        Discrepancy {
            category: Category::Structure,
            signal: Signal::ContentOffset,
            region,
            measured,
            expected,
            delta: 1.0,
            severity: Severity::High,
            fix: FixCategory::RestructureLayout,
            description,
        }
    }

    /// Position and size deltas between an expected and a measured box. Both
    /// land in the spacing category.
    fn compare_boxes(
        &self,
        label: &str,
        region: Option<RegionRef>,
        expected: &BoundingBox,
        measured: &BoundingBox,
        position_signal: Signal,
        found: &mut Vec<Discrepancy>,
    ) {
        let tiers = &self.thresholds.spacing_px;

        let dx = measured.x as f64 - expected.x as f64;
        let dy = measured.y as f64 - expected.y as f64;
        let offset = if dx.abs() >= dy.abs() { dx } else { dy };
        found.push(Discrepancy {
            category: Category::Spacing,
            signal: position_signal,
            region: region.clone(),
            measured: MeasuredValue::Box(*measured),
            expected: MeasuredValue::Box(*expected),
            delta: offset,
            severity: tiers.classify(offset),
            fix: FixCategory::AdjustSpacing,
            description: format!("'{label}' is offset by ({dx:+}, {dy:+}) px"),
        });

        let dw = measured.width as f64 - expected.width as f64;
        let dh = measured.height as f64 - expected.height as f64;
        let growth = if dw.abs() >= dh.abs() { dw } else { dh };
        found.push(Discrepancy {
            category: Category::Spacing,
            signal: Signal::Size,
            region,
            measured: MeasuredValue::Box(*measured),
            expected: MeasuredValue::Box(*expected),
            delta: growth,
            severity: tiers.classify(growth),
            fix: FixCategory::AdjustSize,
            description: format!(
                "'{label}' is {}x{} px, expected {}x{}",
                measured.width, measured.height, expected.width, expected.height
            ),
        });
    }

    fn classify_colors(&self, metrics: &MetricResult, found: &mut Vec<Discrepancy>) {
        for (sample, &delta_e) in &metrics.color_delta_e {
            let region = metrics
                .regions
                .iter()
                .find(|r| &r.sample_id == sample)
                .map(RegionMetrics::to_ref);

            found.push(COLOR.numeric(
                region,
                delta_e,
                0.0,
                self.thresholds.delta_e.classify(delta_e),
                format!("Colour at '{sample}' differs by ΔE00 {delta_e:.2}"),
            ));
        }
    }

    fn classify_element(&self, element: &LayoutElement, found: &mut Vec<Discrepancy>) {
        let Some(measured) = &element.measured else {
            return;
        };
        let expected = &element.expected;
        let label = element.label.as_str();

        let region = expected
            .bounds
            .or(measured.bounds)
            .map(|bounds| RegionRef {
                label: label.to_string(),
                bounds,
            });

        if let (Some(e), Some(m)) = (&expected.bounds, &measured.bounds) {
            self.compare_boxes(label, region.clone(), e, m, Signal::Position, found);
        }

        if let (Some(e), Some(m)) = (&expected.font, &measured.font) {
            self.classify_font(label, &region, e, m, found);
        }

        if let (Some(e), Some(m)) = (&expected.effects, &measured.effects) {
            self.classify_effects(label, &region, e, m, found);
        }
    }

    fn classify_font(
        &self,
        label: &str,
        region: &Option<RegionRef>,
        expected: &FontSpec,
        measured: &FontSpec,
        found: &mut Vec<Discrepancy>,
    ) {
        let t = &self.thresholds;
        let numeric = [
            (FONT_SIZE, &t.font_size_px, expected.size_px, measured.size_px, "font size"),
            (FONT_WEIGHT, &t.font_weight, expected.weight, measured.weight, "font weight"),
            (LINE_HEIGHT, &t.spacing_px, expected.line_height_px, measured.line_height_px, "line height"),
        ];
        self.push_numeric(label, region, &numeric, found);

        if let (Some(e), Some(m)) = (&expected.family, &measured.family) {
            if !e.trim().eq_ignore_ascii_case(m.trim()) {
                found.push(Discrepancy {
                    category: Category::Typography,
                    signal: Signal::FontFamily,
                    region: region.clone(),
                    measured: MeasuredValue::Text(m.clone()),
                    expected: MeasuredValue::Text(e.clone()),
                    delta: 1.0,
                    severity: Severity::High,
                    fix: FixCategory::AdjustTypography,
                    description: format!("'{label}' uses font family '{m}', expected '{e}'"),
                });
            }
        }
    }

    fn classify_effects(
        &self,
        label: &str,
        region: &Option<RegionRef>,
        expected: &EffectSpec,
        measured: &EffectSpec,
        found: &mut Vec<Discrepancy>,
    ) {
        let t = &self.thresholds;
        let numeric = [
            (CORNER_RADIUS, &t.spacing_px, expected.corner_radius_px, measured.corner_radius_px, "corner radius"),
            (SHADOW_BLUR, &t.spacing_px, expected.shadow_blur_px, measured.shadow_blur_px, "shadow blur"),
            (OPACITY, &t.opacity, expected.opacity, measured.opacity, "opacity"),
        ];
        self.push_numeric(label, region, &numeric, found);
    }

    fn push_numeric(
        &self,
        label: &str,
        region: &Option<RegionRef>,
        checks: &[(Finding, &Tiers, Option<f64>, Option<f64>, &str)],
        found: &mut Vec<Discrepancy>,
    ) {
        for &(finding, tiers, expected, measured, name) in checks {
            let (Some(expected), Some(measured)) = (expected, measured) else {
                continue;
            };
            found.push(finding.numeric(
                region.clone(),
                measured,
                expected,
                tiers.classify(measured - expected),
                format!("'{label}' {name} is {measured}, expected {expected}"),
            ));
        }
    }
}

impl Default for DiscrepancyClassifier {
    fn default() -> Self {
        Self::new(SeverityThresholds::default())
    }
}

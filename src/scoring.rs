use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    MetricResult,
    detection::{Category, Discrepancy, Severity, Signal, thresholds::SeverityThresholds},
    error::{FidelityError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreComponent {
    Ssim,
    PixelDiff,
    Color,
    Spacing,
    TypographyEffects,
}

impl ScoreComponent {
    pub const ALL: [ScoreComponent; 5] = [
        ScoreComponent::Ssim,
        ScoreComponent::PixelDiff,
        ScoreComponent::Color,
        ScoreComponent::Spacing,
        ScoreComponent::TypographyEffects,
    ];

    /// The component a discrepancy is charged to, both when scoring and when
    /// estimating its impact. Skipped regions describe the inputs, not the
    /// implementation, and are charged to nothing.
    pub fn for_discrepancy(discrepancy: &Discrepancy) -> Option<ScoreComponent> {
        let component = match discrepancy.category {
            Category::Color => ScoreComponent::Color,
            Category::Spacing => ScoreComponent::Spacing,
            Category::Typography | Category::Effects => ScoreComponent::TypographyEffects,
            Category::Structure => match discrepancy.signal {
                Signal::RegionSkipped => return None,
                Signal::PixelDiff => ScoreComponent::PixelDiff,
                _ => ScoreComponent::Ssim,
            },
        };
        Some(component)
    }
}

impl fmt::Display for ScoreComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScoreComponent::Ssim => "ssim",
            ScoreComponent::PixelDiff => "pixel_diff",
            ScoreComponent::Color => "color",
            ScoreComponent::Spacing => "spacing",
            ScoreComponent::TypographyEffects => "typography_effects",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub ssim: u32,
    pub pixel_diff: u32,
    pub color: u32,
    pub spacing: u32,
    pub typography_effects: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            ssim: 30,
            pixel_diff: 20,
            color: 20,
            spacing: 15,
            typography_effects: 15,
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<()> {
        let sum = self.total();
        if sum != 100 {
            return Err(FidelityError::Configuration(format!(
                "scoring weights must sum to 100, got {sum}"
            )));
        }
        Ok(())
    }

    pub fn total(&self) -> u32 {
        self.ssim + self.pixel_diff + self.color + self.spacing + self.typography_effects
    }

    pub fn weight(&self, component: ScoreComponent) -> u32 {
        match component {
            ScoreComponent::Ssim => self.ssim,
            ScoreComponent::PixelDiff => self.pixel_diff,
            ScoreComponent::Color => self.color,
            ScoreComponent::Spacing => self.spacing,
            ScoreComponent::TypographyEffects => self.typography_effects,
        }
    }

    /// Combined weight of every component a category can affect.
    pub fn category_weight(&self, category: Category) -> u32 {
        match category {
            Category::Structure => self.ssim + self.pixel_diff,
            Category::Color => self.color,
            Category::Spacing => self.spacing,
            Category::Typography | Category::Effects => self.typography_effects,
        }
    }

    /// Score points the discrepancy costs, assuming it is the worst of its component.
    pub fn impact(&self, discrepancy: &Discrepancy) -> f64 {
        ScoreComponent::for_discrepancy(discrepancy).map_or(0.0, |component| {
            self.weight(component) as f64 * (1.0 - discrepancy.severity.score_factor())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FidelityScore {
    pub total: u32,
    pub breakdown: BTreeMap<ScoreComponent, u32>,
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
}

/// Weighted 0-100 score. Every component is a step function of a severity,
/// so small metric noise cannot move the total.
pub struct FidelityScorer {
    weights: ScoringWeights,
    thresholds: SeverityThresholds,
}

impl FidelityScorer {
    pub fn new(weights: ScoringWeights, thresholds: SeverityThresholds) -> Result<Self> {
        weights.validate()?;
        Ok(Self { weights, thresholds })
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Worst severity per component. SSIM and pixel-diff start from the
    /// headline metrics and are raised by any structural finding charged to
    /// them, such as a viewport mismatch or a gross perceptual-hash mismatch.
    pub fn severities(&self, metrics: &MetricResult, discrepancies: &[Discrepancy]) -> BTreeMap<ScoreComponent, Severity> {
        let mut severities = BTreeMap::from([
            (ScoreComponent::Ssim, self.thresholds.ssim.classify(metrics.ssim)),
            (
                ScoreComponent::PixelDiff,
                self.thresholds.pixel_diff_percent.classify(metrics.pixel_diff_percent),
            ),
            (ScoreComponent::Color, Severity::None),
            (ScoreComponent::Spacing, Severity::None),
            (ScoreComponent::TypographyEffects, Severity::None),
        ]);

        for discrepancy in discrepancies {
            if let Some(component) = ScoreComponent::for_discrepancy(discrepancy) {
                let worst = severities.entry(component).or_insert(Severity::None);
                *worst = (*worst).max(discrepancy.severity);
            }
        }

        severities
    }

    pub fn score(&self, metrics: &MetricResult, discrepancies: &[Discrepancy]) -> FidelityScore {
        let severities = self.severities(metrics, discrepancies);

        let mut breakdown = BTreeMap::new();
        let mut sum = 0.0;
        for (component, severity) in severities {
            let points = self.weights.weight(component) as f64 * severity.score_factor();
            sum += points;
            breakdown.insert(component, points.round() as u32);
        }

        FidelityScore {
            total: sum.round().clamp(0.0, 100.0) as u32,
            breakdown,
            iteration: 0,
            timestamp: Utc::now(),
        }
    }
}

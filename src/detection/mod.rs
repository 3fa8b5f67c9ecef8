pub mod classifier;
pub mod thresholds;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::BoundingBox;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
}

impl Severity {
    /// Fraction of a score component kept at this severity.
    pub fn score_factor(&self) -> f64 {
        match self {
            Severity::None => 1.0,
            Severity::Low => 0.7,
            Severity::Medium => 0.35,
            Severity::High => 0.0,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Color,
    Spacing,
    Typography,
    Structure,
    Effects,
}

/// The measurement a discrepancy was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    DeltaE,
    Ssim,
    PixelDiff,
    PerceptualHash,
    ContentOffset,
    Position,
    Size,
    FontSize,
    FontWeight,
    LineHeight,
    FontFamily,
    CornerRadius,
    ShadowBlur,
    Opacity,
    Dimensions,
    RegionSkipped,
}

/// What kind of change the fix-applying collaborator should make. Never code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FixCategory {
    AdjustColor,
    AdjustSpacing,
    AdjustSize,
    AdjustTypography,
    AdjustEffects,
    RestructureLayout,
    MatchViewport,
    ReviewRegion,
    ReviewManually,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasuredValue {
    Number(f64),
    Text(String),
    Box(BoundingBox),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRef {
    pub label: String,
    pub bounds: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub category: Category,
    pub signal: Signal,
    pub region: Option<RegionRef>,
    pub measured: MeasuredValue,
    pub expected: MeasuredValue,
    pub delta: f64,
    pub severity: Severity,
    pub fix: FixCategory,
    pub description: String,
}

impl Discrepancy {
    pub fn region_label(&self) -> Option<&str> {
        self.region.as_ref().map(|r| r.label.as_str())
    }
}

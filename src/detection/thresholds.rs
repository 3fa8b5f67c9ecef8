use serde::{Deserialize, Serialize};

use crate::{
    detection::Severity,
    error::{FidelityError, Result},
};

/// Upper bounds for a "bigger is worse" magnitude: `<= none` is None,
/// `<= low` is Low, `<= medium` is Medium, anything above is High.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tiers {
    pub none: f64,
    pub low: f64,
    pub medium: f64,
}

impl Tiers {
    pub const fn new(none: f64, low: f64, medium: f64) -> Self {
        Self { none, low, medium }
    }

    /// Moves the None bound, pushing `low` and `medium` up by the same gaps
    /// when the new bound would reach them.
    pub fn with_none_bound(self, none: f64) -> Self {
        if none < self.low {
            return Self { none, ..self };
        }
        let low = none + (self.low - self.none);
        Self {
            none,
            low,
            medium: low + (self.medium - self.low),
        }
    }

    pub fn classify(&self, delta: f64) -> Severity {
        let magnitude = delta.abs();
        match magnitude {
            m if m.is_nan() => Severity::High,
            m if m <= self.none => Severity::None,
            m if m <= self.low => Severity::Low,
            m if m <= self.medium => Severity::Medium,
            _ => Severity::High,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let values = [self.none, self.low, self.medium];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(FidelityError::Configuration(format!(
                "{name} thresholds must be finite and non-negative"
            )));
        }
        if !(self.none < self.low && self.low < self.medium) {
            return Err(FidelityError::Configuration(format!(
                "{name} thresholds must be strictly increasing (none < low < medium)"
            )));
        }
        Ok(())
    }
}

/// Lower bounds for a "bigger is better" similarity: `>= none` is None,
/// `>= low` is Low, `>= medium` is Medium, anything below is High.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityTiers {
    pub none: f64,
    pub low: f64,
    pub medium: f64,
}

impl SimilarityTiers {
    pub const fn new(none: f64, low: f64, medium: f64) -> Self {
        Self { none, low, medium }
    }

    pub fn classify(&self, similarity: f64) -> Severity {
        match similarity {
            s if s.is_nan() => Severity::High,
            s if s >= self.none => Severity::None,
            s if s >= self.low => Severity::Low,
            s if s >= self.medium => Severity::Medium,
            _ => Severity::High,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let values = [self.none, self.low, self.medium];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0 || *v > 1.0) {
            return Err(FidelityError::Configuration(format!(
                "{name} thresholds must lie in [0, 1]"
            )));
        }
        if !(self.none > self.low && self.low > self.medium) {
            return Err(FidelityError::Configuration(format!(
                "{name} thresholds must be strictly decreasing (none > low > medium)"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    pub delta_e: Tiers,
    pub spacing_px: Tiers,
    pub ssim: SimilarityTiers,
    pub pixel_diff_percent: Tiers,
    pub font_size_px: Tiers,
    pub font_weight: Tiers,
    pub opacity: Tiers,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            delta_e: Tiers::new(1.0, 2.0, 3.5),
            spacing_px: Tiers::new(1.0, 4.0, 8.0),
            ssim: SimilarityTiers::new(0.98, 0.95, 0.90),
            pixel_diff_percent: Tiers::new(0.5, 2.0, 5.0),
            font_size_px: Tiers::new(0.5, 1.0, 2.0),
            font_weight: Tiers::new(0.0, 100.0, 200.0),
            opacity: Tiers::new(0.02, 0.05, 0.10),
        }
    }
}

impl SeverityThresholds {
    /// Treats up to `fraction` of differing pixels as a match.
    pub fn with_pixel_tolerance(mut self, fraction: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&fraction) {
            return Err(FidelityError::Configuration(format!(
                "pixel tolerance must be a fraction in [0, 1), got {fraction}"
            )));
        }
        self.pixel_diff_percent = self.pixel_diff_percent.with_none_bound(fraction * 100.0);
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.delta_e.validate("delta_e")?;
        self.spacing_px.validate("spacing_px")?;
        self.ssim.validate("ssim")?;
        self.pixel_diff_percent.validate("pixel_diff_percent")?;
        self.font_size_px.validate("font_size_px")?;
        self.font_weight.validate("font_weight")?;
        self.opacity.validate("opacity")?;
        Ok(())
    }
}

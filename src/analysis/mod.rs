pub mod color;
pub mod compensation;
pub mod metrics;
pub mod phash;
pub mod pixel_diff;
pub mod segmentation;
pub mod ssim;

use serde::{Deserialize, Serialize};

use crate::{
    analysis::color::ColorSample,
    error::{FidelityError, Result},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricConfig {
    pub ssim_window: u32,
    pub ssim_k1: f64,
    pub ssim_k2: f64,
    /// Per-channel tolerance for pixel-diff, as a fraction of 255.
    pub pixel_fuzz: f64,
    pub gross_mismatch_distance: u32,
    pub short_circuit_on_gross_mismatch: bool,
    pub color_compensation: bool,
    pub parallel: bool,
    pub samples: Vec<ColorSample>,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            ssim_window: 7,
            ssim_k1: 0.01,
            ssim_k2: 0.03,
            pixel_fuzz: 0.02,
            gross_mismatch_distance: 24,
            short_circuit_on_gross_mismatch: false,
            color_compensation: true,
            parallel: true,
            samples: Vec::new(),
        }
    }
}

impl MetricConfig {
    pub fn validate(&self) -> Result<()> {
        if !(3..=31).contains(&self.ssim_window) {
            return Err(FidelityError::Configuration(format!(
                "ssim_window must be between 3 and 31, got {}",
                self.ssim_window
            )));
        }
        for (name, k) in [("ssim_k1", self.ssim_k1), ("ssim_k2", self.ssim_k2)] {
            if !k.is_finite() || k <= 0.0 {
                return Err(FidelityError::Configuration(format!(
                    "{name} must be a positive number, got {k}"
                )));
            }
        }
        if !(0.0..1.0).contains(&self.pixel_fuzz) {
            return Err(FidelityError::Configuration(format!(
                "pixel_fuzz must be in [0, 1), got {}",
                self.pixel_fuzz
            )));
        }
        if self.gross_mismatch_distance > 64 {
            return Err(FidelityError::Configuration(
                "gross_mismatch_distance cannot exceed 64 bits".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_config_validation() {
        assert!(MetricConfig::default().validate().is_ok());

        let config = MetricConfig {
            ssim_window: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MetricConfig {
            pixel_fuzz: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MetricConfig {
            ssim_k2: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MetricConfig = serde_json::from_str(r#"{"ssim_window": 11}"#).unwrap();
        assert_eq!(config.ssim_window, 11);
        assert_eq!(config.pixel_fuzz, 0.02);
        assert!(config.parallel);
    }
}

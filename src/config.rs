use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    analysis::{MetricConfig, segmentation::SegmentationConfig},
    detection::thresholds::SeverityThresholds,
    error::Result,
    iteration::IterationConfig,
    scoring::ScoringWeights,
};

/// Every tunable of a comparison run. Missing sections fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FidelityConfig {
    pub metrics: MetricConfig,
    pub segmentation: SegmentationConfig,
    pub thresholds: SeverityThresholds,
    pub weights: ScoringWeights,
    pub iteration: IterationConfig,
}

impl FidelityConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.metrics.validate()?;
        self.segmentation.validate()?;
        self.thresholds.validate()?;
        self.weights.validate()?;
        self.iteration.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::FidelityError;

    #[test]
    fn test_defaults_are_valid() {
        assert!(FidelityConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_file_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"iteration": {{"max_iterations": 4}}, "thresholds": {{"delta_e": {{"none": 0.5, "low": 1.5, "medium": 3.0}}}}}}"#
        )
        .unwrap();

        let config = FidelityConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.iteration.max_iterations, 4);
        assert_eq!(config.iteration.convergence_threshold, 95);
        assert_eq!(config.thresholds.delta_e.none, 0.5);
        assert_eq!(config.thresholds.ssim.none, 0.98);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_weights_are_fatal() {
        let config = FidelityConfig::from_json(r#"{"weights": {"ssim": 50}}"#).unwrap();
        assert!(matches!(config.validate(), Err(FidelityError::Configuration(_))));
    }
}

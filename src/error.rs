use thiserror::Error;

use crate::iteration::IterationStatus;

#[derive(Error, Debug)]
pub enum FidelityError {
    #[error("Image loading error ({source_name}): {reason}")]
    ImageLoad { source_name: String, reason: String },

    #[error(
        "Dimension mismatch: design {}x{}, implementation {}x{}",
        .design.0, .design.1, .implementation.0, .implementation.1
    )]
    DimensionMismatch {
        design: (u32, u32),
        implementation: (u32, u32),
    },

    #[error("Invalid region '{label}': {reason}")]
    InvalidRegion { label: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Iteration loop already finished with status {0:?}")]
    IterationClosed(IterationStatus),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FidelityError {
    pub fn image_load(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ImageLoad {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_region(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRegion {
            label: label.into(),
            reason: reason.into(),
        }
    }

    /// Errors that abort a whole comparison. `InvalidRegion` is handled per region.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidRegion { .. })
    }
}

pub type Result<T> = std::result::Result<T, FidelityError>;

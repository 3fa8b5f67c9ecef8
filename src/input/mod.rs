pub mod layout;
pub mod loader;

use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::error::{FidelityError, Result};

/// Where an image comes from: a screenshot/export on disk or an in-memory buffer.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes { name: String, data: Vec<u8> },
}

impl ImageSource {
    pub fn path<P: AsRef<Path>>(path: P) -> Self {
        Self::Path(path.as_ref().to_path_buf())
    }

    pub fn bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self::Bytes {
            name: name.into(),
            data,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Path(path) => path.to_string_lossy().to_string(),
            Self::Bytes { name, .. } => name.clone(),
        }
    }
}

/// Decoded, immutable RGB pixel buffer.
#[derive(Debug, Clone)]
pub struct Image {
    pixels: RgbImage,
    channels: u8,
    bits_per_channel: u8,
    origin: String,
}

impl Image {
    pub fn from_rgb(pixels: RgbImage, origin: impl Into<String>) -> Result<Self> {
        Self::with_depth(pixels, 3, 8, origin)
    }

    pub(crate) fn with_depth(
        pixels: RgbImage,
        channels: u8,
        bits_per_channel: u8,
        origin: impl Into<String>,
    ) -> Result<Self> {
        let origin = origin.into();
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(FidelityError::image_load(origin, "image has zero width or height"));
        }

        Ok(Self {
            pixels,
            channels,
            bits_per_channel,
            origin,
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Channel count of the decoded source, before conversion to RGB.
    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn bits_per_channel(&self) -> u8 {
        self.bits_per_channel
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

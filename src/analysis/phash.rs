use image::{RgbImage, imageops::{self, FilterType}};
use ndarray::{Array2, s};

use crate::image_utils::luma_array;

const THUMBNAIL_SIZE: usize = 32;
const HASH_SIZE: usize = 8;

/// DCT-based perceptual hash: 32x32 luma thumbnail, 2-D DCT-II, the 8x8
/// lowest frequencies thresholded against their median (DC excluded from
/// the median) into a 64-bit fingerprint.
pub struct PerceptualHasher {
    dct_matrix: Array2<f64>,
}

impl PerceptualHasher {
    pub fn new() -> Self {
        Self {
            dct_matrix: Self::compute_dct_matrix(THUMBNAIL_SIZE),
        }
    }

    pub fn compute_dct_matrix(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, n), |(i, j)| {
            if i == 0 {
                1.0 / (n as f64).sqrt()
            } else {
                (2.0 / n as f64).sqrt()
                    * (std::f64::consts::PI * (2.0 * j as f64 + 1.0) * i as f64 / (2.0 * n as f64)).cos()
            }
        })
    }

    pub fn hash(&self, image: &RgbImage) -> u64 {
        let size = THUMBNAIL_SIZE as u32;
        let thumbnail = imageops::resize(image, size, size, FilterType::Triangle);
        let luma = luma_array(&thumbnail);

        let coefficients = self.dct_matrix.dot(&luma).dot(&self.dct_matrix.t());
        let low = coefficients.slice(s![0..HASH_SIZE, 0..HASH_SIZE]);

        let mut ac = low.iter().skip(1).copied().collect::<Vec<_>>();
        ac.sort_by(|a, b| a.total_cmp(b));
        let median = if ac.len() % 2 == 0 {
            (ac[ac.len() / 2 - 1] + ac[ac.len() / 2]) / 2.0
        } else {
            ac[ac.len() / 2]
        };

        low.iter()
            .enumerate()
            .filter(|&(_, &c)| c > median)
            .fold(0u64, |hash, (i, _)| hash | (1u64 << i))
    }

    pub fn distance(&self, a: &RgbImage, b: &RgbImage) -> u32 {
        hamming(self.hash(a), self.hash(b))
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new()
    }
}

pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

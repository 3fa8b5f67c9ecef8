use image::RgbImage;
use ndarray::Array2;

use crate::{
    error::{FidelityError, Result},
    image_utils::{integral, luma_array, window_sum},
};

/// Mean SSIM over uniform square windows on the luma channel.
///
/// Luminance, contrast and structure are weighted equally, which reduces to
/// `((2 mx my + c1)(2 sxy + c2)) / ((mx^2 + my^2 + c1)(sx^2 + sy^2 + c2))`.
/// Windows slide with stride 1; an image narrower or shorter than the window
/// is treated as a single window along that axis.
pub struct SsimCalculator {
    window: u32,
    c1: f64,
    c2: f64,
}

impl SsimCalculator {
    pub fn new(window: u32, k1: f64, k2: f64) -> Self {
        let dynamic_range = 255.0;
        Self {
            window: window.max(1),
            c1: (k1 * dynamic_range).powi(2),
            c2: (k2 * dynamic_range).powi(2),
        }
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn compute(&self, a: &RgbImage, b: &RgbImage) -> Result<f64> {
        if a.dimensions() != b.dimensions() {
            return Err(FidelityError::DimensionMismatch {
                design: a.dimensions(),
                implementation: b.dimensions(),
            });
        }

        let (width, height) = a.dimensions();
        if width == 0 || height == 0 {
            return Ok(1.0);
        }

        let x = luma_array(a);
        let y = luma_array(b);

        Ok(self.compute_arrays(&x, &y))
    }

    fn compute_arrays(&self, x: &Array2<f64>, y: &Array2<f64>) -> f64 {
        let (height, width) = x.dim();
        let win_h = (self.window as usize).min(height);
        let win_w = (self.window as usize).min(width);
        let n = (win_h * win_w) as f64;

        let sum_x = integral(x);
        let sum_y = integral(y);
        let sum_xx = integral(&(x * x));
        let sum_yy = integral(&(y * y));
        let sum_xy = integral(&(x * y));

        let mut total = 0.0;
        let mut windows = 0u64;

        for wy in 0..=(height - win_h) {
            for wx in 0..=(width - win_w) {
                let (y1, x1) = (wy + win_h, wx + win_w);

                let mu_x = window_sum(&sum_x, wy, wx, y1, x1) / n;
                let mu_y = window_sum(&sum_y, wy, wx, y1, x1) / n;
                let var_x = window_sum(&sum_xx, wy, wx, y1, x1) / n - mu_x * mu_x;
                let var_y = window_sum(&sum_yy, wy, wx, y1, x1) / n - mu_y * mu_y;
                let cov = window_sum(&sum_xy, wy, wx, y1, x1) / n - mu_x * mu_y;

                let numerator = (2.0 * mu_x * mu_y + self.c1) * (2.0 * cov + self.c2);
                let denominator = (mu_x * mu_x + mu_y * mu_y + self.c1) * (var_x + var_y + self.c2);

                total += numerator / denominator;
                windows += 1;
            }
        }

        if windows == 0 {
            return 1.0;
        }

        (total / windows as f64).clamp(0.0, 1.0)
    }
}

impl Default for SsimCalculator {
    fn default() -> Self {
        Self::new(7, 0.01, 0.03)
    }
}

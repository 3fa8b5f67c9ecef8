use std::collections::HashMap;

use image::{GrayImage, Luma, Rgb, RgbImage, imageops};
use ndarray::Array2;

use crate::BoundingBox;

pub fn luma(pixel: &Rgb<u8>) -> f64 {
    0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64
}

pub fn luma_array(image: &RgbImage) -> Array2<f64> {
    let (width, height) = image.dimensions();
    let mut arr = Array2::zeros((height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        arr[[y as usize, x as usize]] = luma(pixel);
    }

    arr
}

/// Summed-area table with a leading zero row and column, shape `(h + 1, w + 1)`.
pub fn integral(arr: &Array2<f64>) -> Array2<f64> {
    let (height, width) = arr.dim();
    let mut table = Array2::zeros((height + 1, width + 1));

    for y in 0..height {
        let mut row_sum = 0.0;
        for x in 0..width {
            row_sum += arr[[y, x]];
            table[[y + 1, x + 1]] = table[[y, x + 1]] + row_sum;
        }
    }

    table
}

/// Sum over the half-open window `[y0, y1) x [x0, x1)` of an integral table.
pub fn window_sum(table: &Array2<f64>, y0: usize, x0: usize, y1: usize, x1: usize) -> f64 {
    table[[y1, x1]] - table[[y0, x1]] - table[[y1, x0]] + table[[y0, x0]]
}

pub fn crop(image: &RgbImage, bounds: &BoundingBox) -> RgbImage {
    imageops::crop_imm(image, bounds.x, bounds.y, bounds.width, bounds.height).to_image()
}

pub fn mean_color(image: &RgbImage) -> [f64; 3] {
    let count = image.width() as u64 * image.height() as u64;
    if count == 0 {
        return [0.0; 3];
    }

    let mut sums = [0u64; 3];
    for pixel in image.pixels() {
        for c in 0..3 {
            sums[c] += pixel[c] as u64;
        }
    }

    [
        sums[0] as f64 / count as f64,
        sums[1] as f64 / count as f64,
        sums[2] as f64 / count as f64,
    ]
}

pub fn max_channel_delta(a: &Rgb<u8>, b: &Rgb<u8>) -> u8 {
    (0..3)
        .map(|c| a[c].abs_diff(b[c]))
        .max()
        .unwrap_or(0)
}

pub fn is_ink(pixel: &Rgb<u8>, background: &Rgb<u8>, threshold: u8) -> bool {
    max_channel_delta(pixel, background) > threshold
}

/// Most frequent colour along the image border. Ties resolve to the lowest
/// packed RGB value so the result does not depend on hash ordering.
pub fn dominant_border_color(image: &RgbImage) -> Rgb<u8> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Rgb([255, 255, 255]);
    }

    let mut counts: HashMap<[u8; 3], u32> = HashMap::new();
    let mut tally = |x: u32, y: u32| {
        *counts.entry(image.get_pixel(x, y).0).or_default() += 1;
    };

    for x in 0..width {
        tally(x, 0);
        if height > 1 {
            tally(x, height - 1);
        }
    }
    for y in 1..height.saturating_sub(1) {
        tally(0, y);
        if width > 1 {
            tally(width - 1, y);
        }
    }

    let dominant = counts
        .into_iter()
        .max_by(|(color_a, count_a), (color_b, count_b)| {
            count_a.cmp(count_b).then_with(|| color_b.cmp(color_a))
        })
        .map(|(color, _)| color)
        .unwrap_or([255, 255, 255]);

    Rgb(dominant)
}

pub fn ink_mask(image: &RgbImage, background: &Rgb<u8>, threshold: u8) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut mask = GrayImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        if is_ink(pixel, background, threshold) {
            mask.put_pixel(x, y, Luma([255]));
        }
    }

    mask
}

/// Bounding box of ink pixels, relative to the image origin.
pub fn content_bounds(image: &RgbImage, background: &Rgb<u8>, threshold: u8) -> Option<BoundingBox> {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut found = false;

    for (x, y, pixel) in image.enumerate_pixels() {
        if is_ink(pixel, background, threshold) {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    found.then(|| BoundingBox::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

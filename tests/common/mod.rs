#![allow(dead_code)]

use std::path::{Path, PathBuf};

use design_fidelity::input::Image;
use image::{Rgb, RgbImage};

pub const WIDTH: u32 = 400;
pub const HEIGHT: u32 = 200;

pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
pub const DARK_GRAY: Rgb<u8> = Rgb([0x1A, 0x1A, 0x1A]);

/// White 400x200 canvas with a 100x40 rectangle at (`x`, 80).
pub fn scene(x: u32, color: Rgb<u8>) -> RgbImage {
    let mut image = RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([255, 255, 255]));
    for yy in 80..120 {
        for xx in x..x + 100 {
            image.put_pixel(xx, yy, color);
        }
    }
    image
}

pub fn design() -> RgbImage {
    scene(150, BLACK)
}

pub fn image(pixels: RgbImage, name: &str) -> Image {
    Image::from_rgb(pixels, name).expect("non-empty image")
}

pub fn save(dir: &Path, name: &str, pixels: &RgbImage) -> PathBuf {
    let path = dir.join(name);
    pixels.save(&path).expect("write png");
    path
}

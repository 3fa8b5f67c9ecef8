use serde::{Deserialize, Serialize};

// D65 reference white, 2 degree observer.
const WHITE_X: f64 = 0.95047;
const WHITE_Y: f64 = 1.0;
const WHITE_Z: f64 = 1.08883;

const EPSILON: f64 = 216.0 / 24389.0;
const KAPPA: f64 = 24389.0 / 27.0;

const POW25_7: f64 = 6_103_515_625.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lab {
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

impl Lab {
    pub const fn new(l: f64, a: f64, b: f64) -> Self {
        Self { l, a, b }
    }

    /// Converts an sRGB colour with channels in `0..=255` (fractional values
    /// allowed, e.g. region averages).
    pub fn from_srgb(rgb: [f64; 3]) -> Self {
        let [r, g, b] = rgb.map(|c| srgb_to_linear(c / 255.0));

        let x = 0.4124564 * r + 0.3575761 * g + 0.1804375 * b;
        let y = 0.2126729 * r + 0.7151522 * g + 0.0721750 * b;
        let z = 0.0193339 * r + 0.1191920 * g + 0.9503041 * b;

        let fx = lab_f(x / WHITE_X);
        let fy = lab_f(y / WHITE_Y);
        let fz = lab_f(z / WHITE_Z);

        Self {
            l: 116.0 * fy - 16.0,
            a: 500.0 * (fx - fy),
            b: 200.0 * (fy - fz),
        }
    }
}

fn srgb_to_linear(c: f64) -> f64 {
    let c = c.clamp(0.0, 1.0);
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn lab_f(t: f64) -> f64 {
    if t > EPSILON {
        t.cbrt()
    } else {
        (KAPPA * t + 16.0) / 116.0
    }
}

fn hue_degrees(b: f64, a: f64) -> f64 {
    if a == 0.0 && b == 0.0 {
        return 0.0;
    }
    let h = b.atan2(a).to_degrees();
    if h < 0.0 { h + 360.0 } else { h }
}

/// CIEDE2000 colour difference with unit weighting factors (kL = kC = kH = 1).
pub fn ciede2000(lab1: Lab, lab2: Lab) -> f64 {
    let c1 = lab1.a.hypot(lab1.b);
    let c2 = lab2.a.hypot(lab2.b);
    let c_bar = (c1 + c2) / 2.0;

    let c_bar7 = c_bar.powi(7);
    let g = 0.5 * (1.0 - (c_bar7 / (c_bar7 + POW25_7)).sqrt());

    let a1p = (1.0 + g) * lab1.a;
    let a2p = (1.0 + g) * lab2.a;

    let c1p = a1p.hypot(lab1.b);
    let c2p = a2p.hypot(lab2.b);

    let h1p = hue_degrees(lab1.b, a1p);
    let h2p = hue_degrees(lab2.b, a2p);

    let delta_lp = lab2.l - lab1.l;
    let delta_cp = c2p - c1p;

    let chroma_product = c1p * c2p;
    let delta_hp = if chroma_product == 0.0 {
        0.0
    } else {
        let dh = h2p - h1p;
        if dh > 180.0 {
            dh - 360.0
        } else if dh < -180.0 {
            dh + 360.0
        } else {
            dh
        }
    };
    let delta_big_hp = 2.0 * chroma_product.sqrt() * (delta_hp.to_radians() / 2.0).sin();

    let l_bar_p = (lab1.l + lab2.l) / 2.0;
    let c_bar_p = (c1p + c2p) / 2.0;

    let h_bar_p = if chroma_product == 0.0 {
        h1p + h2p
    } else if (h1p - h2p).abs() <= 180.0 {
        (h1p + h2p) / 2.0
    } else if h1p + h2p < 360.0 {
        (h1p + h2p + 360.0) / 2.0
    } else {
        (h1p + h2p - 360.0) / 2.0
    };

    let t = 1.0 - 0.17 * (h_bar_p - 30.0).to_radians().cos()
        + 0.24 * (2.0 * h_bar_p).to_radians().cos()
        + 0.32 * (3.0 * h_bar_p + 6.0).to_radians().cos()
        - 0.20 * (4.0 * h_bar_p - 63.0).to_radians().cos();

    let delta_theta = 30.0 * (-((h_bar_p - 275.0) / 25.0).powi(2)).exp();
    let c_bar_p7 = c_bar_p.powi(7);
    let r_c = 2.0 * (c_bar_p7 / (c_bar_p7 + POW25_7)).sqrt();

    let l_offset = (l_bar_p - 50.0).powi(2);
    let s_l = 1.0 + 0.015 * l_offset / (20.0 + l_offset).sqrt();
    let s_c = 1.0 + 0.045 * c_bar_p;
    let s_h = 1.0 + 0.015 * c_bar_p * t;
    let r_t = -(2.0 * delta_theta).to_radians().sin() * r_c;

    let dl = delta_lp / s_l;
    let dc = delta_cp / s_c;
    let dh = delta_big_hp / s_h;

    (dl * dl + dc * dc + dh * dh + r_t * dc * dh).max(0.0).sqrt()
}

pub fn delta_e_srgb(a: [f64; 3], b: [f64; 3]) -> f64 {
    ciede2000(Lab::from_srgb(a), Lab::from_srgb(b))
}

/// An explicit colour probe at a pixel coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorSample {
    pub id: String,
    pub x: u32,
    pub y: u32,
}

impl ColorSample {
    pub fn new(id: impl Into<String>, x: u32, y: u32) -> Self {
        Self { id: id.into(), x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference pairs from Sharma, Wu & Dalal (2005).
    const SHARMA_PAIRS: [((f64, f64, f64), (f64, f64, f64), f64); 6] = [
        ((50.0000, 2.6772, -79.7751), (50.0000, 0.0000, -82.7485), 2.0425),
        ((50.0000, 0.0000, 0.0000), (50.0000, -1.0000, 2.0000), 2.3669),
        ((50.0000, 2.4900, -0.0010), (50.0000, -2.4900, 0.0009), 7.1792),
        ((50.0000, 2.4900, -0.0010), (50.0000, -2.4900, 0.0011), 7.2195),
        ((50.0000, 2.5000, 0.0000), (73.0000, 25.0000, -18.0000), 27.1492),
        ((60.2574, -34.0099, 36.2677), (60.4626, -34.1751, 39.4387), 1.2644),
    ];

    #[test]
    fn test_ciede2000_reference_pairs() {
        for ((l1, a1, b1), (l2, a2, b2), expected) in SHARMA_PAIRS {
            let forward = ciede2000(Lab::new(l1, a1, b1), Lab::new(l2, a2, b2));
            let backward = ciede2000(Lab::new(l2, a2, b2), Lab::new(l1, a1, b1));
            assert!((forward - expected).abs() < 1e-4, "expected {expected}, got {forward}");
            assert!((backward - expected).abs() < 1e-4, "expected {expected}, got {backward}");
        }
    }

    #[test]
    fn test_identical_colors_have_zero_delta() {
        for rgb in [[0.0, 0.0, 0.0], [255.0, 255.0, 255.0], [26.0, 120.0, 240.0]] {
            assert_eq!(delta_e_srgb(rgb, rgb), 0.0);
        }
    }

    #[test]
    fn test_srgb_white_and_black() {
        let white = Lab::from_srgb([255.0, 255.0, 255.0]);
        assert!((white.l - 100.0).abs() < 1e-3);
        assert!(white.a.abs() < 1e-3 && white.b.abs() < 1e-3);

        let black = Lab::from_srgb([0.0, 0.0, 0.0]);
        assert!(black.l.abs() < 1e-9);
    }

    #[test]
    fn test_near_black_differences() {
        let black = [0.0, 0.0, 0.0];
        let slight = delta_e_srgb(black, [10.0, 10.0, 10.0]);
        assert!(slight > 1.0 && slight <= 2.0, "got {slight}");

        let dark_gray = delta_e_srgb(black, [26.0, 26.0, 26.0]);
        assert!(dark_gray > 3.5, "got {dark_gray}");
    }

    #[test]
    fn test_blue_shift_is_not_euclidean() {
        // Equal RGB steps in blue and green are perceived very differently.
        let blue = delta_e_srgb([0.0, 0.0, 200.0], [0.0, 0.0, 230.0]);
        let green = delta_e_srgb([0.0, 200.0, 0.0], [0.0, 230.0, 0.0]);
        assert!((blue - green).abs() > 0.5);
    }
}

//! 8-bit color space projections used by the differencing strategies.
//!
//! Both conversions produce the same byte ranges an 8-bit OpenCV conversion
//! would, so thresholds tuned against camera footage carry over unchanged.

use std::sync::OnceLock;

const D65_X: f32 = 0.950_456;
const D65_Z: f32 = 1.088_754;
const LAB_EPSILON: f32 = 0.008_856;

fn srgb_linear_table() -> &'static [f32; 256] {
    static TABLE: OnceLock<[f32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0.0f32; 256];
        for (value, slot) in table.iter_mut().enumerate() {
            let c = value as f32 / 255.0;
            *slot = if c <= 0.040_45 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            };
        }
        table
    })
}

fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn saturate(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// RGB to 8-bit CIE L*a*b* (L scaled to 0..=255, a and b offset by 128).
pub(crate) fn rgb_to_lab(rgb: [u8; 3]) -> [u8; 3] {
    let table = srgb_linear_table();
    let r = table[rgb[0] as usize];
    let g = table[rgb[1] as usize];
    let b = table[rgb[2] as usize];

    let x = (0.412_453 * r + 0.357_580 * g + 0.180_423 * b) / D65_X;
    let y = 0.212_671 * r + 0.715_160 * g + 0.072_169 * b;
    let z = (0.019_334 * r + 0.119_193 * g + 0.950_227 * b) / D65_Z;

    let fx = lab_f(x);
    let fy = lab_f(y);
    let fz = lab_f(z);

    let l = if y > LAB_EPSILON {
        116.0 * fy - 16.0
    } else {
        903.3 * y
    };
    let a = 500.0 * (fx - fy) + 128.0;
    let b = 200.0 * (fy - fz) + 128.0;

    [saturate(l * 255.0 / 100.0), saturate(a), saturate(b)]
}

/// RGB to the 8-bit U and V chrominance channels; luma is dropped.
pub(crate) fn rgb_to_chroma(rgb: [u8; 3]) -> [u8; 2] {
    let r = rgb[0] as f32;
    let g = rgb[1] as f32;
    let b = rgb[2] as f32;
    let y = 0.299 * r + 0.587 * g + 0.114 * b;

    [
        saturate(0.492 * (b - y) + 128.0),
        saturate(0.877 * (r - y) + 128.0),
    ]
}

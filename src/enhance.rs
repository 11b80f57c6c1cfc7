//! Intensity preprocessing for the decoder.
//!
//! The decoder works on a single-channel image with a linear gain/offset
//! applied. The Otsu fallback pass lives in the decode pipeline.

use image::{GrayImage, Luma, RgbImage};
use imageproc::map::map_subpixels;

/// Lowest contrast gain the controls may select.
pub const MIN_CONTRAST: f32 = 0.5;

const DEFAULT_CONTRAST: f32 = 1.5;
const DEFAULT_BRIGHTNESS: f32 = 10.0;

// BT.601 luma in 14-bit fixed point: 0.299, 0.587, 0.114.
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

/// Linear gain/offset applied to intensity before decoding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Enhancement {
    /// Multiplicative gain.
    pub contrast: f32,
    /// Additive offset.
    pub brightness: f32,
}

impl Default for Enhancement {
    fn default() -> Self {
        Self {
            contrast: DEFAULT_CONTRAST,
            brightness: DEFAULT_BRIGHTNESS,
        }
    }
}

impl Enhancement {
    pub fn apply(&self, gray: &GrayImage) -> GrayImage {
        scale_abs(gray, self.contrast, self.brightness)
    }
}

/// Convert RGB to 8-bit intensity.
pub fn to_intensity(rgb: &RgbImage) -> GrayImage {
    let mut gray = GrayImage::new(rgb.width(), rgb.height());
    for (dst, src) in gray.pixels_mut().zip(rgb.pixels()) {
        let [r, g, b] = src.0;
        let y = (r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B
            + (1 << (LUMA_SHIFT - 1)))
            >> LUMA_SHIFT;
        *dst = Luma([y.min(255) as u8]);
    }
    gray
}

/// `saturate(|gain * src + offset|)` per pixel.
pub fn scale_abs(gray: &GrayImage, gain: f32, offset: f32) -> GrayImage {
    map_subpixels(gray, |value: u8| {
        (gain * value as f32 + offset).abs().round().clamp(0.0, 255.0) as u8
    })
}

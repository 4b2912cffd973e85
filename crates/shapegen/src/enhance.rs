//! Optional image enhancement ahead of segmentation.
//!
//! Each factor is 1.0 for "unchanged". Brightness scales toward black,
//! contrast toward the mean grey level, sharpness toward a 3x3 smoothed copy.
//! Factors above 1.0 extrapolate away from the degenerate image.

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{ShapeError, ShapeResult};

const SMOOTH_KERNEL: [[f32; 3]; 3] = [[1.0, 1.0, 1.0], [1.0, 5.0, 1.0], [1.0, 1.0, 1.0]];
const SMOOTH_WEIGHT: f32 = 13.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageEnhancer {
    pub brightness: f32,
    pub contrast: f32,
    pub sharpness: f32,
    /// 3x3 median filter after the other adjustments.
    pub denoise: bool,
}

impl Default for ImageEnhancer {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.0,
            sharpness: 1.0,
            denoise: false,
        }
    }
}

impl ImageEnhancer {
    pub fn validate(&self) -> ShapeResult<()> {
        for (field, value) in [
            ("enhance.brightness", self.brightness),
            ("enhance.contrast", self.contrast),
            ("enhance.sharpness", self.sharpness),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ShapeError::invalid_config(
                    field,
                    format!("must be a non-negative number, got {}", value),
                ));
            }
        }
        Ok(())
    }

    /// True when [`enhance`](Self::enhance) would return its input.
    pub fn is_identity(&self) -> bool {
        self.brightness == 1.0 && self.contrast == 1.0 && self.sharpness == 1.0 && !self.denoise
    }

    pub fn enhance(&self, image: &RgbaImage) -> RgbaImage {
        let mut out = image.clone();
        if self.brightness != 1.0 {
            let black = RgbaImage::new(out.width(), out.height());
            out = interpolate(&black, &out, self.brightness);
        }
        if self.contrast != 1.0 {
            let mean = mean_luma(&out);
            let grey = RgbaImage::from_pixel(out.width(), out.height(), Rgba([mean, mean, mean, 0]));
            out = interpolate(&grey, &out, self.contrast);
        }
        if self.sharpness != 1.0 {
            out = interpolate(&smooth(&out), &out, self.sharpness);
        }
        if self.denoise {
            out = median3(&out);
        }
        out
    }
}

/// `degenerate + factor * (image - degenerate)` on RGB; alpha is kept.
fn interpolate(degenerate: &RgbaImage, image: &RgbaImage, factor: f32) -> RgbaImage {
    let mut out = image.clone();
    for (o, d) in out.pixels_mut().zip(degenerate.pixels()) {
        for c in 0..3 {
            let v = d.0[c] as f32 + factor * (o.0[c] as f32 - d.0[c] as f32);
            o.0[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Mean ITU-R 601 luma, rounded.
fn mean_luma(image: &RgbaImage) -> u8 {
    let n = image.width() as u64 * image.height() as u64;
    if n == 0 {
        return 0;
    }
    let sum: u64 = image
        .pixels()
        .map(|p| (p.0[0] as u64 * 299 + p.0[1] as u64 * 587 + p.0[2] as u64 * 114) / 1000)
        .sum();
    ((sum as f64 / n as f64) + 0.5) as u8
}

/// 3x3 smoothing; border pixels are copied unchanged.
fn smooth(image: &RgbaImage) -> RgbaImage {
    let (w, h) = image.dimensions();
    let mut out = image.clone();
    if w < 3 || h < 3 {
        return out;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut acc = [0.0f32; 3];
            for (ky, row) in SMOOTH_KERNEL.iter().enumerate() {
                for (kx, &k) in row.iter().enumerate() {
                    let p = image.get_pixel(x + kx as u32 - 1, y + ky as u32 - 1);
                    for c in 0..3 {
                        acc[c] += k * p.0[c] as f32;
                    }
                }
            }
            let px = out.get_pixel_mut(x, y);
            for c in 0..3 {
                px.0[c] = (acc[c] / SMOOTH_WEIGHT).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

/// 3x3 median per channel, with edges clamped.
fn median3(image: &RgbaImage) -> RgbaImage {
    let (w, h) = image.dimensions();
    let mut out = image.clone();
    for y in 0..h {
        for x in 0..w {
            let mut window = [[0u8; 9]; 4];
            let mut i = 0;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let sx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
                    let sy = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
                    let p = image.get_pixel(sx, sy);
                    for c in 0..4 {
                        window[c][i] = p.0[c];
                    }
                    i += 1;
                }
            }
            let px = out.get_pixel_mut(x, y);
            for c in 0..4 {
                window[c].sort_unstable();
                px.0[c] = window[c][4];
            }
        }
    }
    out
}

//! Photometric alignment of multi-view input.
//!
//! Non-reference views are corrected toward the reference view with one of
//! three methods:
//!
//! | Method | Operates on | Uses reference |
//! |--------|-------------|----------------|
//! | [`LightingMethod::HistogramMatching`] | R, G, B independently | yes |
//! | [`LightingMethod::ColorTransfer`] | CIE Lab mean and std | yes |
//! | [`LightingMethod::AutoExposure`] | CLAHE on Lab lightness | no |
//!
//! Alpha is never modified. When strength is below 1.0 the corrected image
//! is blended linearly with the original.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LightingConfig;
use crate::error::ShapeError;
use crate::views::ViewName;

/// CLAHE clip limit, relative to a uniform histogram.
pub const CLAHE_CLIP_LIMIT: f32 = 2.0;

/// CLAHE tile grid is `CLAHE_TILES x CLAHE_TILES`.
pub const CLAHE_TILES: u32 = 8;

/// Correction method applied to non-reference views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingMethod {
    #[default]
    HistogramMatching,
    ColorTransfer,
    AutoExposure,
}

impl LightingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LightingMethod::HistogramMatching => "histogram_matching",
            LightingMethod::ColorTransfer => "color_transfer",
            LightingMethod::AutoExposure => "auto_exposure",
        }
    }
}

impl FromStr for LightingMethod {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "histogram_matching" | "histogram" => Ok(LightingMethod::HistogramMatching),
            "color_transfer" => Ok(LightingMethod::ColorTransfer),
            "auto_exposure" | "clahe" => Ok(LightingMethod::AutoExposure),
            _ => Err(ShapeError::invalid_config(
                "lighting.method",
                format!(
                    "'{}' is not one of histogram_matching, color_transfer, auto_exposure",
                    s
                ),
            )),
        }
    }
}

impl fmt::Display for LightingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies the configured correction to views or single images.
#[derive(Debug, Clone)]
pub struct LightingNormalizer {
    pub reference_view: ViewName,
    pub method: LightingMethod,
    /// Clamped to `0.0..=1.0`.
    pub strength: f32,
}

impl Default for LightingNormalizer {
    fn default() -> Self {
        Self::from_config(&LightingConfig::default())
    }
}

impl LightingNormalizer {
    pub fn from_config(config: &LightingConfig) -> Self {
        Self {
            reference_view: config.reference_view,
            method: config.method,
            strength: config.strength.clamp(0.0, 1.0),
        }
    }

    /// Correct `source` toward `reference` and blend by strength.
    pub fn correct(&self, source: &RgbaImage, reference: &RgbaImage) -> RgbaImage {
        let corrected = match self.method {
            LightingMethod::HistogramMatching => match_histograms(source, reference),
            LightingMethod::ColorTransfer => color_transfer(source, reference),
            LightingMethod::AutoExposure => auto_exposure(source),
        };
        self.blend(source, corrected)
    }

    /// Auto-exposure for a lone image, blended by strength.
    pub fn normalize_single(&self, image: &RgbaImage) -> RgbaImage {
        self.blend(image, auto_exposure(image))
    }

    /// Correct every view except the reference, in place.
    ///
    /// Returns the reference actually used: the configured one if present,
    /// otherwise the first view in canonical order. `None` if `views` is empty.
    pub fn normalize_views(&self, views: &mut BTreeMap<ViewName, RgbaImage>) -> Option<ViewName> {
        let reference_name = if views.contains_key(&self.reference_view) {
            self.reference_view
        } else {
            *views.keys().next()?
        };
        let reference = views.get(&reference_name)?.clone();

        views
            .par_iter_mut()
            .filter(|(name, _)| **name != reference_name)
            .for_each(|(_, image)| *image = self.correct(image, &reference));

        debug!(
            reference = %reference_name,
            method = %self.method,
            strength = self.strength,
            views = views.len(),
            "Lighting normalized"
        );
        Some(reference_name)
    }

    fn blend(&self, original: &RgbaImage, corrected: RgbaImage) -> RgbaImage {
        if self.strength < 1.0 {
            blend(original, &corrected, self.strength)
        } else {
            corrected
        }
    }
}

// =============================================================================
// Histogram matching
// =============================================================================

/// 256-bin histogram of one channel (0 = R, 1 = G, 2 = B, 3 = A).
pub fn channel_histogram(image: &RgbaImage, channel: usize) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for px in image.pixels() {
        hist[px.0[channel] as usize] += 1;
    }
    hist
}

fn normalized_cdf(hist: &[u64; 256]) -> Option<[f64; 256]> {
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return None;
    }
    let mut cdf = [0.0; 256];
    let mut running = 0u64;
    for (c, &h) in cdf.iter_mut().zip(hist) {
        running += h;
        *c = running as f64 / total as f64;
    }
    Some(cdf)
}

/// Lookup table mapping each source intensity to the first reference
/// intensity whose cumulative frequency reaches the source's.
///
/// Identity when either histogram is empty.
pub fn histogram_lut(source: &[u64; 256], reference: &[u64; 256]) -> [u8; 256] {
    let mut lut = [0u8; 256];
    let (Some(src_cdf), Some(ref_cdf)) = (normalized_cdf(source), normalized_cdf(reference))
    else {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as u8;
        }
        return lut;
    };

    let mut r = 0usize;
    for (s, out) in lut.iter_mut().enumerate() {
        while r < 255 && ref_cdf[r] < src_cdf[s] {
            r += 1;
        }
        *out = r as u8;
    }
    lut
}

/// Match each RGB channel's histogram of `source` to `reference`.
pub fn match_histograms(source: &RgbaImage, reference: &RgbaImage) -> RgbaImage {
    let luts: [[u8; 256]; 3] = std::array::from_fn(|c| {
        histogram_lut(
            &channel_histogram(source, c),
            &channel_histogram(reference, c),
        )
    });

    let mut out = source.clone();
    for px in out.pixels_mut() {
        for (c, lut) in luts.iter().enumerate() {
            px.0[c] = lut[px.0[c] as usize];
        }
    }
    out
}

// =============================================================================
// Lab conversion
// =============================================================================

const D65_WHITE: [f32; 3] = [0.950_456, 1.0, 1.088_754];
const LAB_DELTA: f32 = 6.0 / 29.0;

fn srgb_to_linear(c: u8) -> f32 {
    let c = c as f32 / 255.0;
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> u8 {
    let c = c.clamp(0.0, 1.0);
    let s = if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (s * 255.0).round().clamp(0.0, 255.0) as u8
}

fn lab_f(t: f32) -> f32 {
    if t > LAB_DELTA.powi(3) {
        t.cbrt()
    } else {
        t / (3.0 * LAB_DELTA * LAB_DELTA) + 4.0 / 29.0
    }
}

fn lab_f_inv(t: f32) -> f32 {
    if t > LAB_DELTA {
        t.powi(3)
    } else {
        3.0 * LAB_DELTA * LAB_DELTA * (t - 4.0 / 29.0)
    }
}

/// sRGB to CIE L*a*b* (D65). L in 0..=100.
pub fn rgb_to_lab([r, g, b]: [u8; 3]) -> [f32; 3] {
    let (r, g, b) = (srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b));
    let x = 0.412_453 * r + 0.357_580 * g + 0.180_423 * b;
    let y = 0.212_671 * r + 0.715_160 * g + 0.072_169 * b;
    let z = 0.019_334 * r + 0.119_193 * g + 0.950_227 * b;

    let fx = lab_f(x / D65_WHITE[0]);
    let fy = lab_f(y / D65_WHITE[1]);
    let fz = lab_f(z / D65_WHITE[2]);
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// CIE L*a*b* (D65) back to sRGB, clamped.
pub fn lab_to_rgb([l, a, b]: [f32; 3]) -> [u8; 3] {
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;
    let x = lab_f_inv(fx) * D65_WHITE[0];
    let y = lab_f_inv(fy) * D65_WHITE[1];
    let z = lab_f_inv(fz) * D65_WHITE[2];

    let r = 3.240_479 * x - 1.537_150 * y - 0.498_535 * z;
    let g = -0.969_256 * x + 1.875_991 * y + 0.041_556 * z;
    let b = 0.055_648 * x - 0.204_043 * y + 1.057_311 * z;
    [linear_to_srgb(r), linear_to_srgb(g), linear_to_srgb(b)]
}

fn to_lab(image: &RgbaImage) -> Vec<[f32; 3]> {
    image
        .pixels()
        .map(|px| rgb_to_lab([px.0[0], px.0[1], px.0[2]]))
        .collect()
}

fn from_lab(template: &RgbaImage, lab: &[[f32; 3]]) -> RgbaImage {
    let mut out = template.clone();
    for (px, &lab) in out.pixels_mut().zip(lab) {
        let [r, g, b] = lab_to_rgb(lab);
        *px = Rgba([r, g, b, px.0[3]]);
    }
    out
}

// =============================================================================
// Color transfer
// =============================================================================

fn mean_std(lab: &[[f32; 3]]) -> ([f64; 3], [f64; 3]) {
    let n = lab.len() as f64;
    let mut mean = [0.0f64; 3];
    for p in lab {
        for c in 0..3 {
            mean[c] += p[c] as f64;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n);

    let mut var = [0.0f64; 3];
    for p in lab {
        for c in 0..3 {
            let d = p[c] as f64 - mean[c];
            var[c] += d * d;
        }
    }
    (mean, var.map(|v| (v / n).sqrt()))
}

/// Shift and scale `source`'s Lab statistics onto `reference`'s.
pub fn color_transfer(source: &RgbaImage, reference: &RgbaImage) -> RgbaImage {
    if source.is_empty() || reference.is_empty() {
        return source.clone();
    }
    let mut src = to_lab(source);
    let (src_mean, src_std) = mean_std(&src);
    let (ref_mean, ref_std) = mean_std(&to_lab(reference));

    const LIMITS: [(f32, f32); 3] = [(0.0, 100.0), (-128.0, 127.0), (-128.0, 127.0)];
    for p in &mut src {
        for c in 0..3 {
            let scale = if src_std[c] == 0.0 {
                ref_std[c]
            } else {
                ref_std[c] / src_std[c]
            };
            let v = (p[c] as f64 - src_mean[c]) * scale + ref_mean[c];
            p[c] = (v as f32).clamp(LIMITS[c].0, LIMITS[c].1);
        }
    }
    from_lab(source, &src)
}

// =============================================================================
// Auto exposure (CLAHE)
// =============================================================================

/// Contrast-limited adaptive histogram equalization of an 8-bit plane.
///
/// The plane is split into at most `tiles x tiles` tiles; each tile gets a
/// clipped equalization LUT and pixels interpolate bilinearly between the
/// four nearest tile centres.
pub fn clahe(plane: &[u8], width: u32, height: u32, clip_limit: f32, tiles: u32) -> Vec<u8> {
    if width == 0 || height == 0 || tiles == 0 {
        return plane.to_vec();
    }
    let (w, h) = (width as usize, height as usize);
    let tile_w = w.div_ceil(tiles.min(width) as usize);
    let tile_h = h.div_ceil(tiles.min(height) as usize);
    let tiles_x = w.div_ceil(tile_w);
    let tiles_y = h.div_ceil(tile_h);

    let mut luts = vec![[0u8; 256]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let (x0, x1) = (tx * tile_w, ((tx + 1) * tile_w).min(w));
            let (y0, y1) = (ty * tile_h, ((ty + 1) * tile_h).min(h));
            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for &v in &plane[y * w + x0..y * w + x1] {
                    hist[v as usize] += 1;
                }
            }
            let area = ((x1 - x0) * (y1 - y0)) as u32;
            luts[ty * tiles_x + tx] = tile_lut(&mut hist, area, clip_limit);
        }
    }

    let mut out = vec![0u8; plane.len()];
    for y in 0..h {
        let tyf = y as f32 / tile_h as f32 - 0.5;
        let ty1 = tyf.floor();
        let ya = tyf - ty1;
        let ty2 = ((ty1 as i64 + 1).min(tiles_y as i64 - 1)) as usize;
        let ty1 = ty1.max(0.0) as usize;

        for x in 0..w {
            let txf = x as f32 / tile_w as f32 - 0.5;
            let tx1 = txf.floor();
            let xa = txf - tx1;
            let tx2 = ((tx1 as i64 + 1).min(tiles_x as i64 - 1)) as usize;
            let tx1 = tx1.max(0.0) as usize;

            let v = plane[y * w + x] as usize;
            let at = |tx: usize, ty: usize| luts[ty * tiles_x + tx][v] as f32;
            let top = at(tx1, ty1) * (1.0 - xa) + at(tx2, ty1) * xa;
            let bottom = at(tx1, ty2) * (1.0 - xa) + at(tx2, ty2) * xa;
            out[y * w + x] = (top * (1.0 - ya) + bottom * ya).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

fn tile_lut(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    if clip_limit > 0.0 {
        let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > clip {
                excess += *bin - clip;
                *bin = clip;
            }
        }
        let per_bin = excess / 256;
        let residual = (excess % 256) as usize;
        hist.iter_mut().for_each(|bin| *bin += per_bin);
        if residual > 0 {
            let step = (256 / residual).max(1);
            for bin in hist.iter_mut().step_by(step).take(residual) {
                *bin += 1;
            }
        }
    }

    let scale = 255.0 / area.max(1) as f32;
    let mut lut = [0u8; 256];
    let mut running = 0u32;
    for (out, &count) in lut.iter_mut().zip(hist.iter()) {
        running += count;
        *out = (running as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// CLAHE on Lab lightness; chroma and alpha are kept.
pub fn auto_exposure(image: &RgbaImage) -> RgbaImage {
    let mut lab = to_lab(image);
    let lightness: Vec<u8> = lab
        .iter()
        .map(|p| (p[0] * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8)
        .collect();
    let equalized = clahe(
        &lightness,
        image.width(),
        image.height(),
        CLAHE_CLIP_LIMIT,
        CLAHE_TILES,
    );
    for (p, &l) in lab.iter_mut().zip(&equalized) {
        p[0] = l as f32 * 100.0 / 255.0;
    }
    from_lab(image, &lab)
}

/// Linear blend: `strength` 1.0 yields `corrected`, 0.0 yields `original`.
pub fn blend(original: &RgbaImage, corrected: &RgbaImage, strength: f32) -> RgbaImage {
    let s = strength.clamp(0.0, 1.0);
    let mut out = original.clone();
    for (o, c) in out.pixels_mut().zip(corrected.pixels()) {
        for i in 0..4 {
            let v = o.0[i] as f32 * (1.0 - s) + c.0[i] as f32 * s;
            o.0[i] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32, offset: u8) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            let v = ((x + y) % 128) as u8;
            Rgba([v + offset, v / 2 + offset, 127 - v + offset, 200])
        })
    }

    #[test]
    fn test_histogram_self_match_is_identity() {
        let img = gradient(32, 24, 40);
        for c in 0..3 {
            let hist = channel_histogram(&img, c);
            let lut = histogram_lut(&hist, &hist);
            for (v, &count) in hist.iter().enumerate() {
                if count > 0 {
                    assert_eq!(lut[v] as usize, v);
                }
            }
        }
        assert_eq!(match_histograms(&img, &img), img);
    }

    #[test]
    fn test_histogram_match_brightens_dark_view() {
        let dark = gradient(16, 16, 0);
        let bright = gradient(16, 16, 100);
        let matched = match_histograms(&dark, &bright);

        let mean = |img: &RgbaImage| {
            img.pixels().map(|p| p.0[0] as f64).sum::<f64>() / (img.width() * img.height()) as f64
        };
        assert!(mean(&matched) > mean(&dark) + 50.0);
        assert!(matched.pixels().all(|p| p.0[3] == 200));
    }

    #[test]
    fn test_empty_histogram_gives_identity_lut() {
        let lut = histogram_lut(&[0; 256], &[1; 256]);
        assert!(lut.iter().enumerate().all(|(i, &v)| v as usize == i));
    }

    #[test]
    fn test_lab_round_trip() {
        for rgb in [[0, 0, 0], [255, 255, 255], [200, 30, 90], [12, 180, 240]] {
            let back = lab_to_rgb(rgb_to_lab(rgb));
            for c in 0..3 {
                assert!((back[c] as i32 - rgb[c] as i32).abs() <= 1, "{:?} -> {:?}", rgb, back);
            }
        }
        let white = rgb_to_lab([255, 255, 255]);
        assert!((white[0] - 100.0).abs() < 0.1);
    }

    #[test]
    fn test_color_transfer_self_is_near_identity() {
        let img = gradient(16, 16, 30);
        let out = color_transfer(&img, &img);
        for (a, b) in img.pixels().zip(out.pixels()) {
            for c in 0..3 {
                assert!((a.0[c] as i32 - b.0[c] as i32).abs() <= 2);
            }
            assert_eq!(a.0[3], b.0[3]);
        }
    }

    #[test]
    fn test_clahe_single_tile_unclipped_is_equalization() {
        let (w, h) = (8u32, 8u32);
        let plane: Vec<u8> = (0..w * h).map(|i| if i < 32 { 100 } else { 110 }).collect();
        let out = clahe(&plane, w, h, 1000.0, 1);
        assert!(out[..32].iter().all(|&v| v == 128));
        assert!(out[32..].iter().all(|&v| v == 255));
    }

    #[test]
    fn test_auto_exposure_keeps_alpha_and_size() {
        let img = gradient(40, 30, 10);
        let out = auto_exposure(&img);
        assert_eq!(out.dimensions(), img.dimensions());
        assert!(out.pixels().all(|p| p.0[3] == 200));
    }

    #[test]
    fn test_zero_strength_leaves_views_unchanged() {
        let normalizer = LightingNormalizer {
            strength: 0.0,
            ..Default::default()
        };
        let mut views = BTreeMap::new();
        views.insert(ViewName::Front, gradient(8, 8, 100));
        views.insert(ViewName::Left, gradient(8, 8, 0));
        let before = views.clone();

        normalizer.normalize_views(&mut views);
        assert_eq!(views, before);
    }

    #[test]
    fn test_missing_reference_falls_back() {
        let normalizer = LightingNormalizer::default();
        let mut views = BTreeMap::new();
        let left = gradient(8, 8, 100);
        views.insert(ViewName::Left, left.clone());
        views.insert(ViewName::Back, gradient(8, 8, 0));

        assert_eq!(normalizer.normalize_views(&mut views), Some(ViewName::Left));
        assert_eq!(views[&ViewName::Left], left);
        assert_ne!(views[&ViewName::Back], gradient(8, 8, 0));

        assert_eq!(normalizer.normalize_views(&mut BTreeMap::new()), None);
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(
            "color-transfer".parse::<LightingMethod>().unwrap(),
            LightingMethod::ColorTransfer
        );
        assert!("retinex".parse::<LightingMethod>().unwrap_err().is_validation());
    }
}

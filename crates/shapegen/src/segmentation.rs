//! Background removal.
//!
//! The service treats the segmentation model as an opaque [`Segmenter`]. The
//! only built-in implementation, [`AlphaSegmenter`], reuses an existing alpha
//! channel as the mask and is meant for already-cut-out input.

use image::{GrayImage, Luma, RgbaImage, imageops};

use crate::error::BoxError;

/// Output of one segmentation call.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    /// Input with the mask written to its alpha channel.
    pub image: RgbaImage,
    /// Foreground mask, 255 = object.
    pub mask: GrayImage,
}

impl Segmentation {
    /// Build from an image and a mask of any size.
    ///
    /// Segmentation models usually run at a fixed resolution; the mask is
    /// resized to the image before being applied as alpha.
    pub fn from_mask(image: &RgbaImage, mask: &GrayImage) -> Self {
        let (w, h) = image.dimensions();
        let mask = if mask.dimensions() == (w, h) {
            mask.clone()
        } else {
            imageops::resize(mask, w, h, imageops::FilterType::Triangle)
        };
        let mut image = image.clone();
        for (px, m) in image.pixels_mut().zip(mask.pixels()) {
            px.0[3] = m.0[0];
        }
        Self { image, mask }
    }
}

/// A background remover.
pub trait Segmenter: Send + Sync {
    fn segment(&self, image: &RgbaImage) -> Result<Segmentation, BoxError>;
}

/// Uses the input's own alpha channel, thresholded, as the mask.
#[derive(Debug, Clone, Copy)]
pub struct AlphaSegmenter {
    /// Alpha values at or above this are foreground.
    pub threshold: u8,
}

impl Default for AlphaSegmenter {
    fn default() -> Self {
        Self { threshold: 128 }
    }
}

impl Segmenter for AlphaSegmenter {
    fn segment(&self, image: &RgbaImage) -> Result<Segmentation, BoxError> {
        let mask = GrayImage::from_fn(image.width(), image.height(), |x, y| {
            let alpha = image.get_pixel(x, y).0[3];
            Luma([if alpha >= self.threshold { 255 } else { 0 }])
        });
        Ok(Segmentation::from_mask(image, &mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_alpha_segmenter_thresholds() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([50, 60, 70, 255]));
        img.put_pixel(0, 0, Rgba([50, 60, 70, 10]));

        let seg = AlphaSegmenter::default().segment(&img).unwrap();
        assert_eq!(seg.mask.get_pixel(0, 0).0, [0]);
        assert_eq!(seg.mask.get_pixel(1, 1).0, [255]);
        assert_eq!(seg.image.get_pixel(0, 0).0, [50, 60, 70, 0]);
        assert_eq!(seg.image.dimensions(), img.dimensions());
    }

    #[test]
    fn test_mask_resized_to_image() {
        let img = RgbaImage::from_pixel(64, 48, Rgba([1, 2, 3, 255]));
        let mask = GrayImage::from_pixel(16, 16, Luma([255]));
        let seg = Segmentation::from_mask(&img, &mask);
        assert_eq!(seg.mask.dimensions(), (64, 48));
        assert!(seg.image.pixels().all(|p| p.0[3] == 255));
    }
}

//! Image and view preprocessing ahead of inference.

use std::collections::BTreeMap;
use std::sync::Arc;

use image::{GrayImage, RgbaImage};
use tracing::{debug, info};

use crate::config::GenerationConfig;
use crate::error::{ShapeError, ShapeResult};
use crate::lighting::LightingNormalizer;
use crate::segmentation::{AlphaSegmenter, Segmenter};
use crate::views::{ImageSource, ViewName, ViewSet};

/// A single image ready for inference.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub image: RgbaImage,
    /// Present when background removal ran.
    pub mask: Option<GrayImage>,
}

/// A validated view set ready for inference, in canonical order.
#[derive(Debug, Clone, Default)]
pub struct ProcessedViews {
    pub views: BTreeMap<ViewName, RgbaImage>,
    pub masks: BTreeMap<ViewName, GrayImage>,
    /// Reference used for lighting, if normalization ran.
    pub lighting_reference: Option<ViewName>,
}

impl ProcessedViews {
    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    pub fn available_views(&self) -> Vec<ViewName> {
        self.views.keys().copied().collect()
    }
}

/// Loads, enhances, segments, and lighting-corrects input images.
#[derive(Clone)]
pub struct Preprocessor {
    segmenter: Arc<dyn Segmenter>,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(Arc::new(AlphaSegmenter::default()))
    }
}

impl Preprocessor {
    pub fn new(segmenter: Arc<dyn Segmenter>) -> Self {
        Self { segmenter }
    }

    fn prepare(
        &self,
        source: &ImageSource,
        config: &GenerationConfig,
    ) -> ShapeResult<(RgbaImage, Option<GrayImage>)> {
        let mut image = source.load_rgba()?;
        if let Some(enhancer) = config.enhance.as_ref().filter(|e| !e.is_identity()) {
            image = enhancer.enhance(&image);
        }
        if !config.remove_background {
            return Ok((image, None));
        }
        let seg = self
            .segmenter
            .segment(&image)
            .map_err(|source| ShapeError::Segmentation { source })?;
        Ok((seg.image, Some(seg.mask)))
    }

    /// Prepare a single-image request.
    pub fn prepare_image(
        &self,
        source: &ImageSource,
        config: &GenerationConfig,
    ) -> ShapeResult<PreparedImage> {
        let (mut image, mask) = self.prepare(source, config)?;
        if config.lighting.single_image_exposure {
            image = LightingNormalizer::from_config(&config.lighting).normalize_single(&image);
        }
        debug!(
            width = image.width(),
            height = image.height(),
            segmented = mask.is_some(),
            "Image prepared"
        );
        Ok(PreparedImage { image, mask })
    }

    /// Validate and prepare a multi-view request.
    ///
    /// Fails with [`ShapeError::MissingFrontView`] before touching any image
    /// when the set has no front view.
    pub fn prepare_views(
        &self,
        views: &ViewSet,
        config: &GenerationConfig,
    ) -> ShapeResult<ProcessedViews> {
        views.require_front()?;

        let mut processed = ProcessedViews::default();
        for (name, source) in views.iter() {
            let (image, mask) = self.prepare(source, config)?;
            processed.views.insert(name, image);
            if let Some(mask) = mask {
                processed.masks.insert(name, mask);
            }
        }

        if config.lighting.normalize && processed.views.len() > 1 {
            let normalizer = LightingNormalizer::from_config(&config.lighting);
            processed.lighting_reference = normalizer.normalize_views(&mut processed.views);
        }

        info!(
            views = ?processed.available_views(),
            lighting = ?processed.lighting_reference,
            "Views prepared"
        );
        Ok(processed)
    }
}

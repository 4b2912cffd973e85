//! View names, image sources, and multi-view input sets.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{ShapeError, ShapeResult};

/// View names in canonical order.
pub const VIEW_ORDER: [&str; 4] = ["front", "left", "back", "right"];

/// One of the four fixed camera positions.
///
/// Ordering follows [`VIEW_ORDER`], so ordered maps keyed by `ViewName`
/// iterate front, left, back, right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewName {
    Front,
    Left,
    Back,
    Right,
}

impl ViewName {
    pub const ALL: [ViewName; 4] = [ViewName::Front, ViewName::Left, ViewName::Back, ViewName::Right];

    pub fn as_str(&self) -> &'static str {
        VIEW_ORDER[*self as usize]
    }
}

impl FromStr for ViewName {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ViewName::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ShapeError::UnknownView {
                name: s.to_string(),
            })
    }
}

impl fmt::Display for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An image that is either already decoded or still on disk.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Decoded(DynamicImage),
    Path(PathBuf),
}

impl ImageSource {
    /// Decode if needed and convert to RGBA8.
    pub fn load_rgba(&self) -> ShapeResult<RgbaImage> {
        match self {
            ImageSource::Decoded(img) => Ok(img.to_rgba8()),
            ImageSource::Path(path) => load_rgba(path),
        }
    }
}

impl From<DynamicImage> for ImageSource {
    fn from(img: DynamicImage) -> Self {
        ImageSource::Decoded(img)
    }
}

impl From<RgbaImage> for ImageSource {
    fn from(img: RgbaImage) -> Self {
        ImageSource::Decoded(DynamicImage::ImageRgba8(img))
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        ImageSource::Path(path.to_path_buf())
    }
}

/// Open an image file as RGBA8.
pub fn load_rgba(path: &Path) -> ShapeResult<RgbaImage> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|source| ShapeError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })
}

/// A set of named views.
///
/// Only the four fixed names can be stored. The set may lack `front`; use
/// [`validate`](Self::validate) or [`require_front`](Self::require_front)
/// before handing it to inference.
#[derive(Debug, Clone, Default)]
pub struct ViewSet {
    views: BTreeMap<ViewName, ImageSource>,
}

impl ViewSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from string-keyed pairs, rejecting unknown names.
    pub fn from_named<I, S>(pairs: I) -> ShapeResult<Self>
    where
        I: IntoIterator<Item = (S, ImageSource)>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for (name, source) in pairs {
            set.insert(name.as_ref().parse()?, source);
        }
        Ok(set)
    }

    /// Add or replace a view.
    pub fn insert(&mut self, name: ViewName, source: impl Into<ImageSource>) {
        self.views.insert(name, source.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: ViewName, source: impl Into<ImageSource>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn get(&self, name: ViewName) -> Option<&ImageSource> {
        self.views.get(&name)
    }

    /// Remove and return a view.
    pub fn take(&mut self, name: ViewName) -> Option<ImageSource> {
        self.views.remove(&name)
    }

    /// True when the set contains a front view.
    pub fn validate(&self) -> bool {
        self.views.contains_key(&ViewName::Front)
    }

    pub fn require_front(&self) -> ShapeResult<()> {
        if self.validate() {
            Ok(())
        } else {
            Err(ShapeError::MissingFrontView)
        }
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// View names present, in canonical order.
    pub fn available_views(&self) -> Vec<ViewName> {
        self.views.keys().copied().collect()
    }

    /// Views in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (ViewName, &ImageSource)> {
        self.views.iter().map(|(name, src)| (*name, src))
    }
}

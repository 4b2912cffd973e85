//! Request and service configuration.
//!
//! All structs deserialize with `#[serde(default)]`, so a partial TOML or
//! JSON document fills in the rest from [`Default`]. Call `validate()` before
//! use; deserialization does not check ranges.
//!
//! # Example service TOML
//!
//! ```toml
//! weights_dir = "/srv/weights"
//! default_model = "hunyuan3d-2.1"
//! auto_load = true
//! device = "auto"
//! ```

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shapegen_gpu::DevicePreference;
use shapegen_mesh::{AdvancedOptimizeConfig, BasicOptimizeConfig, ExportFormat, MIN_HOLE_SIZE};
use tracing::debug;

use crate::error::{ShapeError, ShapeResult};
use crate::lighting::LightingMethod;
use crate::model::ModelKind;
use crate::views::ViewName;

/// Resolved input mode of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    SingleImage,
    MultiView,
}

/// Requested input mode; `Auto` derives it from the input shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputModeSelection {
    #[default]
    Auto,
    Single,
    Multi,
}

/// Multi-view lighting correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    /// Correct non-reference views against the reference. Default: true
    pub normalize: bool,
    pub method: LightingMethod,
    /// Falls back to the first available view when absent. Default: front
    pub reference_view: ViewName,
    /// 1.0 applies the full correction, 0.0 leaves images unchanged.
    pub strength: f32,
    /// Run auto-exposure on single-image input. Default: false
    pub single_image_exposure: bool,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            normalize: true,
            method: LightingMethod::default(),
            reference_view: ViewName::Front,
            strength: 1.0,
            single_image_exposure: false,
        }
    }
}

/// Mesh repair switches and tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    pub fill_holes: bool,
    /// Largest hole closed, in boundary edges. Default: 100
    pub max_hole_size: usize,
    pub make_watertight: bool,
    pub smooth_surface: bool,
    /// Default: 2
    pub smooth_iterations: usize,
    pub recalculate_normals: bool,
    /// Components below this share of faces are dropped. Default: 0.005
    pub floater_ratio: f64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        let basic = BasicOptimizeConfig::default();
        let advanced = AdvancedOptimizeConfig::default();
        Self {
            fill_holes: false,
            max_hole_size: advanced.max_hole_size,
            make_watertight: false,
            smooth_surface: false,
            smooth_iterations: advanced.smooth_iterations,
            recalculate_normals: false,
            floater_ratio: basic.floater_ratio,
        }
    }
}

impl RepairConfig {
    /// True if any advanced step is enabled.
    pub fn any_advanced(&self) -> bool {
        self.fill_holes || self.make_watertight || self.smooth_surface || self.recalculate_normals
    }

    pub fn advanced(&self) -> AdvancedOptimizeConfig {
        AdvancedOptimizeConfig {
            make_watertight: self.make_watertight,
            fill_holes: self.fill_holes,
            max_hole_size: self.max_hole_size,
            smooth: self.smooth_surface,
            smooth_iterations: self.smooth_iterations,
            recalculate_normals: self.recalculate_normals,
            ..Default::default()
        }
    }
}

/// Per-request generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Diffusion steps, 1..=100. Default: 50
    pub num_inference_steps: u32,
    /// Classifier-free guidance, 0..=20. Default: 5.0
    pub guidance_scale: f32,
    /// Octree resolution, 128..=512. Default: 384
    pub octree_resolution: u32,
    pub remove_background: bool,
    /// Apply brightness/contrast/sharpness/denoise before segmentation.
    pub enhance: Option<crate::enhance::ImageEnhancer>,
    pub optimize_mesh: bool,
    /// Face budget for decimation, 1000..=200000. Default: 40000
    pub max_faces: usize,
    pub output_format: ExportFormat,
    pub input_mode: InputModeSelection,
    pub lighting: LightingConfig,
    pub repair: RepairConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            num_inference_steps: 50,
            guidance_scale: 5.0,
            octree_resolution: 384,
            remove_background: true,
            enhance: None,
            optimize_mesh: true,
            max_faces: 40_000,
            output_format: ExportFormat::Glb,
            input_mode: InputModeSelection::Auto,
            lighting: LightingConfig::default(),
            repair: RepairConfig::default(),
        }
    }
}

pub const STEPS_RANGE: RangeInclusive<u32> = 1..=100;
pub const GUIDANCE_RANGE: RangeInclusive<f32> = 0.0..=20.0;
pub const OCTREE_RANGE: RangeInclusive<u32> = 128..=512;
pub const MAX_FACES_RANGE: RangeInclusive<usize> = 1_000..=200_000;
pub const SMOOTH_ITERATIONS_RANGE: RangeInclusive<usize> = 1..=50;

fn check_range<T>(field: &'static str, value: T, range: &RangeInclusive<T>) -> ShapeResult<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ShapeError::invalid_config(
            field,
            format!("must be in {}..={}, got {}", range.start(), range.end(), value),
        ))
    }
}

fn read_config(path: &Path) -> ShapeResult<String> {
    let content = std::fs::read_to_string(path).map_err(|source| ShapeError::ConfigIo {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "Read config file");
    Ok(content)
}

impl GenerationConfig {
    /// Parse and validate. Missing fields take their defaults.
    pub fn from_toml(toml_str: &str) -> ShapeResult<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> ShapeResult<Self> {
        Self::from_toml(&read_config(path)?)
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> ShapeResult<()> {
        check_range("num_inference_steps", self.num_inference_steps, &STEPS_RANGE)?;
        check_range("guidance_scale", self.guidance_scale, &GUIDANCE_RANGE)?;
        check_range("octree_resolution", self.octree_resolution, &OCTREE_RANGE)?;
        check_range("max_faces", self.max_faces, &MAX_FACES_RANGE)?;
        self.lighting.validate()?;
        self.repair.validate()?;
        if let Some(enhancer) = &self.enhance {
            enhancer.validate()?;
        }
        Ok(())
    }

    /// Settings for the basic mesh stage.
    pub fn basic(&self) -> BasicOptimizeConfig {
        BasicOptimizeConfig {
            max_faces: self.max_faces,
            floater_ratio: self.repair.floater_ratio,
            ..Default::default()
        }
    }
}

impl LightingConfig {
    pub fn validate(&self) -> ShapeResult<()> {
        check_range("lighting.strength", self.strength, &(0.0..=1.0))
    }
}

impl RepairConfig {
    pub fn validate(&self) -> ShapeResult<()> {
        if self.max_hole_size < MIN_HOLE_SIZE {
            return Err(ShapeError::invalid_config(
                "repair.max_hole_size",
                format!("must be at least {}", MIN_HOLE_SIZE),
            ));
        }
        check_range(
            "repair.smooth_iterations",
            self.smooth_iterations,
            &SMOOTH_ITERATIONS_RANGE,
        )?;
        if !(0.0..1.0).contains(&self.floater_ratio) {
            return Err(ShapeError::invalid_config(
                "repair.floater_ratio",
                format!("must be in [0, 1), got {}", self.floater_ratio),
            ));
        }
        Ok(())
    }
}

/// How the service is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Root of the model weights. Default: `weights`
    pub weights_dir: PathBuf,
    /// Model loaded at construction when `auto_load` is set.
    pub default_model: ModelKind,
    pub auto_load: bool,
    pub device: DevicePreference,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            weights_dir: PathBuf::from("weights"),
            default_model: ModelKind::SingleImage,
            auto_load: true,
            device: DevicePreference::Auto,
        }
    }
}

impl ServiceConfig {
    pub fn from_toml(toml_str: &str) -> ShapeResult<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn from_toml_file(path: &Path) -> ShapeResult<Self> {
        Self::from_toml(&read_config(path)?)
    }

    /// Directory holding the background remover weights.
    pub fn segmentation_weights(&self) -> PathBuf {
        self.weights_dir.join("BiRefNet")
    }
}

//! Basic and advanced optimization stages.
//!
//! The basic stage removes floaters, decimates to a face budget, and runs the
//! canonical cleanup. The advanced stage runs watertight repair, hole filling,
//! smoothing, and normal recomputation. Every advanced sub-step is
//! best-effort: a failure is recorded as a [`RepairWarning`] and the mesh is
//! carried forward unchanged by that step.
//!
//! # Example TOML
//!
//! ```toml
//! fill_holes = true
//! max_hole_size = 64
//! smooth = true
//! smooth_iterations = 3
//! ```

use std::fmt;

use tracing::{debug, info, warn};

use crate::Mesh;
use crate::cleanup::canonical_cleanup;
use crate::components::{DEFAULT_FLOATER_RATIO, remove_floaters};
use crate::decimate::{DecimateParams, decimate_mesh};
use crate::error::{MeshError, MeshResult};
use crate::holes::{DEFAULT_MAX_HOLE_SIZE, fill_holes};
use crate::normals::{compute_face_normals, compute_vertex_normals, orient_faces_coherently};
use crate::repair::{
    DEFAULT_NULL_AREA, DEFAULT_WELD_EPSILON, fix_non_manifold_edges, fix_non_manifold_vertices,
    merge_duplicate_vertices, remove_duplicate_faces, remove_null_faces,
};
use crate::smooth::{SmoothParams, cotangent_smooth, taubin_smooth};
use crate::tracing_ext::{OperationTimer, log_stage_delta};

/// Default face budget for the basic stage.
pub const DEFAULT_MAX_FACES: usize = 40_000;

/// Default smoothing iteration count.
pub const DEFAULT_SMOOTH_ITERATIONS: usize = 2;

/// A repair sub-step that failed and was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct RepairWarning {
    /// Name of the sub-step, e.g. `fill_holes`.
    pub step: String,
    /// Error code of the underlying failure, e.g. `MESH-3002`.
    pub code: String,
    pub message: String,
}

impl RepairWarning {
    fn from_error(step: &str, err: &MeshError) -> Self {
        Self {
            step: step.to_string(),
            code: err.code().as_str().to_string(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for RepairWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.step, self.message)
    }
}

/// Output of a stage: the mesh plus any warnings raised along the way.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub mesh: Mesh,
    pub warnings: Vec<RepairWarning>,
}

impl StageOutcome {
    /// Wrap a mesh with no warnings.
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh,
            warnings: Vec::new(),
        }
    }

    /// True if every sub-step succeeded.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Run `op` on a copy of the mesh; keep the copy only on success.
    fn attempt<T>(
        &mut self,
        step: &'static str,
        op: impl FnOnce(&mut Mesh) -> MeshResult<T>,
    ) -> Option<T> {
        let mut candidate = self.mesh.clone();
        match op(&mut candidate) {
            Ok(value) => {
                self.mesh = candidate;
                Some(value)
            }
            Err(err) => {
                warn!(step, code = %err.code(), "Repair step skipped: {}", err);
                self.warnings.push(RepairWarning::from_error(step, &err));
                None
            }
        }
    }
}

/// Settings for the basic stage.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct BasicOptimizeConfig {
    /// Target face count for decimation. Default: 40000
    pub max_faces: usize,
    /// Components smaller than this fraction of all faces are floaters. Default: 0.005
    pub floater_ratio: f64,
    /// Remove floaters before decimating. Default: true
    pub remove_floaters: bool,
    /// Run the canonical cleanup after decimating. Default: true
    pub cleanup: bool,
}

impl Default for BasicOptimizeConfig {
    fn default() -> Self {
        Self {
            max_faces: DEFAULT_MAX_FACES,
            floater_ratio: DEFAULT_FLOATER_RATIO,
            remove_floaters: true,
            cleanup: true,
        }
    }
}

impl BasicOptimizeConfig {
    /// Default settings with the given face budget.
    pub fn with_max_faces(max_faces: usize) -> Self {
        Self {
            max_faces,
            ..Default::default()
        }
    }
}

/// Settings for the advanced stage. All steps are off by default.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct AdvancedOptimizeConfig {
    pub make_watertight: bool,
    pub fill_holes: bool,
    /// Largest hole, in boundary edges, that will be closed. Default: 100
    pub max_hole_size: usize,
    pub smooth: bool,
    /// Default: 2
    pub smooth_iterations: usize,
    /// Taubin shrink factor. Default: 0.5
    pub smooth_lambda: f64,
    /// Taubin inflate factor. Default: -0.53
    pub smooth_mu: f64,
    pub recalculate_normals: bool,
}

impl Default for AdvancedOptimizeConfig {
    fn default() -> Self {
        let smooth = SmoothParams::default();
        Self {
            make_watertight: false,
            fill_holes: false,
            max_hole_size: DEFAULT_MAX_HOLE_SIZE,
            smooth: false,
            smooth_iterations: DEFAULT_SMOOTH_ITERATIONS,
            smooth_lambda: smooth.lambda,
            smooth_mu: smooth.mu,
            recalculate_normals: false,
        }
    }
}

impl AdvancedOptimizeConfig {
    /// Every step enabled with default parameters.
    pub fn all() -> Self {
        Self {
            make_watertight: true,
            fill_holes: true,
            smooth: true,
            recalculate_normals: true,
            ..Default::default()
        }
    }

    /// True if at least one step is enabled.
    pub fn any_enabled(&self) -> bool {
        self.make_watertight || self.fill_holes || self.smooth || self.recalculate_normals
    }

    fn smooth_params(&self) -> SmoothParams {
        SmoothParams {
            iterations: self.smooth_iterations,
            lambda: self.smooth_lambda,
            mu: self.smooth_mu,
            preserve_boundary: false,
        }
    }
}

/// Errors from loading or saving optimizer settings.
#[cfg(feature = "pipeline-config")]
#[derive(Debug, thiserror::Error)]
pub enum OptimizeConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

macro_rules! config_serialization {
    ($ty:ty) => {
        #[cfg(feature = "pipeline-config")]
        impl $ty {
            /// Parse from a TOML string. Missing keys take their defaults.
            pub fn from_toml(toml_str: &str) -> Result<Self, OptimizeConfigError> {
                Ok(toml::from_str(toml_str)?)
            }

            /// Load from a TOML file.
            pub fn from_toml_file(
                path: impl AsRef<std::path::Path>,
            ) -> Result<Self, OptimizeConfigError> {
                let contents = std::fs::read_to_string(path.as_ref())?;
                Self::from_toml(&contents)
            }

            /// Serialize to a TOML string.
            pub fn to_toml(&self) -> Result<String, OptimizeConfigError> {
                Ok(toml::to_string_pretty(self)?)
            }

            /// Parse from a JSON string.
            pub fn from_json(json_str: &str) -> Result<Self, OptimizeConfigError> {
                Ok(serde_json::from_str(json_str)?)
            }

            /// Serialize to a JSON string.
            pub fn to_json(&self) -> Result<String, OptimizeConfigError> {
                Ok(serde_json::to_string_pretty(self)?)
            }
        }
    };
}

config_serialization!(BasicOptimizeConfig);
config_serialization!(AdvancedOptimizeConfig);

/// Floater removal, decimation, and canonical cleanup.
#[derive(Debug, Clone, Default)]
pub struct BasicOptimizer {
    config: BasicOptimizeConfig,
}

impl BasicOptimizer {
    pub fn new(config: BasicOptimizeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BasicOptimizeConfig {
        &self.config
    }

    /// Run the basic stage.
    ///
    /// Fails only when the input mesh has no faces or invalid indices. A
    /// failed cleanup is recorded as a warning.
    pub fn run(&self, mesh: Mesh) -> MeshResult<StageOutcome> {
        if mesh.faces.is_empty() {
            return Err(MeshError::empty_mesh("basic optimization needs at least one face"));
        }
        mesh.check_indices()?;

        let _timer = OperationTimer::with_mesh("basic_optimize", &mesh);
        let input = mesh.clone();
        let mut outcome = StageOutcome::new(mesh);

        if self.config.remove_floaters {
            let removed = remove_floaters(&mut outcome.mesh, self.config.floater_ratio);
            debug!("Floater removal dropped {} faces", removed);
        }

        if self.config.max_faces < outcome.mesh.face_count() {
            let params = DecimateParams::with_target_faces(self.config.max_faces);
            let result = decimate_mesh(&outcome.mesh, &params);
            debug!(
                "Decimated {} -> {} faces ({} collapses)",
                result.original_faces, result.final_faces, result.collapses_performed
            );
            outcome.mesh = result.mesh;
        } else {
            debug!(
                "Decimation skipped: {} faces within budget of {}",
                outcome.mesh.face_count(),
                self.config.max_faces
            );
        }

        if self.config.cleanup {
            outcome.attempt("canonical_cleanup", canonical_cleanup);
        }

        log_stage_delta("basic_optimize", &input, &outcome.mesh);
        Ok(outcome)
    }
}

/// Watertight repair, hole filling, smoothing, and normal recomputation.
#[derive(Debug, Clone, Default)]
pub struct AdvancedOptimizer {
    config: AdvancedOptimizeConfig,
}

impl AdvancedOptimizer {
    pub fn new(config: AdvancedOptimizeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdvancedOptimizeConfig {
        &self.config
    }

    /// Run every enabled step. Never fails; failures become warnings.
    pub fn run(&self, mesh: Mesh) -> StageOutcome {
        let _timer = OperationTimer::with_mesh("advanced_optimize", &mesh);
        let input = mesh.clone();
        let mut outcome = StageOutcome::new(mesh);

        if self.config.make_watertight {
            self.make_watertight(&mut outcome);
        }
        if self.config.fill_holes {
            let max = self.config.max_hole_size;
            if let Some(report) = outcome.attempt("fill_holes", |m| fill_holes(m, max)) {
                debug!(
                    "Filled {} holes ({} left open, {} faces added)",
                    report.filled, report.skipped, report.faces_added
                );
            }
        }
        if self.config.smooth {
            self.smooth(&mut outcome);
        }
        if self.config.recalculate_normals {
            outcome.attempt("face_normals", compute_face_normals);
            outcome.attempt("vertex_normals", compute_vertex_normals);
            outcome.attempt("orient_faces", orient_faces_coherently);
        }

        log_stage_delta("advanced_optimize", &input, &outcome.mesh);
        if !outcome.is_clean() {
            info!(
                "Advanced optimization finished with {} warning(s)",
                outcome.warnings.len()
            );
        }
        outcome
    }

    fn make_watertight(&self, outcome: &mut StageOutcome) {
        outcome.attempt("non_manifold_edges", fix_non_manifold_edges);
        outcome.attempt("non_manifold_vertices", fix_non_manifold_vertices);
        outcome.attempt("duplicate_faces", remove_duplicate_faces);
        outcome.attempt("duplicate_vertices", |m| {
            merge_duplicate_vertices(m, DEFAULT_WELD_EPSILON)
        });
        outcome.attempt("null_faces", |m| remove_null_faces(m, DEFAULT_NULL_AREA));
    }

    /// Taubin first; the cotangent Laplacian runs only if Taubin fails.
    fn smooth(&self, outcome: &mut StageOutcome) {
        let params = self.config.smooth_params();
        let mut candidate = outcome.mesh.clone();
        let taubin_err = match taubin_smooth(&mut candidate, &params) {
            Ok(_) => {
                outcome.mesh = candidate;
                return;
            }
            Err(err) => err,
        };
        debug!("Taubin smoothing failed, trying cotangent fallback: {}", taubin_err);

        let iterations = self.config.smooth_iterations;
        let lambda = self.config.smooth_lambda.clamp(f64::EPSILON, 1.0);
        outcome.attempt("smooth", |m| {
            cotangent_smooth(m, iterations, lambda).map_err(|fallback_err| {
                MeshError::smoothing_failed(format!(
                    "taubin: {}; cotangent: {}",
                    taubin_err, fallback_err
                ))
            })
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::mesh_stats;

    fn cube() -> Mesh {
        Mesh::from_raw(
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
                [1.0, 0.0, 1.0],
                [1.0, 1.0, 1.0],
                [0.0, 1.0, 1.0],
            ],
            &[
                [0, 2, 1],
                [0, 3, 2],
                [4, 5, 6],
                [4, 6, 7],
                [0, 1, 5],
                [0, 5, 4],
                [2, 3, 7],
                [2, 7, 6],
                [1, 2, 6],
                [1, 6, 5],
                [0, 4, 7],
                [0, 7, 3],
            ],
        )
    }

    #[test]
    fn test_basic_keeps_small_cube() {
        let optimizer = BasicOptimizer::new(BasicOptimizeConfig::with_max_faces(100));
        let outcome = optimizer.run(cube()).unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.mesh.face_count(), 12);
        assert_eq!(outcome.mesh.vertex_count(), 8);
    }

    #[test]
    fn test_basic_rejects_empty_mesh() {
        let err = BasicOptimizer::default().run(Mesh::new()).unwrap_err();
        assert!(matches!(err, MeshError::EmptyMesh { .. }));
    }

    #[test]
    fn test_advanced_disabled_is_noop() {
        let config = AdvancedOptimizeConfig::default();
        assert!(!config.any_enabled());
        let outcome = AdvancedOptimizer::new(config).run(cube());
        assert_eq!(outcome.mesh.faces, cube().faces);
        assert!(outcome.is_clean());
    }

    #[test]
    fn test_advanced_fills_open_cube() {
        let mut mesh = cube();
        mesh.faces.truncate(10);
        let config = AdvancedOptimizeConfig {
            fill_holes: true,
            recalculate_normals: true,
            ..Default::default()
        };

        let outcome = AdvancedOptimizer::new(config).run(mesh);

        assert!(outcome.is_clean(), "{:?}", outcome.warnings);
        let stats = mesh_stats(&outcome.mesh);
        assert!(stats.is_watertight);
        assert!(stats.is_winding_consistent);
        assert!(outcome.mesh.has_face_normals());
    }

    #[test]
    fn test_failing_step_is_recorded_and_skipped() {
        let config = AdvancedOptimizeConfig {
            fill_holes: true,
            max_hole_size: 1,
            recalculate_normals: true,
            ..Default::default()
        };
        let outcome = AdvancedOptimizer::new(config).run(cube());

        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].step, "fill_holes");
        assert_eq!(outcome.warnings[0].code, "MESH-3002");
        // Later steps still ran.
        assert!(outcome.mesh.has_face_normals());
    }

    #[test]
    fn test_invalid_mesh_warns_on_every_step() {
        let mut mesh = cube();
        mesh.faces.push([0, 1, 99]);
        let outcome = AdvancedOptimizer::new(AdvancedOptimizeConfig::all()).run(mesh.clone());

        assert_eq!(outcome.mesh.faces, mesh.faces);
        assert!(outcome.warnings.iter().any(|w| w.step == "null_faces"));
        assert!(outcome.warnings.iter().any(|w| w.step == "smooth"));
        assert!(outcome.warnings.iter().any(|w| w.step == "orient_faces"));
    }

    #[test]
    fn test_watertight_removes_duplicates() {
        let mut mesh = cube();
        mesh.faces.push([2, 1, 0]);
        let config = AdvancedOptimizeConfig {
            make_watertight: true,
            ..Default::default()
        };
        let outcome = AdvancedOptimizer::new(config).run(mesh);
        assert_eq!(outcome.mesh.face_count(), 12);
    }

    #[cfg(feature = "pipeline-config")]
    #[test]
    fn test_config_toml_defaults() {
        let config = AdvancedOptimizeConfig::from_toml("fill_holes = true\nmax_hole_size = 64\n")
            .unwrap();
        assert!(config.fill_holes);
        assert_eq!(config.max_hole_size, 64);
        assert_eq!(config.smooth_iterations, DEFAULT_SMOOTH_ITERATIONS);

        let text = config.to_toml().unwrap();
        assert_eq!(AdvancedOptimizeConfig::from_toml(&text).unwrap(), config);

        let basic = BasicOptimizeConfig::from_json(r#"{"max_faces": 5000}"#).unwrap();
        assert_eq!(basic.max_faces, 5000);
        assert_eq!(basic.floater_ratio, DEFAULT_FLOATER_RATIO);
        let json = basic.to_json().unwrap();
        assert_eq!(BasicOptimizeConfig::from_json(&json).unwrap(), basic);
    }
}

//! One generation request, start to finish.
//!
//! ```text
//! mode detect -> preprocess -> model select -> infer -> basic -> advanced
//! ```
//!
//! Validation and resource errors abort the request. Mesh repair failures do
//! not: they come back as [`RepairWarning`]s on the result.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use shapegen_mesh::{
    AdvancedOptimizer, BasicOptimizer, Mesh, MeshStats, RepairWarning, StageOutcome, encode_mesh,
    mesh_stats, save_mesh_as,
};
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::config::{GenerationConfig, InputMode, InputModeSelection};
use crate::error::{ShapeError, ShapeResult};
use crate::manager::ModelManager;
use crate::model::{InferenceInput, InferenceRequest, ModelKind};
use crate::preprocess::{PreparedImage, Preprocessor, ProcessedViews};
use crate::views::{ImageSource, ViewName, ViewSet};

/// What the caller hands in.
#[derive(Debug, Clone)]
pub enum GenerationInput {
    SingleImage(ImageSource),
    MultiView(ViewSet),
}

impl GenerationInput {
    /// Mode implied by the input shape alone.
    pub fn natural_mode(&self) -> InputMode {
        match self {
            GenerationInput::SingleImage(_) => InputMode::SingleImage,
            GenerationInput::MultiView(_) => InputMode::MultiView,
        }
    }

    /// Apply a forced mode, reshaping the input to match.
    ///
    /// A view set forced to single-image mode uses its front view. A single
    /// image forced to multi-view becomes the front view of a one-view set.
    pub fn resolve(self, selection: InputModeSelection) -> ShapeResult<Self> {
        match (selection, self) {
            (InputModeSelection::Single, GenerationInput::MultiView(mut views)) => {
                views.require_front()?;
                let front = views.take(ViewName::Front).ok_or(ShapeError::MissingFrontView)?;
                Ok(GenerationInput::SingleImage(front))
            }
            (InputModeSelection::Multi, GenerationInput::SingleImage(image)) => Ok(
                GenerationInput::MultiView(ViewSet::new().with(ViewName::Front, image)),
            ),
            (_, input) => Ok(input),
        }
    }
}

impl From<ImageSource> for GenerationInput {
    fn from(source: ImageSource) -> Self {
        GenerationInput::SingleImage(source)
    }
}

impl From<ViewSet> for GenerationInput {
    fn from(views: ViewSet) -> Self {
        GenerationInput::MultiView(views)
    }
}

/// A finished request.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub mesh: Mesh,
    pub task_id: Uuid,
    pub elapsed: Duration,
    pub config: GenerationConfig,
    pub input_mode: InputMode,
    /// 1 for single-image requests.
    pub view_count: usize,
    pub model: ModelKind,
    /// Repair steps that were skipped.
    pub warnings: Vec<RepairWarning>,
}

impl GenerationResult {
    pub fn stats(&self) -> MeshStats {
        mesh_stats(&self.mesh)
    }

    /// Serialize the mesh in the configured output format.
    pub fn export(&self) -> ShapeResult<Vec<u8>> {
        Ok(encode_mesh(&self.mesh, self.config.output_format)?)
    }

    /// Write the mesh to `path` in the configured output format.
    pub fn save(&self, path: &Path) -> ShapeResult<()> {
        Ok(save_mesh_as(&self.mesh, path, self.config.output_format)?)
    }
}

enum Prepared {
    Single(PreparedImage),
    Views(ProcessedViews),
}

/// Drives requests through preprocessing, inference, and mesh repair.
#[derive(Clone)]
pub struct Orchestrator {
    manager: Arc<ModelManager>,
    preprocessor: Preprocessor,
}

impl Orchestrator {
    pub fn new(manager: Arc<ModelManager>, preprocessor: Preprocessor) -> Self {
        Self {
            manager,
            preprocessor,
        }
    }

    pub fn manager(&self) -> &ModelManager {
        &self.manager
    }

    pub fn generate(
        &self,
        input: GenerationInput,
        config: &GenerationConfig,
    ) -> ShapeResult<GenerationResult> {
        let task_id = Uuid::new_v4();
        let span = info_span!("generate", %task_id);
        let _enter = span.enter();
        let start = Instant::now();

        config.validate()?;
        let input = input.resolve(config.input_mode)?;
        let input_mode = input.natural_mode();
        info!(?input_mode, "Generation started");

        let prepared = match &input {
            GenerationInput::SingleImage(source) => {
                Prepared::Single(self.preprocessor.prepare_image(source, config)?)
            }
            GenerationInput::MultiView(views) => {
                Prepared::Views(self.preprocessor.prepare_views(views, config)?)
            }
        };

        // Single-image requests need the model resident already; multi-view
        // loads on demand.
        let (kind, model) = match input_mode {
            InputMode::SingleImage => (
                ModelKind::SingleImage,
                self.manager.get_model(Some(ModelKind::SingleImage))?,
            ),
            InputMode::MultiView => (
                ModelKind::MultiView,
                self.manager.ensure_loaded(ModelKind::MultiView)?,
            ),
        };

        let (inference_input, view_count) = match &prepared {
            Prepared::Single(p) => (InferenceInput::Image(&p.image), 1),
            Prepared::Views(p) => (InferenceInput::Views(&p.views), p.view_count()),
        };
        let request = InferenceRequest {
            input: inference_input,
            steps: config.num_inference_steps,
            guidance_scale: config.guidance_scale,
            octree_resolution: config.octree_resolution,
        };
        let mesh = self
            .manager
            .infer(kind, model.as_ref(), &request)?
            .into_first()
            .ok_or(ShapeError::NoMesh { kind })?;
        mesh.check_indices()?;

        let outcome = post_process(mesh, config);
        let elapsed = start.elapsed();
        info!(
            faces = outcome.mesh.face_count(),
            vertices = outcome.mesh.vertex_count(),
            warnings = outcome.warnings.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Generation finished"
        );

        Ok(GenerationResult {
            mesh: outcome.mesh,
            task_id,
            elapsed,
            config: config.clone(),
            input_mode,
            view_count,
            model: kind,
            warnings: outcome.warnings,
        })
    }
}

/// Basic then advanced mesh stages. Never fails; problems become warnings.
pub fn post_process(mesh: Mesh, config: &GenerationConfig) -> StageOutcome {
    let mut outcome = StageOutcome::new(mesh);

    if config.optimize_mesh {
        match BasicOptimizer::new(config.basic()).run(outcome.mesh.clone()) {
            Ok(basic) => outcome = basic,
            Err(err) => {
                warn!(code = %err.code(), "Basic optimization skipped: {}", err);
                outcome.warnings.push(RepairWarning {
                    step: "basic_optimize".to_string(),
                    code: err.code().as_str().to_string(),
                    message: err.to_string(),
                });
            }
        }
    }

    if config.repair.any_advanced() {
        let advanced = AdvancedOptimizer::new(config.repair.advanced()).run(outcome.mesh);
        outcome.mesh = advanced.mesh;
        outcome.warnings.extend(advanced.warnings);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn image() -> ImageSource {
        RgbaImage::new(4, 4).into()
    }

    #[test]
    fn test_auto_mode_follows_input_shape() {
        let single = GenerationInput::from(image());
        assert_eq!(single.natural_mode(), InputMode::SingleImage);

        let multi = GenerationInput::from(ViewSet::new().with(ViewName::Front, image()));
        let multi = multi.resolve(InputModeSelection::Auto).unwrap();
        assert_eq!(multi.natural_mode(), InputMode::MultiView);
    }

    #[test]
    fn test_forced_modes_reshape_input() {
        let forced = GenerationInput::from(image())
            .resolve(InputModeSelection::Multi)
            .unwrap();
        match forced {
            GenerationInput::MultiView(views) => {
                assert_eq!(views.available_views(), vec![ViewName::Front])
            }
            other => panic!("expected multi-view, got {:?}", other),
        }

        let views = ViewSet::new()
            .with(ViewName::Front, image())
            .with(ViewName::Back, image());
        let forced = GenerationInput::from(views)
            .resolve(InputModeSelection::Single)
            .unwrap();
        assert_eq!(forced.natural_mode(), InputMode::SingleImage);

        let no_front = GenerationInput::from(ViewSet::new().with(ViewName::Left, image()));
        let err = no_front.resolve(InputModeSelection::Single).unwrap_err();
        assert!(matches!(err, ShapeError::MissingFrontView));
    }

    #[test]
    fn test_post_process_disabled_is_passthrough() {
        let mesh = Mesh::from_raw(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2]],
        );
        let config = GenerationConfig {
            optimize_mesh: false,
            ..Default::default()
        };
        let outcome = post_process(mesh.clone(), &config);
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.mesh.faces, mesh.faces);
    }
    #[test]
    fn test_post_process_clean_cube_has_no_warnings() {
        let cube = Mesh::from_raw(
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
                [3, 7, 6],
                [3, 6, 2],
                [0, 4, 7],
                [0, 7, 3],
                [1, 2, 6],
                [1, 6, 5],
            ],
        );
        let outcome = post_process(cube.clone(), &GenerationConfig::default());
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
        assert_eq!(outcome.mesh.faces, cube.faces);
    }
}

//! Resident model lifecycle.
//!
//! At most one handle per [`ModelKind`] is resident. Load, unload, and lookup
//! share one lock; inference calls take a second lock so at most one runs on
//! the device at a time. Handles are reference-counted, so unloading while an
//! inference is in flight frees the model once that call returns.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use shapegen_gpu::{DeviceContext, MemoryInfo};
use tracing::{debug, info};

use crate::error::{ShapeError, ShapeResult};
use crate::model::{InferenceOutput, InferenceRequest, ModelKind, ModelLoader, ModelSource, ShapeModel};

struct Resident {
    model: Arc<dyn ShapeModel>,
    footprint: u64,
}

#[derive(Default)]
struct ModelState {
    models: BTreeMap<ModelKind, Resident>,
    current: Option<ModelKind>,
}

/// Owns the resident inference models and the device they run on.
pub struct ModelManager {
    weights_dir: PathBuf,
    loader: Arc<dyn ModelLoader>,
    device: DeviceContext,
    state: Mutex<ModelState>,
    inference: Mutex<()>,
}

impl ModelManager {
    pub fn new(weights_dir: impl Into<PathBuf>, loader: Arc<dyn ModelLoader>, device: DeviceContext) -> Self {
        Self {
            weights_dir: weights_dir.into(),
            loader,
            device,
            state: Mutex::new(ModelState::default()),
            inference: Mutex::new(()),
        }
    }

    pub fn weights_dir(&self) -> &Path {
        &self.weights_dir
    }

    pub fn device(&self) -> &DeviceContext {
        &self.device
    }

    fn lock_state(&self) -> MutexGuard<'_, ModelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_locked(&self, state: &mut ModelState, kind: ModelKind) -> ShapeResult<Arc<dyn ShapeModel>> {
        if let Some(resident) = state.models.get(&kind) {
            debug!(model = %kind, "Model already resident");
            state.current = Some(kind);
            return Ok(Arc::clone(&resident.model));
        }

        let source = ModelSource::resolve(&self.weights_dir, kind);
        info!(
            model = %kind,
            path = %source.weights_path().display(),
            device = %self.device.kind(),
            "Loading model"
        );
        let start = Instant::now();
        let model: Arc<dyn ShapeModel> = self
            .loader
            .load(&source, &self.device)
            .map_err(|e| ShapeError::ModelLoad {
                kind,
                path: source.path.clone(),
                source: e,
            })?
            .into();

        let footprint = model.footprint_bytes();
        self.device.reserve(footprint);
        info!(
            model = %kind,
            footprint_mb = footprint / (1024 * 1024),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model loaded"
        );
        state.models.insert(
            kind,
            Resident {
                model: Arc::clone(&model),
                footprint,
            },
        );
        state.current = Some(kind);
        Ok(model)
    }

    /// Make `kind` resident and current. A resident model is not re-created.
    pub fn load_model(&self, kind: ModelKind) -> ShapeResult<()> {
        let mut state = self.lock_state();
        self.load_locked(&mut state, kind).map(|_| ())
    }

    /// Load `kind` if needed and return its handle.
    pub fn ensure_loaded(&self, kind: ModelKind) -> ShapeResult<Arc<dyn ShapeModel>> {
        let mut state = self.lock_state();
        self.load_locked(&mut state, kind)
    }

    /// Drop `kind` if resident. Returns false when it was not.
    pub fn unload_model(&self, kind: ModelKind) -> bool {
        let mut state = self.lock_state();
        let Some(resident) = state.models.remove(&kind) else {
            return false;
        };
        if state.current == Some(kind) {
            state.current = None;
        }
        drop(state);

        self.device.release(resident.footprint);
        drop(resident);
        self.device.release_cache();
        info!(model = %kind, "Model unloaded");
        true
    }

    /// Handle for `kind`, or for the current model when `None`.
    pub fn get_model(&self, kind: Option<ModelKind>) -> ShapeResult<Arc<dyn ShapeModel>> {
        let state = self.lock_state();
        let key = kind.or(state.current);
        key.and_then(|k| state.models.get(&k))
            .map(|resident| Arc::clone(&resident.model))
            .ok_or(ShapeError::ModelNotLoaded { kind: key })
    }

    pub fn is_loaded(&self, kind: ModelKind) -> bool {
        self.lock_state().models.contains_key(&kind)
    }

    /// Resident kinds in a stable order.
    pub fn loaded_kinds(&self) -> Vec<ModelKind> {
        self.lock_state().models.keys().copied().collect()
    }

    pub fn current_model(&self) -> Option<ModelKind> {
        self.lock_state().current
    }

    /// Used and total device memory in GB. Zeros without an accelerator.
    pub fn get_gpu_memory_info(&self) -> MemoryInfo {
        self.device.memory_info()
    }

    /// Run `model` while holding the inference lock.
    pub fn infer(
        &self,
        kind: ModelKind,
        model: &dyn ShapeModel,
        request: &InferenceRequest<'_>,
    ) -> ShapeResult<InferenceOutput> {
        let _guard = self.inference.lock().unwrap_or_else(PoisonError::into_inner);
        let start = Instant::now();
        debug!(
            model = %kind,
            steps = request.steps,
            guidance = request.guidance_scale,
            octree_resolution = request.octree_resolution,
            "Running inference"
        );
        let output = model
            .infer(request)
            .map_err(|source| ShapeError::Inference { kind, source })?;
        info!(
            model = %kind,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Inference finished"
        );
        Ok(output)
    }
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("weights_dir", &self.weights_dir)
            .field("device", &self.device)
            .field("loaded", &self.loaded_kinds())
            .field("current", &self.current_model())
            .finish_non_exhaustive()
    }
}

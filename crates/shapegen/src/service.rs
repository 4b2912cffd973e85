//! The service facade: one object owning the model manager and orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shapegen_gpu::{DeviceContext, DeviceKind, DevicePreference};
use tracing::info;

use crate::config::{GenerationConfig, ServiceConfig};
use crate::error::ShapeResult;
use crate::manager::ModelManager;
use crate::model::{ModelKind, ModelLoader};
use crate::orchestrator::{GenerationInput, GenerationResult, Orchestrator};
use crate::preprocess::Preprocessor;
use crate::segmentation::{AlphaSegmenter, Segmenter};

/// Snapshot of the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// True when at least one model is resident.
    pub ready: bool,
    pub loaded_kinds: Vec<ModelKind>,
    pub gpu_used_gb: f64,
    pub gpu_total_gb: f64,
    pub device: String,
    pub device_kind: DeviceKind,
}

/// Builds a [`ShapeService`].
///
/// The model loader is required; everything else has a default. Without an
/// explicit device the builder probes for one using the configured
/// preference.
pub struct ShapeServiceBuilder {
    config: ServiceConfig,
    loader: Arc<dyn ModelLoader>,
    segmenter: Option<Arc<dyn Segmenter>>,
    device: Option<DeviceContext>,
}

impl ShapeServiceBuilder {
    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn weights_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.weights_dir = dir.into();
        self
    }

    pub fn default_model(mut self, kind: ModelKind) -> Self {
        self.config.default_model = kind;
        self
    }

    /// Load the default model during [`build`](Self::build).
    pub fn auto_load(mut self, auto_load: bool) -> Self {
        self.config.auto_load = auto_load;
        self
    }

    pub fn device_preference(mut self, preference: DevicePreference) -> Self {
        self.config.device = preference;
        self
    }

    /// Use an already-probed device instead of probing.
    pub fn device(mut self, device: DeviceContext) -> Self {
        self.device = Some(device);
        self
    }

    /// Background remover. Default: [`AlphaSegmenter`].
    pub fn segmenter(mut self, segmenter: Arc<dyn Segmenter>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    /// Construct the service, loading the default model if `auto_load` is set.
    pub fn build(self) -> ShapeResult<ShapeService> {
        let device = match self.device {
            Some(device) => device,
            None => DeviceContext::probe(self.config.device)?,
        };
        let segmenter = self
            .segmenter
            .unwrap_or_else(|| Arc::new(AlphaSegmenter::default()));

        let manager = Arc::new(ModelManager::new(
            self.config.weights_dir.clone(),
            self.loader,
            device,
        ));
        let orchestrator = Orchestrator::new(Arc::clone(&manager), Preprocessor::new(segmenter));

        info!(
            weights_dir = %self.config.weights_dir.display(),
            device = %manager.device().name(),
            auto_load = self.config.auto_load,
            "Shape service created"
        );
        if self.config.auto_load {
            manager.load_model(self.config.default_model)?;
        }

        Ok(ShapeService {
            config: self.config,
            manager,
            orchestrator,
        })
    }
}

/// Image-to-mesh generation service.
///
/// Construct with [`ShapeService::builder`]; the owner controls its lifetime.
/// All methods take `&self` and may be called from several threads.
pub struct ShapeService {
    config: ServiceConfig,
    manager: Arc<ModelManager>,
    orchestrator: Orchestrator,
}

impl ShapeService {
    pub fn builder(loader: Arc<dyn ModelLoader>) -> ShapeServiceBuilder {
        ShapeServiceBuilder {
            config: ServiceConfig::default(),
            loader,
            segmenter: None,
            device: None,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn manager(&self) -> &ModelManager {
        &self.manager
    }

    pub fn generate(
        &self,
        input: impl Into<GenerationInput>,
        config: &GenerationConfig,
    ) -> ShapeResult<GenerationResult> {
        self.orchestrator.generate(input.into(), config)
    }

    pub fn load_model(&self, kind: ModelKind) -> ShapeResult<()> {
        self.manager.load_model(kind)
    }

    /// Returns false when `kind` was not resident.
    pub fn unload_model(&self, kind: ModelKind) -> bool {
        self.manager.unload_model(kind)
    }

    pub fn get_status(&self) -> ServiceStatus {
        let loaded_kinds = self.manager.loaded_kinds();
        let memory = self.manager.get_gpu_memory_info();
        let device = self.manager.device();
        ServiceStatus {
            ready: !loaded_kinds.is_empty(),
            loaded_kinds,
            gpu_used_gb: memory.used_gb,
            gpu_total_gb: memory.total_gb,
            device: device.name().to_string(),
            device_kind: device.kind(),
        }
    }
}

impl std::fmt::Debug for ShapeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapeService")
            .field("config", &self.config)
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

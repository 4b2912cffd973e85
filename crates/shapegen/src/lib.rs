//! Image-to-mesh generation service.
//!
//! Turns one image, or up to four named views, into a repaired surface mesh:
//!
//! - **Preprocessing**: optional enhancement, background removal, and
//!   multi-view lighting normalization
//! - **Model management**: GPU-resident generative models, loaded and
//!   unloaded per [`ModelKind`]
//! - **Orchestration**: mode detection, model selection, inference, and the
//!   best-effort mesh repair stages from `shapegen-mesh`
//!
//! The generative and segmentation models are opaque: plug them in through
//! [`ModelLoader`] and [`Segmenter`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use shapegen::{GenerationConfig, ImageSource, ModelKind, ShapeService, ViewName, ViewSet};
//! # fn loader() -> Arc<dyn shapegen::ModelLoader> { unimplemented!() }
//!
//! let service = ShapeService::builder(loader())
//!     .weights_dir("/srv/weights")
//!     .default_model(ModelKind::SingleImage)
//!     .build()?;
//!
//! let views = ViewSet::new()
//!     .with(ViewName::Front, ImageSource::Path("front.png".into()))
//!     .with(ViewName::Left, ImageSource::Path("left.png".into()));
//! let result = service.generate(views, &GenerationConfig::default())?;
//! for warning in &result.warnings {
//!     eprintln!("{}", warning);
//! }
//! std::fs::write("out.glb", result.export()?).ok();
//! # Ok::<(), shapegen::ShapeError>(())
//! ```

pub mod config;
pub mod enhance;
pub mod error;
pub mod lighting;
pub mod manager;
pub mod model;
pub mod orchestrator;
pub mod preprocess;
pub mod segmentation;
pub mod service;
pub mod views;

pub use config::{
    GenerationConfig, InputMode, InputModeSelection, LightingConfig, RepairConfig, ServiceConfig,
};
pub use enhance::ImageEnhancer;
pub use error::{BoxError, ErrorKind, ShapeError, ShapeResult};
pub use lighting::{LightingMethod, LightingNormalizer};
pub use manager::ModelManager;
pub use model::{
    CheckpointFormat, InferenceInput, InferenceOutput, InferenceRequest, ModelKind, ModelLoader,
    ModelSource, ShapeModel,
};
pub use orchestrator::{GenerationInput, GenerationResult, Orchestrator, post_process};
pub use preprocess::{PreparedImage, Preprocessor, ProcessedViews};
pub use segmentation::{AlphaSegmenter, Segmentation, Segmenter};
pub use service::{ServiceStatus, ShapeService, ShapeServiceBuilder};
pub use views::{ImageSource, VIEW_ORDER, ViewName, ViewSet};

pub use shapegen_gpu::{DeviceContext, DeviceKind, DevicePreference};

//! Error taxonomy for the generation service.
//!
//! Codes follow the `SHAPE-XXXX` scheme:
//! - `SHAPE-1xxx`: validation (the request is wrong)
//! - `SHAPE-2xxx`: resources (models and devices)
//! - `SHAPE-3xxx`: processing (collaborators failed mid-request)
//!
//! Mesh errors are carried through unchanged and classified by their own
//! code, so an unsupported export format is still a validation error.

use std::path::PathBuf;

use miette::Diagnostic;
use shapegen_gpu::GpuError;
use shapegen_mesh::MeshError;
use thiserror::Error;

use crate::model::ModelKind;
use crate::views::VIEW_ORDER;

/// Result type alias for service operations.
pub type ShapeResult<T> = Result<T, ShapeError>;

/// Boxed error returned by opaque collaborators (models, segmenters).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Broad classification used by callers to decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller's request is invalid. Do not retry.
    Validation,
    /// A model or device was not available.
    Resource,
    /// A collaborator failed while handling a valid request.
    Processing,
}

/// Errors that can occur while generating a mesh.
#[derive(Debug, Error, Diagnostic)]
pub enum ShapeError {
    /// Multi-view input without a front view.
    #[error("multi-view input requires a 'front' view")]
    #[diagnostic(code("SHAPE-1001"), help("Add a front view; other views are optional"))]
    MissingFrontView,

    /// View name outside the fixed set.
    #[error("invalid view name '{name}'")]
    #[diagnostic(code("SHAPE-1002"), help("Valid view names: {}", VIEW_ORDER.join(", ")))]
    UnknownView { name: String },

    /// Configuration value out of range.
    #[error("invalid configuration: {field} {message}")]
    #[diagnostic(code("SHAPE-1003"))]
    InvalidConfig { field: &'static str, message: String },

    /// Image reference could not be opened or decoded.
    #[error("failed to load image from {path}")]
    #[diagnostic(code("SHAPE-1004"), help("Supported image formats: png, jpeg"))]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Service configuration file could not be read.
    #[error("failed to read service config from {path}")]
    #[diagnostic(code("SHAPE-1005"))]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Service configuration file is not valid TOML for the schema.
    #[error("failed to parse service config: {0}")]
    #[diagnostic(code("SHAPE-1006"))]
    ConfigParse(#[from] toml::de::Error),

    /// Requested model kind is not resident.
    #[error("model {} not loaded", kind.map(|k| k.id()).unwrap_or("(none)"))]
    #[diagnostic(
        code("SHAPE-2001"),
        help("Call load_model before generating with this model")
    )]
    ModelNotLoaded { kind: Option<ModelKind> },

    /// Model instantiation failed.
    #[error("failed to load model {}", kind.id())]
    #[diagnostic(code("SHAPE-2002"), help("Check the weights directory: {}", path.display()))]
    ModelLoad {
        kind: ModelKind,
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// Accelerator probing failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Device(#[from] GpuError),

    /// Background removal failed.
    #[error("segmentation failed")]
    #[diagnostic(code("SHAPE-3001"))]
    Segmentation {
        #[source]
        source: BoxError,
    },

    /// The inference model returned an error.
    #[error("inference failed on model {}", kind.id())]
    #[diagnostic(code("SHAPE-3002"))]
    Inference {
        kind: ModelKind,
        #[source]
        source: BoxError,
    },

    /// The inference model returned nothing usable.
    #[error("model {} produced no usable mesh", kind.id())]
    #[diagnostic(
        code("SHAPE-3003"),
        help("Try a higher octree resolution or a cleaner input image")
    )]
    NoMesh { kind: ModelKind },

    /// Mesh stage or export error.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Mesh(#[from] MeshError),
}

impl ShapeError {
    /// Create an out-of-range configuration error.
    pub fn invalid_config(field: &'static str, message: impl Into<String>) -> Self {
        ShapeError::InvalidConfig {
            field,
            message: message.into(),
        }
    }

    /// Returns the error code as a string.
    ///
    /// Wrapped mesh and device errors keep their own `MESH-`/`GPU-` codes.
    pub fn code(&self) -> &'static str {
        match self {
            ShapeError::MissingFrontView => "SHAPE-1001",
            ShapeError::UnknownView { .. } => "SHAPE-1002",
            ShapeError::InvalidConfig { .. } => "SHAPE-1003",
            ShapeError::ImageLoad { .. } => "SHAPE-1004",
            ShapeError::ConfigIo { .. } => "SHAPE-1005",
            ShapeError::ConfigParse(_) => "SHAPE-1006",
            ShapeError::ModelNotLoaded { .. } => "SHAPE-2001",
            ShapeError::ModelLoad { .. } => "SHAPE-2002",
            ShapeError::Device(e) => e.code(),
            ShapeError::Segmentation { .. } => "SHAPE-3001",
            ShapeError::Inference { .. } => "SHAPE-3002",
            ShapeError::NoMesh { .. } => "SHAPE-3003",
            ShapeError::Mesh(e) => e.code().as_str(),
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShapeError::MissingFrontView
            | ShapeError::UnknownView { .. }
            | ShapeError::InvalidConfig { .. }
            | ShapeError::ImageLoad { .. }
            | ShapeError::ConfigIo { .. }
            | ShapeError::ConfigParse(_) => ErrorKind::Validation,
            ShapeError::ModelNotLoaded { .. }
            | ShapeError::ModelLoad { .. }
            | ShapeError::Device(_) => ErrorKind::Resource,
            ShapeError::Mesh(e) if e.code().is_validation() => ErrorKind::Validation,
            ShapeError::Segmentation { .. }
            | ShapeError::Inference { .. }
            | ShapeError::NoMesh { .. }
            | ShapeError::Mesh(_) => ErrorKind::Processing,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_errors_are_validation() {
        assert_eq!(ShapeError::MissingFrontView.kind(), ErrorKind::Validation);
        let err = ShapeError::UnknownView {
            name: "top".into(),
        };
        assert!(err.is_validation());
        assert_eq!(err.code(), "SHAPE-1002");
        assert!(err.to_string().contains("top"));
    }

    #[test]
    fn test_diagnostic_code_matches_code() {
        let errors = [
            ShapeError::MissingFrontView,
            ShapeError::invalid_config("max_faces", "out of range"),
            ShapeError::ModelNotLoaded { kind: None },
            ShapeError::NoMesh {
                kind: ModelKind::MultiView,
            },
        ];
        for err in &errors {
            let diagnostic = Diagnostic::code(err).map(|c| c.to_string());
            assert_eq!(diagnostic.as_deref(), Some(err.code()));
        }
    }

    #[test]
    fn test_model_not_loaded_is_resource() {
        let err = ShapeError::ModelNotLoaded {
            kind: Some(ModelKind::SingleImage),
        };
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert_eq!(err.to_string(), "model hunyuan3d-2.1 not loaded");

        let err = ShapeError::ModelNotLoaded { kind: None };
        assert_eq!(err.to_string(), "model (none) not loaded");
    }

    #[test]
    fn test_mesh_errors_keep_their_class() {
        let unsupported: ShapeError = MeshError::unsupported_format("fbx").into();
        assert_eq!(unsupported.kind(), ErrorKind::Validation);
        assert_eq!(unsupported.code(), "MESH-4001");

        let failed: ShapeError = MeshError::smoothing_failed("diverged").into();
        assert_eq!(failed.kind(), ErrorKind::Processing);
    }
}

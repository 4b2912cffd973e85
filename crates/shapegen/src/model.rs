//! Inference model kinds, their on-disk sources, and the traits the service
//! uses to instantiate and call them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use shapegen_gpu::DeviceContext;
use shapegen_mesh::Mesh;

use crate::error::{BoxError, ShapeError};
use crate::views::ViewName;

/// Which generative model to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    /// One image in, one mesh out.
    #[serde(rename = "hunyuan3d-2.1")]
    SingleImage,
    /// Up to four named views in, one mesh out.
    #[serde(rename = "hunyuan3d-2mv")]
    MultiView,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::SingleImage, ModelKind::MultiView];

    /// Stable model identifier.
    pub fn id(&self) -> &'static str {
        match self {
            ModelKind::SingleImage => "hunyuan3d-2.1",
            ModelKind::MultiView => "hunyuan3d-2mv",
        }
    }
}

impl FromStr for ModelKind {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hunyuan3d-2.1" | "single" | "single_image" => Ok(ModelKind::SingleImage),
            "hunyuan3d-2mv" | "multi" | "multi_view" => Ok(ModelKind::MultiView),
            _ => Err(ShapeError::invalid_config(
                "model",
                format!("'{}' is not one of hunyuan3d-2.1, hunyuan3d-2mv", s),
            )),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// On-disk weight format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    /// PyTorch `.ckpt`.
    Ckpt,
    /// `.safetensors`.
    Safetensors,
}

/// Where and how a model's weights are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSource {
    pub kind: ModelKind,
    /// Model root directory under the weights directory.
    pub path: PathBuf,
    /// Subfolder holding the DiT weights.
    pub subfolder: &'static str,
    pub format: CheckpointFormat,
    /// Weight variant suffix, e.g. `fp16`.
    pub variant: &'static str,
}

impl ModelSource {
    /// Resolve the source for `kind` under `weights_dir`.
    pub fn resolve(weights_dir: &Path, kind: ModelKind) -> Self {
        let (dir, subfolder, format) = match kind {
            ModelKind::SingleImage => ("Hunyuan3D-2.1", "hunyuan3d-dit-v2-1", CheckpointFormat::Ckpt),
            ModelKind::MultiView => (
                "Hunyuan3D-2mv",
                "hunyuan3d-dit-v2-mv",
                CheckpointFormat::Safetensors,
            ),
        };
        Self {
            kind,
            path: weights_dir.join(dir),
            subfolder,
            format,
            variant: "fp16",
        }
    }

    /// Directory holding the checkpoint files.
    pub fn weights_path(&self) -> PathBuf {
        self.path.join(self.subfolder)
    }
}

/// Model input.
#[derive(Debug, Clone, Copy)]
pub enum InferenceInput<'a> {
    Image(&'a RgbaImage),
    Views(&'a BTreeMap<ViewName, RgbaImage>),
}

/// One inference call.
#[derive(Debug, Clone, Copy)]
pub struct InferenceRequest<'a> {
    pub input: InferenceInput<'a>,
    pub steps: u32,
    pub guidance_scale: f32,
    pub octree_resolution: u32,
}

/// What a model returns.
#[derive(Debug, Clone)]
pub enum InferenceOutput {
    Single(Mesh),
    Sequence(Vec<Mesh>),
}

impl InferenceOutput {
    /// The mesh to post-process: the single mesh, or the first of a sequence.
    /// Meshes with no faces are treated as absent.
    pub fn into_first(self) -> Option<Mesh> {
        let mesh = match self {
            InferenceOutput::Single(mesh) => mesh,
            InferenceOutput::Sequence(meshes) => meshes.into_iter().next()?,
        };
        (!mesh.faces.is_empty()).then_some(mesh)
    }
}

/// A resident generative model.
pub trait ShapeModel: Send + Sync {
    fn infer(&self, request: &InferenceRequest<'_>) -> Result<InferenceOutput, BoxError>;

    /// Device memory held by the model, in bytes.
    fn footprint_bytes(&self) -> u64 {
        0
    }
}

/// Instantiates models from their sources.
pub trait ModelLoader: Send + Sync {
    fn load(&self, source: &ModelSource, device: &DeviceContext) -> Result<Box<dyn ShapeModel>, BoxError>;
}

impl<F> ModelLoader for F
where
    F: Fn(&ModelSource, &DeviceContext) -> Result<Box<dyn ShapeModel>, BoxError> + Send + Sync,
{
    fn load(&self, source: &ModelSource, device: &DeviceContext) -> Result<Box<dyn ShapeModel>, BoxError> {
        self(source, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_differ_per_kind() {
        let weights = Path::new("weights");
        let single = ModelSource::resolve(weights, ModelKind::SingleImage);
        let multi = ModelSource::resolve(weights, ModelKind::MultiView);

        assert_eq!(single.path, Path::new("weights/Hunyuan3D-2.1"));
        assert_eq!(single.format, CheckpointFormat::Ckpt);
        assert_eq!(
            multi.weights_path(),
            Path::new("weights/Hunyuan3D-2mv/hunyuan3d-dit-v2-mv")
        );
        assert_eq!(multi.format, CheckpointFormat::Safetensors);
        assert_eq!(multi.variant, "fp16");
    }

    #[test]
    fn test_kind_parse() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.id().parse::<ModelKind>().unwrap(), kind);
        }
        assert_eq!("multi".parse::<ModelKind>().unwrap(), ModelKind::MultiView);
        assert!("hunyuan3d-1".parse::<ModelKind>().unwrap_err().is_validation());
    }

    #[test]
    fn test_first_of_sequence() {
        let tri = Mesh::from_raw(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[[0, 1, 2]]);

        let out = InferenceOutput::Sequence(vec![tri.clone(), Mesh::new()]);
        assert_eq!(out.into_first().unwrap().faces, tri.faces);
        assert!(InferenceOutput::Sequence(vec![]).into_first().is_none());
        assert!(InferenceOutput::Single(Mesh::new()).into_first().is_none());
    }
}

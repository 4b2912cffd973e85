//! Mesh repair, optimization, and export for generated surface meshes.
//!
//! Meshes produced by generative models tend to carry small detached
//! fragments, far more faces than needed, and assorted topological defects.
//! This crate provides the stages that clean them up:
//!
//! - **Basic stage**: floater removal, quadric decimation, canonical cleanup
//! - **Advanced stage**: watertight repair, hole filling, Taubin smoothing,
//!   normal recomputation
//! - **Stats**: vertex/face counts, watertightness, winding, Euler number
//! - **I/O**: GLB, glTF, OBJ, PLY, STL, and OFF
//!
//! Advanced steps are best-effort. A failing step leaves the mesh as it was
//! and is reported as a [`RepairWarning`] in the [`StageOutcome`].
//!
//! # Coordinate System
//!
//! Right-handed. Faces wind counter-clockwise when viewed from outside, so
//! normals point outward by the right-hand rule.
//!
//! # Quick Start
//!
//! ```no_run
//! use shapegen_mesh::{
//!     AdvancedOptimizeConfig, AdvancedOptimizer, BasicOptimizeConfig, BasicOptimizer,
//!     ExportFormat, load_mesh, mesh_stats, save_mesh_as,
//! };
//! use std::path::Path;
//!
//! let mesh = load_mesh(Path::new("raw.obj")).unwrap();
//!
//! let basic = BasicOptimizer::new(BasicOptimizeConfig::with_max_faces(20_000));
//! let outcome = basic.run(mesh).unwrap();
//!
//! let advanced = AdvancedOptimizer::new(AdvancedOptimizeConfig::all());
//! let outcome = advanced.run(outcome.mesh);
//! for warning in &outcome.warnings {
//!     eprintln!("{}", warning);
//! }
//!
//! println!("{}", mesh_stats(&outcome.mesh));
//! save_mesh_as(&outcome.mesh, Path::new("clean.glb"), ExportFormat::Glb).unwrap();
//! ```

pub mod adjacency;
pub mod cleanup;
pub mod components;
pub mod decimate;
pub mod error;
pub mod gltf;
pub mod holes;
pub mod io;
pub mod normals;
pub mod optimize;
pub mod repair;
pub mod smooth;
pub mod stats;
pub mod tracing_ext;
mod types;

pub use adjacency::MeshAdjacency;
pub use cleanup::{CleanupReport, canonical_cleanup};
pub use components::{ComponentAnalysis, find_connected_components, remove_floaters};
pub use decimate::{DecimateParams, DecimateResult, decimate_mesh};
pub use error::{ErrorCode, MeshError, MeshLocation, MeshResult, RecoverySuggestion};
pub use holes::{HoleFillReport, MIN_HOLE_SIZE, fill_holes};
pub use io::{ExportFormat, decode_mesh, encode_mesh, load_mesh, save_mesh, save_mesh_as};
pub use normals::{compute_face_normals, compute_vertex_normals, orient_faces_coherently};
pub use optimize::{
    AdvancedOptimizeConfig, AdvancedOptimizer, BasicOptimizeConfig, BasicOptimizer,
    RepairWarning, StageOutcome,
};
#[cfg(feature = "pipeline-config")]
pub use optimize::OptimizeConfigError;
pub use smooth::{SmoothParams, cotangent_smooth, taubin_smooth};
pub use stats::{MeshStats, mesh_stats};
pub use types::{Mesh, Triangle, Vertex, VertexColor};

// Re-export nalgebra types for convenience
pub use nalgebra::{Point3, Vector3};

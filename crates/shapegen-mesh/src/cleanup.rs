//! Degenerate cleanup through a canonical PLY round trip.
//!
//! The mesh is encoded as binary PLY, decoded again, and then passed through
//! the standard cleanup steps. Vertex attributes that PLY cannot carry are
//! dropped, and the result always has canonical, compact indexing.

use std::path::Path;

use tracing::debug;

use crate::error::{MeshError, MeshResult};
use crate::io::{ExportFormat, PlyPrecision, decode_mesh, write_ply};
use crate::repair::{
    DEFAULT_NULL_AREA, DEFAULT_WELD_EPSILON, merge_duplicate_vertices, remove_duplicate_faces,
    remove_null_faces, remove_unreferenced_vertices,
};
use crate::Mesh;

/// Counts from a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub vertices_merged: usize,
    pub null_faces_removed: usize,
    pub duplicate_faces_removed: usize,
    pub unreferenced_removed: usize,
}

impl CleanupReport {
    /// True if the pass changed nothing.
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Round-trip the mesh through PLY and drop degenerate geometry.
///
/// On error the mesh is left unmodified.
pub fn canonical_cleanup(mesh: &mut Mesh) -> MeshResult<CleanupReport> {
    mesh.check_indices()?;

    let origin = Path::new("canonical.ply");
    let mut bytes = Vec::new();
    write_ply(
        mesh,
        &mut bytes,
        ply_rs::ply::Encoding::BinaryLittleEndian,
        PlyPrecision::Double,
    )
    .map_err(|e| MeshError::io_write(origin, e))?;

    let mut decoded = decode_mesh(&bytes, ExportFormat::Ply, origin)?;
    if decoded.vertex_count() != mesh.vertex_count() || decoded.face_count() != mesh.face_count() {
        return Err(MeshError::repair_failed(format!(
            "round trip changed element counts ({} -> {} faces)",
            mesh.face_count(),
            decoded.face_count()
        )));
    }

    let report = CleanupReport {
        vertices_merged: merge_duplicate_vertices(&mut decoded, DEFAULT_WELD_EPSILON)?,
        null_faces_removed: remove_null_faces(&mut decoded, DEFAULT_NULL_AREA)?,
        duplicate_faces_removed: remove_duplicate_faces(&mut decoded)?,
        unreferenced_removed: remove_unreferenced_vertices(&mut decoded),
    };

    debug!(
        "Canonical cleanup: {} merged, {} null, {} duplicate, {} unreferenced",
        report.vertices_merged,
        report.null_faces_removed,
        report.duplicate_faces_removed,
        report.unreferenced_removed
    );

    *mesh = decoded;
    Ok(report)
}

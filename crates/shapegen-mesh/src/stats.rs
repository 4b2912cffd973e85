//! Mesh statistics for diagnostics.

use std::fmt;

use crate::Mesh;
use crate::adjacency::{MeshAdjacency, is_winding_consistent};

/// Summary of a mesh's size and topology.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct MeshStats {
    pub vertices: usize,
    pub faces: usize,
    pub edges: usize,
    /// Every edge is shared by exactly two faces.
    pub is_watertight: bool,
    /// Every directed edge appears at most once.
    pub is_winding_consistent: bool,
    /// V - E + F
    pub euler_number: i64,
    /// `[min, max]` corners, or `None` for a mesh without vertices.
    pub bounds: Option<[[f64; 3]; 2]>,
}

impl MeshStats {
    /// Bounding box extents, zero for an empty mesh.
    pub fn extents(&self) -> [f64; 3] {
        match self.bounds {
            Some([min, max]) => [max[0] - min[0], max[1] - min[1], max[2] - min[2]],
            None => [0.0; 3],
        }
    }
}

impl fmt::Display for MeshStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Vertices:           {}", self.vertices)?;
        writeln!(f, "Faces:              {}", self.faces)?;
        writeln!(f, "Edges:              {}", self.edges)?;
        writeln!(f, "Watertight:         {}", self.is_watertight)?;
        writeln!(f, "Winding consistent: {}", self.is_winding_consistent)?;
        writeln!(f, "Euler number:       {}", self.euler_number)?;
        match self.bounds {
            Some([min, max]) => write!(
                f,
                "Bounds:             [{:.4}, {:.4}, {:.4}] to [{:.4}, {:.4}, {:.4}]",
                min[0], min[1], min[2], max[0], max[1], max[2]
            ),
            None => write!(f, "Bounds:             (empty)"),
        }
    }
}

/// Compute statistics for a mesh.
///
/// Out-of-range face indices do not panic; such a mesh simply reports as not
/// watertight.
pub fn mesh_stats(mesh: &Mesh) -> MeshStats {
    let adjacency = MeshAdjacency::build(&mesh.faces);
    let edges = adjacency.edge_count();
    let valid = mesh.check_indices().is_ok();

    MeshStats {
        vertices: mesh.vertex_count(),
        faces: mesh.face_count(),
        edges,
        is_watertight: valid
            && !mesh.faces.is_empty()
            && adjacency.is_watertight()
            && adjacency.is_manifold(),
        is_winding_consistent: is_winding_consistent(&mesh.faces),
        euler_number: mesh.vertex_count() as i64 - edges as i64 + mesh.face_count() as i64,
        bounds: mesh
            .bounds()
            .map(|(min, max)| [[min.x, min.y, min.z], [max.x, max.y, max.z]]),
    }
}

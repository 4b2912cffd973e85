//! Connected component analysis and floater removal.
//!
//! A connected component is a set of faces linked through shared edges.
//! Generated meshes often carry small detached fragments ("floaters") next
//! to the main surface; [`remove_floaters`] drops them.

use std::cmp::Reverse;

use hashbrown::HashMap;
use tracing::{debug, info};

use crate::adjacency::MeshAdjacency;
use crate::types::Mesh;

/// Default component size threshold, as a fraction of the total face count.
pub const DEFAULT_FLOATER_RATIO: f64 = 0.005;

/// Result of connected component analysis.
#[derive(Debug, Clone)]
pub struct ComponentAnalysis {
    /// Number of connected components found.
    pub component_count: usize,
    /// Face indices for each component, sorted by component size (largest first).
    pub components: Vec<Vec<u32>>,
}

impl ComponentAnalysis {
    /// Check if the mesh is fully connected (single component).
    pub fn is_connected(&self) -> bool {
        self.component_count == 1
    }

    /// Size of the largest component in faces.
    pub fn largest_component_size(&self) -> usize {
        self.components.first().map(|c| c.len()).unwrap_or(0)
    }
}

/// Find all connected components in a mesh.
///
/// Flood fill over faces; two faces are connected if they share an edge.
///
/// # Example
/// ```
/// use shapegen_mesh::Mesh;
/// use shapegen_mesh::components::find_connected_components;
///
/// let mesh = Mesh::from_raw(
///     &[
///         [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0],
///         [10.0, 0.0, 0.0], [11.0, 0.0, 0.0], [10.0, 1.0, 0.0],
///     ],
///     &[[0, 1, 2], [3, 4, 5]],
/// );
///
/// let analysis = find_connected_components(&mesh);
/// assert_eq!(analysis.component_count, 2);
/// ```
pub fn find_connected_components(mesh: &Mesh) -> ComponentAnalysis {
    if mesh.faces.is_empty() {
        return ComponentAnalysis {
            component_count: 0,
            components: Vec::new(),
        };
    }

    let adjacency = MeshAdjacency::build(&mesh.faces);
    let face_count = mesh.faces.len();

    let mut face_neighbors: Vec<Vec<u32>> = vec![Vec::new(); face_count];
    for faces in adjacency.edge_to_faces.values() {
        for (i, &f0) in faces.iter().enumerate() {
            for &f1 in &faces[i + 1..] {
                face_neighbors[f0 as usize].push(f1);
                face_neighbors[f1 as usize].push(f0);
            }
        }
    }

    let mut visited = vec![false; face_count];
    let mut components: Vec<Vec<u32>> = Vec::new();

    for start_face in 0..face_count {
        if visited[start_face] {
            continue;
        }

        let mut component = Vec::new();
        let mut stack = vec![start_face as u32];
        visited[start_face] = true;

        while let Some(face_idx) = stack.pop() {
            component.push(face_idx);

            for &neighbor in &face_neighbors[face_idx as usize] {
                if !visited[neighbor as usize] {
                    visited[neighbor as usize] = true;
                    stack.push(neighbor);
                }
            }
        }

        components.push(component);
    }

    components.sort_by_key(|c| Reverse(c.len()));

    debug!(
        "Found {} connected component(s) in mesh with {} faces",
        components.len(),
        face_count
    );

    ComponentAnalysis {
        component_count: components.len(),
        components,
    }
}

/// Remove connected components whose face count is below `ratio * face_count`.
///
/// The largest component is always kept. Returns the number of faces removed.
/// When nothing qualifies the mesh is left untouched, including vertex order
/// and any unreferenced vertices.
pub fn remove_floaters(mesh: &mut Mesh, ratio: f64) -> usize {
    let analysis = find_connected_components(mesh);
    if analysis.component_count <= 1 {
        return 0;
    }

    let threshold = ratio * mesh.faces.len() as f64;
    let mut keep_face = vec![false; mesh.faces.len()];
    let mut removed_components = 0usize;

    for (idx, component) in analysis.components.iter().enumerate() {
        if idx == 0 || (component.len() as f64) >= threshold {
            for &f in component {
                keep_face[f as usize] = true;
            }
        } else {
            removed_components += 1;
        }
    }

    if removed_components == 0 {
        return 0;
    }

    let original_faces = mesh.faces.len();
    let kept_faces: Vec<[u32; 3]> = mesh
        .faces
        .iter()
        .zip(&keep_face)
        .filter(|&(_, &keep)| keep)
        .map(|(f, _)| *f)
        .collect();

    // Compact vertices, preserving their relative order.
    let mut used = vec![false; mesh.vertices.len()];
    for face in &kept_faces {
        for &v in face {
            used[v as usize] = true;
        }
    }
    let mut old_to_new: HashMap<u32, u32> = HashMap::new();
    let mut new_vertices = Vec::new();
    for (old_idx, vertex) in mesh.vertices.iter().enumerate() {
        if used[old_idx] {
            old_to_new.insert(old_idx as u32, new_vertices.len() as u32);
            new_vertices.push(vertex.clone());
        }
    }

    mesh.faces = kept_faces
        .iter()
        .map(|face| face.map(|v| old_to_new[&v]))
        .collect();
    mesh.vertices = new_vertices;
    mesh.face_normals.clear();

    let removed_faces = original_faces - mesh.faces.len();
    info!(
        "Removed {} floater component(s) ({} faces, threshold {:.1} faces)",
        removed_components, removed_faces, threshold
    );

    removed_faces
}

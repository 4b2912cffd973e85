//! Face normals, vertex normals and coherent face orientation.

use std::collections::VecDeque;

use nalgebra::Vector3;
use tracing::{debug, info};

use crate::adjacency::{MeshAdjacency, edge_key};
use crate::error::{MeshError, MeshResult};
use crate::{Mesh, Triangle};

/// Recompute per-face unit normals into `mesh.face_normals`.
///
/// Degenerate faces get a zero normal. Returns the number of degenerate faces.
pub fn compute_face_normals(mesh: &mut Mesh) -> MeshResult<usize> {
    mesh.check_indices()?;
    if mesh.faces.is_empty() {
        return Err(MeshError::normals_failed("mesh has no faces"));
    }

    let mut degenerate = 0usize;
    mesh.face_normals = mesh
        .triangles()
        .map(|tri| {
            tri.normal().unwrap_or_else(|| {
                degenerate += 1;
                Vector3::zeros()
            })
        })
        .collect();

    if degenerate == mesh.faces.len() {
        mesh.face_normals.clear();
        return Err(MeshError::normals_failed("every face is degenerate"));
    }

    debug!(
        "Computed {} face normals ({} degenerate)",
        mesh.faces.len(),
        degenerate
    );
    Ok(degenerate)
}

/// Compute vertex normals as the area-weighted average of adjacent face normals.
pub fn compute_vertex_normals(mesh: &mut Mesh) -> MeshResult<()> {
    mesh.check_indices()?;
    if mesh.faces.is_empty() {
        return Err(MeshError::normals_failed("mesh has no faces"));
    }

    let mut accum: Vec<Vector3<f64>> = vec![Vector3::zeros(); mesh.vertices.len()];
    for face in &mesh.faces {
        let tri = Triangle::new(
            mesh.vertices[face[0] as usize].position,
            mesh.vertices[face[1] as usize].position,
            mesh.vertices[face[2] as usize].position,
        );
        // Length is twice the area, which gives the area weighting.
        let weighted = tri.normal_unnormalized();
        for &v in face {
            accum[v as usize] += weighted;
        }
    }

    for (vertex, n) in mesh.vertices.iter_mut().zip(accum) {
        let len_sq = n.norm_squared();
        vertex.normal = (len_sq > f64::EPSILON).then(|| n / len_sq.sqrt());
    }

    debug!(
        "Computed vertex normals for {} vertices",
        mesh.vertices.len()
    );
    Ok(())
}

/// Whether edge (a, b) appears in `face` as a -> b.
fn traverses(face: &[u32; 3], a: u32, b: u32) -> bool {
    (0..3).any(|i| face[i] == a && face[(i + 1) % 3] == b)
}

/// Reorient faces so every manifold edge is traversed in opposite directions
/// by its two faces.
///
/// Orientation propagates breadth-first through each connected component.
/// Closed components that end up inside-out are flipped as a whole so their
/// normals point outward. Stored normals are refreshed for flipped faces.
/// Returns the number of faces flipped.
pub fn orient_faces_coherently(mesh: &mut Mesh) -> MeshResult<usize> {
    mesh.check_indices()?;
    if mesh.faces.is_empty() {
        return Ok(0);
    }

    let adjacency = MeshAdjacency::build(&mesh.faces);
    let face_count = mesh.faces.len();
    let mut visited = vec![false; face_count];
    let mut flip = vec![false; face_count];
    let mut components = 0usize;

    for start in 0..face_count {
        if visited[start] {
            continue;
        }
        components += 1;
        visited[start] = true;

        let mut component = vec![start];
        let mut closed = true;
        let mut queue: VecDeque<usize> = VecDeque::from([start]);

        while let Some(f) = queue.pop_front() {
            let face = mesh.faces[f];
            for i in 0..3 {
                let (a, b) = (face[i], face[(i + 1) % 3]);
                let Some(neighbors) = adjacency.edge_to_faces.get(&edge_key(a, b)) else {
                    continue;
                };
                if neighbors.len() != 2 {
                    closed = false;
                    continue;
                }
                let Some(&n) = neighbors.iter().find(|&&n| n as usize != f) else {
                    continue;
                };
                let n = n as usize;
                if visited[n] {
                    continue;
                }
                visited[n] = true;

                // Effective direction of (a, b) in `f` after its own flip.
                let same = traverses(&mesh.faces[n], a, b);
                flip[n] = same != flip[f];
                component.push(n);
                queue.push_back(n);
            }
        }

        if closed {
            let volume: f64 = component
                .iter()
                .map(|&f| {
                    let mut face = mesh.faces[f];
                    if flip[f] {
                        face.swap(1, 2);
                    }
                    let [p0, p1, p2] = face.map(|v| mesh.vertices[v as usize].position.coords);
                    p0.dot(&p1.cross(&p2))
                })
                .sum();
            if volume < 0.0 {
                for &f in &component {
                    flip[f] = !flip[f];
                }
            }
        }
    }

    let flipped = flip.iter().filter(|&&f| f).count();
    if flipped == 0 {
        debug!(
            "Face orientation already coherent across {} component(s)",
            components
        );
        return Ok(0);
    }

    let refresh_face_normals = mesh.has_face_normals();
    for (idx, &should_flip) in flip.iter().enumerate() {
        if should_flip {
            mesh.faces[idx].swap(1, 2);
            if refresh_face_normals {
                mesh.face_normals[idx] = -mesh.face_normals[idx];
            }
        }
    }
    if mesh.vertices.iter().any(|v| v.normal.is_some()) {
        compute_vertex_normals(mesh)?;
    }

    info!(
        "Reoriented {} faces across {} component(s)",
        flipped, components
    );
    Ok(flipped)
}

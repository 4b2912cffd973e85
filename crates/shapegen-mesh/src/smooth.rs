//! Surface smoothing.
//!
//! [`taubin_smooth`] alternates a shrinking and an inflating umbrella step so
//! the overall volume is preserved. [`cotangent_smooth`] is a geometry-aware
//! Laplacian used when the Taubin pass is rejected.

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::debug;

use crate::adjacency::{MeshAdjacency, edge_key};
use crate::error::{MeshError, MeshResult};
use crate::Mesh;

/// Parameters for Taubin smoothing.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct SmoothParams {
    /// Number of shrink/inflate iteration pairs. Default: 2
    pub iterations: usize,
    /// Positive relaxation factor. Default: 0.5
    pub lambda: f64,
    /// Negative relaxation factor, with |mu| > lambda. Default: -0.53
    pub mu: f64,
    /// Keep boundary vertices fixed. Default: false
    pub preserve_boundary: bool,
}

impl Default for SmoothParams {
    fn default() -> Self {
        Self {
            iterations: 2,
            lambda: 0.5,
            mu: -0.53,
            preserve_boundary: false,
        }
    }
}

impl SmoothParams {
    fn validate(&self) -> MeshResult<()> {
        if !(self.lambda > 0.0 && self.lambda < 1.0) {
            return Err(MeshError::smoothing_failed(format!(
                "lambda must be in (0, 1), got {}",
                self.lambda
            )));
        }
        if !(self.mu < -self.lambda) {
            return Err(MeshError::smoothing_failed(format!(
                "mu must be below -lambda ({}), got {}",
                -self.lambda,
                self.mu
            )));
        }
        Ok(())
    }
}

/// Sorted, deduplicated one-ring neighbors for every vertex.
fn vertex_neighbors(mesh: &Mesh) -> Vec<Vec<u32>> {
    let mut neighbors: Vec<Vec<u32>> = vec![Vec::new(); mesh.vertices.len()];
    for face in &mesh.faces {
        for i in 0..3 {
            let v0 = face[i];
            let v1 = face[(i + 1) % 3];
            neighbors[v0 as usize].push(v1);
            neighbors[v1 as usize].push(v0);
        }
    }
    for n in &mut neighbors {
        n.sort_unstable();
        n.dedup();
    }
    neighbors
}

fn boundary_mask(mesh: &Mesh) -> Vec<bool> {
    let mut mask = vec![false; mesh.vertices.len()];
    for (a, b) in MeshAdjacency::build(&mesh.faces).boundary_edges() {
        mask[a as usize] = true;
        mask[b as usize] = true;
    }
    mask
}

/// One umbrella step: x_i += factor * (mean(neighbors) - x_i).
fn umbrella_step(
    positions: &[Point3<f64>],
    neighbors: &[Vec<u32>],
    fixed: &[bool],
    factor: f64,
) -> Vec<Point3<f64>> {
    positions
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            let ring = &neighbors[i];
            if ring.is_empty() || fixed[i] {
                return *p;
            }
            let sum: Vector3<f64> = ring.iter().map(|&j| positions[j as usize].coords).sum();
            let centroid = sum / ring.len() as f64;
            p + (centroid - p.coords) * factor
        })
        .collect()
}

fn commit(mesh: &mut Mesh, positions: Vec<Point3<f64>>, stage: &str) -> MeshResult<usize> {
    if positions.iter().any(|p| !p.coords.iter().all(|c| c.is_finite())) {
        return Err(MeshError::smoothing_failed(format!(
            "{} produced non-finite coordinates",
            stage
        )));
    }

    let mut moved = 0;
    for (vertex, p) in mesh.vertices.iter_mut().zip(positions) {
        if vertex.position != p {
            vertex.position = p;
            moved += 1;
        }
    }
    mesh.face_normals.clear();
    Ok(moved)
}

/// Volume-preserving Taubin smoothing. Returns the number of vertices moved.
///
/// The mesh is left untouched on error.
pub fn taubin_smooth(mesh: &mut Mesh, params: &SmoothParams) -> MeshResult<usize> {
    mesh.check_indices()?;
    params.validate()?;
    if mesh.faces.is_empty() {
        return Err(MeshError::smoothing_failed("mesh has no faces"));
    }

    let neighbors = vertex_neighbors(mesh);
    let fixed = if params.preserve_boundary {
        boundary_mask(mesh)
    } else {
        vec![false; mesh.vertices.len()]
    };

    let mut positions: Vec<Point3<f64>> = mesh.vertices.iter().map(|v| v.position).collect();
    for _ in 0..params.iterations {
        positions = umbrella_step(&positions, &neighbors, &fixed, params.lambda);
        positions = umbrella_step(&positions, &neighbors, &fixed, params.mu);
    }

    let moved = commit(mesh, positions, "taubin smoothing")?;
    debug!(
        "Taubin smoothing: {} iterations, {} vertices moved",
        params.iterations, moved
    );
    Ok(moved)
}

/// Cotangent weights per undirected edge: (cot alpha + cot beta) / 2.
///
/// Obtuse angles give negative cotangents; they are clamped at zero.
fn cotangent_weights(positions: &[Point3<f64>], faces: &[[u32; 3]]) -> HashMap<(u32, u32), f64> {
    let mut weights: HashMap<(u32, u32), f64> = HashMap::new();
    for face in faces {
        for k in 0..3 {
            let i = face[k];
            let j = face[(k + 1) % 3];
            let o = face[(k + 2) % 3];
            let u = positions[i as usize] - positions[o as usize];
            let v = positions[j as usize] - positions[o as usize];
            let cross = u.cross(&v).norm();
            let cot = if cross > 1e-12 { u.dot(&v) / cross } else { 0.0 };
            *weights.entry(edge_key(i, j)).or_insert(0.0) += 0.5 * cot.max(0.0);
        }
    }
    weights
}

/// Cotangent-weighted Laplacian smoothing. Returns the number of vertices moved.
///
/// `lambda` is the step size toward the weighted neighborhood centroid.
pub fn cotangent_smooth(mesh: &mut Mesh, iterations: usize, lambda: f64) -> MeshResult<usize> {
    mesh.check_indices()?;
    if mesh.faces.is_empty() {
        return Err(MeshError::smoothing_failed("mesh has no faces"));
    }
    if !(lambda > 0.0 && lambda <= 1.0) {
        return Err(MeshError::smoothing_failed(format!(
            "lambda must be in (0, 1], got {}",
            lambda
        )));
    }

    let neighbors = vertex_neighbors(mesh);
    let mut positions: Vec<Point3<f64>> = mesh.vertices.iter().map(|v| v.position).collect();

    for _ in 0..iterations {
        let weights = cotangent_weights(&positions, &mesh.faces);
        positions = positions
            .par_iter()
            .enumerate()
            .map(|(i, p)| {
                let mut total = 0.0;
                let mut acc = Vector3::zeros();
                for &j in &neighbors[i] {
                    let w = weights.get(&edge_key(i as u32, j)).copied().unwrap_or(0.0);
                    total += w;
                    acc += (positions[j as usize] - p) * w;
                }
                if total > 1e-12 {
                    p + acc * (lambda / total)
                } else {
                    *p
                }
            })
            .collect();
    }

    let moved = commit(mesh, positions, "cotangent smoothing")?;
    debug!(
        "Cotangent smoothing: {} iterations, {} vertices moved",
        iterations, moved
    );
    Ok(moved)
}

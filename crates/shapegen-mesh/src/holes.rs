//! Hole detection and filling.
//!
//! Holes are traced as directed boundary loops so the patch triangles wind
//! consistently with the surrounding surface.

use hashbrown::{HashMap, HashSet};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::adjacency::MeshAdjacency;
use crate::error::{MeshError, MeshResult};
use crate::{Mesh, Triangle};

/// Default maximum hole size, in boundary edges.
pub const DEFAULT_MAX_HOLE_SIZE: usize = 100;

/// A boundary loop representing a hole in the mesh.
#[derive(Debug, Clone)]
pub struct BoundaryLoop {
    /// Vertex indices in fill order. Consecutive pairs are the reversed
    /// boundary half-edges of the surrounding faces.
    pub vertices: Vec<u32>,
}

impl BoundaryLoop {
    /// Number of edges (and vertices) in the loop.
    pub fn edge_count(&self) -> usize {
        self.vertices.len()
    }
}

/// Outcome of a hole filling pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoleFillReport {
    /// Holes closed.
    pub filled: usize,
    /// Holes left open because they exceed the size limit.
    pub skipped: usize,
    /// Triangles added.
    pub faces_added: usize,
}

/// Detect all closed boundary loops in the mesh.
pub fn detect_holes(mesh: &Mesh, adjacency: &MeshAdjacency) -> Vec<BoundaryLoop> {
    // For each boundary edge u->v as it appears in its face, record v->u.
    let mut next: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut edge_count = 0usize;
    for (a, b) in adjacency.boundary_edges() {
        let Some(&[face_idx]) = adjacency.faces_for_edge(a, b) else {
            continue;
        };
        let face = mesh.faces[face_idx as usize];
        let forward = (0..3).any(|i| face[i] == a && face[(i + 1) % 3] == b);
        let (u, v) = if forward { (a, b) } else { (b, a) };
        next.entry(v).or_default().push(u);
        edge_count += 1;
    }

    if edge_count == 0 {
        return Vec::new();
    }
    debug!("Found {} boundary edges", edge_count);

    let mut used: HashSet<(u32, u32)> = HashSet::new();
    let mut starts: Vec<u32> = next.keys().copied().collect();
    starts.sort_unstable();

    let mut loops = Vec::new();
    for start in starts {
        let outgoing = next.get(&start).cloned().unwrap_or_default();
        for first in outgoing {
            if used.contains(&(start, first)) {
                continue;
            }

            let mut loop_vertices = vec![start];
            let mut current = start;
            let mut step = first;
            let mut closed = false;

            loop {
                used.insert((current, step));
                if step == start {
                    closed = true;
                    break;
                }
                loop_vertices.push(step);
                current = step;

                let candidate = next.get(&current).and_then(|outs| {
                    outs.iter()
                        .copied()
                        .find(|&n| !used.contains(&(current, n)))
                });
                match candidate {
                    Some(n) => step = n,
                    None => break,
                }
            }

            if !closed {
                warn!("Boundary loop starting at vertex {} is not closed", start);
            } else if loop_vertices.len() >= 3 {
                loops.push(BoundaryLoop {
                    vertices: loop_vertices,
                });
            }
        }
    }

    debug!(
        "Detected {} holes, sizes: {:?}",
        loops.len(),
        loops.iter().map(|l| l.edge_count()).collect::<Vec<_>>()
    );

    loops
}

/// Fill a hole using ear clipping triangulation, falling back to a fan.
///
/// Returns the new triangles to add to the mesh.
pub fn fill_hole_ear_clipping(mesh: &Mesh, boundary: &BoundaryLoop) -> Vec<[u32; 3]> {
    let n = boundary.vertices.len();
    if n < 3 {
        return Vec::new();
    }

    let positions: Vec<Point3<f64>> = boundary
        .vertices
        .iter()
        .map(|&idx| mesh.vertices[idx as usize].position)
        .collect();

    let hole_normal = compute_hole_normal(&positions);

    let mut remaining: Vec<usize> = (0..n).collect();
    let mut triangles = Vec::with_capacity(n - 2);

    while remaining.len() > 3 {
        let len = remaining.len();
        let ear = (0..len).find(|&i| {
            let prev = remaining[(i + len - 1) % len];
            let next = remaining[(i + 1) % len];
            is_ear(&positions, &remaining, prev, remaining[i], next, &hole_normal)
        });

        let Some(i) = ear else {
            debug!(
                "Ear clipping stuck with {} vertices remaining, using fan triangulation",
                len
            );
            break;
        };

        let prev = remaining[(i + len - 1) % len];
        let next = remaining[(i + 1) % len];
        triangles.push([
            boundary.vertices[prev],
            boundary.vertices[remaining[i]],
            boundary.vertices[next],
        ]);
        remaining.remove(i);
    }

    if remaining.len() >= 3 {
        let center = remaining[0];
        for w in remaining[1..].windows(2) {
            triangles.push([
                boundary.vertices[center],
                boundary.vertices[w[0]],
                boundary.vertices[w[1]],
            ]);
        }
    }

    triangles
}

/// Newell normal of a polygon.
fn compute_hole_normal(positions: &[Point3<f64>]) -> Vector3<f64> {
    let n = positions.len();
    let mut normal: Vector3<f64> = Vector3::zeros();
    for i in 0..n {
        let a = positions[i];
        let b = positions[(i + 1) % n];
        normal.x += (a.y - b.y) * (a.z + b.z);
        normal.y += (a.z - b.z) * (a.x + b.x);
        normal.z += (a.x - b.x) * (a.y + b.y);
    }

    let len = normal.norm();
    if len > f64::EPSILON {
        normal / len
    } else {
        Vector3::z()
    }
}

fn is_ear(
    positions: &[Point3<f64>],
    remaining: &[usize],
    prev: usize,
    curr: usize,
    next: usize,
    hole_normal: &Vector3<f64>,
) -> bool {
    let p_prev = positions[prev];
    let p_curr = positions[curr];
    let p_next = positions[next];

    let Some(tri_normal) = Triangle::new(p_prev, p_curr, p_next).normal() else {
        return false;
    };

    // Reflex corner.
    if tri_normal.dot(hole_normal) <= 0.0 {
        return false;
    }

    !remaining.iter().any(|&idx| {
        idx != prev
            && idx != curr
            && idx != next
            && point_in_triangle_2d(&positions[idx], &p_prev, &p_curr, &p_next, hole_normal)
    })
}

/// Point-in-triangle test after projecting away the dominant normal axis.
fn point_in_triangle_2d(
    p: &Point3<f64>,
    v0: &Point3<f64>,
    v1: &Point3<f64>,
    v2: &Point3<f64>,
    normal: &Vector3<f64>,
) -> bool {
    let abs_normal = normal.abs();

    let project = |q: &Point3<f64>| -> (f64, f64) {
        if abs_normal.z >= abs_normal.x && abs_normal.z >= abs_normal.y {
            (q.x, q.y)
        } else if abs_normal.y >= abs_normal.x {
            (q.x, q.z)
        } else {
            (q.y, q.z)
        }
    };

    let (p, a, b, c) = (project(p), project(v0), project(v1), project(v2));
    let sign = |p1: (f64, f64), p2: (f64, f64), p3: (f64, f64)| -> f64 {
        (p1.0 - p3.0) * (p2.1 - p3.1) - (p2.0 - p3.0) * (p1.1 - p3.1)
    };

    let d1 = sign(p, a, b);
    let d2 = sign(p, b, c);
    let d3 = sign(p, c, a);

    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;

    !(has_neg && has_pos)
}

/// Smallest accepted `max_hole_size`: a hole needs three boundary edges.
pub const MIN_HOLE_SIZE: usize = 3;

/// Fill every hole with at most `max_hole_size` boundary edges.
///
/// Larger holes are left open. Holes are triangulated in parallel and the
/// patches appended afterwards.
pub fn fill_holes(mesh: &mut Mesh, max_hole_size: usize) -> MeshResult<HoleFillReport> {
    mesh.check_indices()?;
    if max_hole_size < MIN_HOLE_SIZE {
        return Err(MeshError::hole_fill_failed(format!(
            "max_hole_size must be at least {}, got {}",
            MIN_HOLE_SIZE, max_hole_size
        )));
    }

    let adjacency = MeshAdjacency::build(&mesh.faces);
    let holes = detect_holes(mesh, &adjacency);

    let (fillable, skipped): (Vec<_>, Vec<_>) = holes
        .into_iter()
        .partition(|hole| hole.edge_count() <= max_hole_size);

    for hole in &skipped {
        debug!(
            "Leaving hole with {} edges open (max: {})",
            hole.edge_count(),
            max_hole_size
        );
    }

    let patches: Vec<Vec<[u32; 3]>> = fillable
        .par_iter()
        .map(|hole| fill_hole_ear_clipping(mesh, hole))
        .collect();

    let mut report = HoleFillReport {
        filled: 0,
        skipped: skipped.len(),
        faces_added: 0,
    };
    for patch in patches {
        if patch.is_empty() {
            continue;
        }
        report.filled += 1;
        report.faces_added += patch.len();
        mesh.faces.extend(patch);
    }

    if report.filled > 0 {
        mesh.face_normals.clear();
        info!(
            "Filled {} holes with {} triangles ({} left open)",
            report.filled, report.faces_added, report.skipped
        );
    }

    Ok(report)
}

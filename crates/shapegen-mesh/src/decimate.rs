//! Mesh decimation using edge collapse with quadric error metrics.
//!
//! Edges are collapsed cheapest-first according to the Garland-Heckbert
//! quadric error. Collapses are rejected when they would move a boundary
//! vertex, flip a face normal, or change the surface topology.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use hashbrown::{HashMap, HashSet};
use nalgebra::{Matrix3, Point3, Vector3};
use tracing::{debug, info};

use crate::adjacency::{MeshAdjacency, edge_key};
use crate::{Mesh, Vertex};

/// Parameters for mesh decimation.
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct DecimateParams {
    /// Target number of triangles.
    pub target_faces: usize,
    /// Keep boundary vertices fixed. Default: true
    pub preserve_boundary: bool,
    /// Cost multiplier for edges touching the boundary when boundaries are
    /// allowed to move. Default: 3.0
    pub boundary_weight: f64,
    /// Reject collapses that flip any adjacent face normal. Default: true
    pub preserve_normal: bool,
    /// Reject collapses that violate the link condition. Default: true
    pub preserve_topology: bool,
    /// Place merged vertices at the quadric optimum instead of the midpoint.
    /// Default: true
    pub optimal_placement: bool,
    /// Maximum error allowed for a single collapse. If None, no limit.
    pub max_error: Option<f64>,
}

impl Default for DecimateParams {
    fn default() -> Self {
        Self {
            target_faces: 40_000,
            preserve_boundary: true,
            boundary_weight: 3.0,
            preserve_normal: true,
            preserve_topology: true,
            optimal_placement: true,
            max_error: None,
        }
    }
}

impl DecimateParams {
    /// Create params targeting a specific triangle count.
    pub fn with_target_faces(count: usize) -> Self {
        Self {
            target_faces: count,
            ..Default::default()
        }
    }
}

/// Result of mesh decimation.
#[derive(Debug, Clone)]
pub struct DecimateResult {
    /// The decimated mesh.
    pub mesh: Mesh,
    /// Number of triangles in original mesh.
    pub original_faces: usize,
    /// Number of triangles in decimated mesh.
    pub final_faces: usize,
    /// Number of edge collapses performed.
    pub collapses_performed: usize,
    /// Number of edge collapses rejected by the preservation checks.
    pub collapses_rejected: usize,
}

/// Quadric error matrix (4x4 symmetric matrix stored as 10 values).
#[derive(Debug, Clone, Copy, Default)]
struct Quadric {
    // Upper triangle of:
    // [a b c d]
    // [  e f g]
    // [    h i]
    // [      j]
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
    g: f64,
    h: f64,
    i: f64,
    j: f64,
}

impl Quadric {
    /// Create a quadric from a plane equation (ax + by + cz + d = 0).
    fn from_plane(n: Vector3<f64>, d: f64, weight: f64) -> Self {
        let (a, b, c) = (n.x, n.y, n.z);
        Self {
            a: weight * a * a,
            b: weight * a * b,
            c: weight * a * c,
            d: weight * a * d,
            e: weight * b * b,
            f: weight * b * c,
            g: weight * b * d,
            h: weight * c * c,
            i: weight * c * d,
            j: weight * d * d,
        }
    }

    fn add(&mut self, other: &Quadric) {
        self.a += other.a;
        self.b += other.b;
        self.c += other.c;
        self.d += other.d;
        self.e += other.e;
        self.f += other.f;
        self.g += other.g;
        self.h += other.h;
        self.i += other.i;
        self.j += other.j;
    }

    fn combined(&self, other: &Quadric) -> Quadric {
        let mut q = *self;
        q.add(other);
        q
    }

    /// v^T Q v for v = [x, y, z, 1].
    fn evaluate(&self, p: &Point3<f64>) -> f64 {
        let (x, y, z) = (p.x, p.y, p.z);
        self.a * x * x
            + 2.0 * self.b * x * y
            + 2.0 * self.c * x * z
            + 2.0 * self.d * x
            + self.e * y * y
            + 2.0 * self.f * y * z
            + 2.0 * self.g * y
            + self.h * z * z
            + 2.0 * self.i * z
            + self.j
    }

    /// Point minimizing the error, or None if the system is singular.
    fn optimal_point(&self) -> Option<Point3<f64>> {
        let m = Matrix3::new(
            self.a, self.b, self.c, //
            self.b, self.e, self.f, //
            self.c, self.f, self.h,
        );
        if m.determinant().abs() < 1e-10 {
            return None;
        }
        let inv = m.try_inverse()?;
        let p = inv * Vector3::new(-self.d, -self.g, -self.i);
        Some(Point3::from(p))
    }
}

/// An edge collapse candidate in the priority queue.
#[derive(Debug, Clone)]
struct EdgeCollapse {
    v1: u32,
    v2: u32,
    cost: f64,
    target: Point3<f64>,
    /// Vertex versions at push time; stale entries are skipped on pop.
    stamp: (u32, u32),
}

impl PartialEq for EdgeCollapse {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for EdgeCollapse {}

impl PartialOrd for EdgeCollapse {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCollapse {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior.
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
    }
}

/// Working state for a decimation run.
struct Collapser<'a> {
    params: &'a DecimateParams,
    positions: Vec<Point3<f64>>,
    alive: Vec<bool>,
    version: Vec<u32>,
    faces: Vec<Option<[u32; 3]>>,
    vertex_faces: Vec<Vec<u32>>,
    quadrics: Vec<Quadric>,
    boundary: Vec<bool>,
    active_faces: usize,
}

impl<'a> Collapser<'a> {
    fn new(mesh: &Mesh, params: &'a DecimateParams) -> Self {
        let n = mesh.vertices.len();
        let adjacency = MeshAdjacency::build(&mesh.faces);

        let mut boundary = vec![false; n];
        for (a, b) in adjacency.boundary_edges() {
            boundary[a as usize] = true;
            boundary[b as usize] = true;
        }

        let mut vertex_faces = vec![Vec::new(); n];
        for (face_idx, face) in mesh.faces.iter().enumerate() {
            for &v in face {
                vertex_faces[v as usize].push(face_idx as u32);
            }
        }

        let positions: Vec<Point3<f64>> = mesh.vertices.iter().map(|v| v.position).collect();
        let quadrics = compute_vertex_quadrics(&positions, &mesh.faces);

        Self {
            params,
            positions,
            alive: vec![true; n],
            version: vec![0; n],
            faces: mesh.faces.iter().copied().map(Some).collect(),
            vertex_faces,
            quadrics,
            boundary,
            active_faces: mesh.faces.len(),
        }
    }

    fn live_faces_of(&self, v: u32) -> impl Iterator<Item = (u32, [u32; 3])> + '_ {
        self.vertex_faces[v as usize]
            .iter()
            .filter_map(|&f| self.faces[f as usize].map(|face| (f, face)))
    }

    fn neighbors(&self, v: u32) -> HashSet<u32> {
        let mut result = HashSet::new();
        for (_, face) in self.live_faces_of(v) {
            for &u in &face {
                if u != v {
                    result.insert(u);
                }
            }
        }
        result
    }

    fn candidate(&self, v1: u32, v2: u32) -> Option<EdgeCollapse> {
        let b1 = self.boundary[v1 as usize];
        let b2 = self.boundary[v2 as usize];
        if self.params.preserve_boundary && (b1 || b2) {
            return None;
        }

        let q = self.quadrics[v1 as usize].combined(&self.quadrics[v2 as usize]);
        let p1 = self.positions[v1 as usize];
        let p2 = self.positions[v2 as usize];
        let midpoint = Point3::from((p1.coords + p2.coords) * 0.5);

        let target = if self.params.optimal_placement {
            q.optimal_point().unwrap_or(midpoint)
        } else {
            midpoint
        };

        let mut cost = q.evaluate(&target).max(0.0);
        if b1 || b2 {
            cost *= self.params.boundary_weight;
        }

        Some(EdgeCollapse {
            v1,
            v2,
            cost,
            target,
            stamp: (self.version[v1 as usize], self.version[v2 as usize]),
        })
    }

    fn is_stale(&self, c: &EdgeCollapse) -> bool {
        !self.alive[c.v1 as usize]
            || !self.alive[c.v2 as usize]
            || self.version[c.v1 as usize] != c.stamp.0
            || self.version[c.v2 as usize] != c.stamp.1
    }

    /// Link condition: the common neighbors of v1 and v2 must be exactly the
    /// apex vertices of the faces sharing the edge, and the collapse must not
    /// produce a face that already exists.
    fn preserves_topology(&self, v1: u32, v2: u32) -> bool {
        let n1 = self.neighbors(v1);
        let n2 = self.neighbors(v2);
        if !n1.contains(&v2) {
            return false;
        }

        let apexes: HashSet<u32> = self
            .live_faces_of(v1)
            .filter(|(_, face)| face.contains(&v2))
            .filter_map(|(_, face)| face.iter().copied().find(|&u| u != v1 && u != v2))
            .collect();
        let common: HashSet<u32> = n1.intersection(&n2).copied().collect();
        if common != apexes {
            return false;
        }

        let existing: HashSet<[u32; 3]> = self
            .live_faces_of(v1)
            .map(|(_, face)| sorted_face(face))
            .collect();
        for (_, face) in self.live_faces_of(v2) {
            if face.contains(&v1) {
                continue;
            }
            let moved = face.map(|u| if u == v2 { v1 } else { u });
            if existing.contains(&sorted_face(moved)) {
                return false;
            }
        }
        true
    }

    fn preserves_normals(&self, v1: u32, v2: u32, target: &Point3<f64>) -> bool {
        for v in [v1, v2] {
            for (_, face) in self.live_faces_of(v) {
                if face.contains(&v1) && face.contains(&v2) {
                    continue;
                }
                let [a, b, c] = face.map(|u| self.positions[u as usize]);
                let before = (b - a).cross(&(c - a));
                let moved = face.map(|u| {
                    if u == v {
                        *target
                    } else {
                        self.positions[u as usize]
                    }
                });
                let after = (moved[1] - moved[0]).cross(&(moved[2] - moved[0]));
                if after.norm_squared() < 1e-24 || before.dot(&after) <= 0.0 {
                    return false;
                }
            }
        }
        true
    }

    fn collapse(&mut self, v1: u32, v2: u32, target: Point3<f64>) {
        let v2_faces = std::mem::take(&mut self.vertex_faces[v2 as usize]);
        for f in v2_faces {
            let Some(face) = self.faces[f as usize] else {
                continue;
            };
            if face.contains(&v1) {
                self.faces[f as usize] = None;
                self.active_faces -= 1;
            } else {
                self.faces[f as usize] = Some(face.map(|u| if u == v2 { v1 } else { u }));
                self.vertex_faces[v1 as usize].push(f);
            }
        }
        let faces = &self.faces;
        self.vertex_faces[v1 as usize].retain(|&f| faces[f as usize].is_some());

        self.positions[v1 as usize] = target;
        let q2 = self.quadrics[v2 as usize];
        self.quadrics[v1 as usize].add(&q2);
        self.alive[v2 as usize] = false;
        self.version[v1 as usize] += 1;
        self.boundary[v1 as usize] |= self.boundary[v2 as usize];
    }
}

fn sorted_face(mut face: [u32; 3]) -> [u32; 3] {
    face.sort_unstable();
    face
}

/// Decimate a mesh down to `params.target_faces` triangles.
///
/// When the target is at or above the current face count the mesh is
/// returned unchanged.
///
/// # Example
/// ```
/// use shapegen_mesh::{Mesh, decimate_mesh, DecimateParams};
///
/// let mesh = Mesh::from_raw(
///     &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.5, 1.0, 0.0]],
///     &[[0, 1, 2]],
/// );
///
/// let result = decimate_mesh(&mesh, &DecimateParams::with_target_faces(100));
/// assert_eq!(result.final_faces, 1);
/// ```
pub fn decimate_mesh(mesh: &Mesh, params: &DecimateParams) -> DecimateResult {
    let original_faces = mesh.faces.len();

    if original_faces <= params.target_faces {
        debug!(
            "Decimation skipped: {} faces already at or below target {}",
            original_faces, params.target_faces
        );
        return DecimateResult {
            mesh: mesh.clone(),
            original_faces,
            final_faces: original_faces,
            collapses_performed: 0,
            collapses_rejected: 0,
        };
    }

    let mut state = Collapser::new(mesh, params);

    let mut heap = BinaryHeap::new();
    let mut seen = HashSet::new();
    for face in &mesh.faces {
        for i in 0..3 {
            let (a, b) = (face[i], face[(i + 1) % 3]);
            if seen.insert(edge_key(a, b))
                && let Some(c) = state.candidate(a, b)
            {
                heap.push(c);
            }
        }
    }

    let mut collapses_performed = 0;
    let mut collapses_rejected = 0;

    while state.active_faces > params.target_faces {
        let Some(collapse) = heap.pop() else {
            break;
        };

        if state.is_stale(&collapse) {
            continue;
        }
        let (v1, v2) = (collapse.v1, collapse.v2);

        if params.preserve_topology && !state.preserves_topology(v1, v2) {
            collapses_rejected += 1;
            continue;
        }

        if params.preserve_normal && !state.preserves_normals(v1, v2, &collapse.target) {
            collapses_rejected += 1;
            continue;
        }

        if let Some(max_error) = params.max_error
            && collapse.cost > max_error
        {
            collapses_rejected += 1;
            continue;
        }

        state.collapse(v1, v2, collapse.target);
        collapses_performed += 1;

        for neighbor in state.neighbors(v1) {
            if let Some(c) = state.candidate(v1, neighbor) {
                heap.push(c);
            }
        }
    }

    let final_mesh = build_final_mesh(mesh, &state);
    let final_faces = final_mesh.faces.len();

    info!(
        "Decimated {} -> {} faces ({} collapses, {} rejected)",
        original_faces, final_faces, collapses_performed, collapses_rejected
    );

    DecimateResult {
        mesh: final_mesh,
        original_faces,
        final_faces,
        collapses_performed,
        collapses_rejected,
    }
}

/// Compute quadric error matrices for each vertex.
fn compute_vertex_quadrics(positions: &[Point3<f64>], faces: &[[u32; 3]]) -> Vec<Quadric> {
    let mut quadrics = vec![Quadric::default(); positions.len()];

    for face in faces {
        let [p0, p1, p2] = face.map(|v| positions[v as usize]);
        let normal = (p1 - p0).cross(&(p2 - p0));
        let len = normal.norm();
        if len < 1e-10 {
            continue;
        }
        let n = normal / len;
        let d = -n.dot(&p0.coords);
        let q = Quadric::from_plane(n, d, 1.0);

        for &vi in face {
            quadrics[vi as usize].add(&q);
        }
    }

    quadrics
}

fn build_final_mesh(source: &Mesh, state: &Collapser<'_>) -> Mesh {
    let mut vertex_map: HashMap<u32, u32> = HashMap::new();
    let mut vertices = Vec::new();
    let mut faces = Vec::with_capacity(state.active_faces);

    for face in state.faces.iter().flatten() {
        let mapped = face.map(|old| {
            *vertex_map.entry(old).or_insert_with(|| {
                let mut v: Vertex = source.vertices[old as usize].clone();
                v.position = state.positions[old as usize];
                v.normal = None;
                vertices.push(v);
                (vertices.len() - 1) as u32
            })
        });
        faces.push(mapped);
    }

    Mesh {
        vertices,
        faces,
        face_normals: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjacency::is_winding_consistent;

    fn make_cube(size: f64) -> Mesh {
        let s = size / 2.0;
        Mesh::from_raw(
            &[
                [-s, -s, -s],
                [s, -s, -s],
                [s, s, -s],
                [-s, s, -s],
                [-s, -s, s],
                [s, -s, s],
                [s, s, s],
                [-s, s, s],
            ],
            &[
                [0, 2, 1],
                [0, 3, 2],
                [4, 5, 6],
                [4, 6, 7],
                [0, 1, 5],
                [0, 5, 4],
                [3, 7, 6],
                [3, 6, 2],
                [0, 4, 7],
                [0, 7, 3],
                [1, 2, 6],
                [1, 6, 5],
            ],
        )
    }

    /// UV sphere with outward winding.
    fn make_sphere(rings: u32, segments: u32) -> Mesh {
        let mut positions = vec![[0.0, 0.0, 1.0]];
        for r in 1..rings {
            let theta = std::f64::consts::PI * r as f64 / rings as f64;
            for s in 0..segments {
                let phi = 2.0 * std::f64::consts::PI * s as f64 / segments as f64;
                positions.push([
                    theta.sin() * phi.cos(),
                    theta.sin() * phi.sin(),
                    theta.cos(),
                ]);
            }
        }
        positions.push([0.0, 0.0, -1.0]);
        let south = positions.len() as u32 - 1;
        let ring = |r: u32, s: u32| 1 + r * segments + (s % segments);

        let mut faces = Vec::new();
        for s in 0..segments {
            faces.push([0, ring(0, s), ring(0, s + 1)]);
        }
        for r in 0..rings - 2 {
            for s in 0..segments {
                let a = ring(r, s);
                let b = ring(r, s + 1);
                let c = ring(r + 1, s);
                let d = ring(r + 1, s + 1);
                faces.push([a, c, d]);
                faces.push([a, d, b]);
            }
        }
        for s in 0..segments {
            faces.push([south, ring(rings - 2, s + 1), ring(rings - 2, s)]);
        }
        Mesh::from_raw(&positions, &faces)
    }

    #[test]
    fn test_decimate_empty_mesh() {
        let result = decimate_mesh(&Mesh::default(), &DecimateParams::with_target_faces(0));
        assert_eq!(result.original_faces, 0);
        assert_eq!(result.final_faces, 0);
        assert_eq!(result.collapses_performed, 0);
    }

    #[test]
    fn test_target_above_face_count_is_noop() {
        let mesh = make_cube(10.0);
        let result = decimate_mesh(&mesh, &DecimateParams::with_target_faces(100));
        assert_eq!(result.final_faces, 12);
        assert_eq!(result.mesh.vertex_count(), 8);
        assert_eq!(result.mesh.faces, mesh.faces);
    }

    #[test]
    fn test_decimate_sphere_reaches_target() {
        let mesh = make_sphere(12, 16);
        let original = mesh.face_count();
        let target = original / 2;

        let result = decimate_mesh(&mesh, &DecimateParams::with_target_faces(target));

        assert_eq!(result.original_faces, original);
        assert!(result.final_faces <= target);
        assert!(result.collapses_performed > 0);
    }

    #[test]
    fn test_decimate_preserves_closed_manifold() {
        let mesh = make_sphere(12, 16);
        let result = decimate_mesh(&mesh, &DecimateParams::with_target_faces(80));

        let adj = MeshAdjacency::build(&result.mesh.faces);
        assert!(adj.is_watertight());
        assert!(adj.is_manifold());
        assert!(is_winding_consistent(&result.mesh.faces));
        // Euler characteristic of a sphere.
        let chi = result.mesh.vertex_count() as i64 - adj.edge_count() as i64
            + result.mesh.face_count() as i64;
        assert_eq!(chi, 2);
    }

    #[test]
    fn test_boundary_vertices_stay_fixed() {
        // Open hemisphere: drop the southern cap and lower rings.
        let mut mesh = make_sphere(12, 16);
        mesh.faces.retain(|f| {
            f.iter()
                .all(|&v| mesh.vertices[v as usize].position.z >= -1e-9)
        });
        let boundary_before: Vec<Point3<f64>> = {
            let adj = MeshAdjacency::build(&mesh.faces);
            let verts: HashSet<u32> = adj.boundary_edges().flat_map(|(a, b)| [a, b]).collect();
            verts
                .into_iter()
                .map(|v| mesh.vertices[v as usize].position)
                .collect()
        };

        let target = mesh.face_count() / 2;
        let result = decimate_mesh(&mesh, &DecimateParams::with_target_faces(target));

        for p in boundary_before {
            assert!(
                result
                    .mesh
                    .vertices
                    .iter()
                    .any(|v| (v.position - p).norm() < 1e-12),
                "boundary vertex {p:?} moved"
            );
        }
    }

    #[test]
    fn test_quadric_optimal_point_on_plane_intersection() {
        let mut q = Quadric::from_plane(Vector3::x(), -1.0, 1.0);
        q.add(&Quadric::from_plane(Vector3::y(), -2.0, 1.0));
        q.add(&Quadric::from_plane(Vector3::z(), -3.0, 1.0));
        let p = q.optimal_point().expect("non-singular");
        assert!((p - Point3::new(1.0, 2.0, 3.0)).norm() < 1e-9);
        assert!(q.evaluate(&p).abs() < 1e-9);
    }
}

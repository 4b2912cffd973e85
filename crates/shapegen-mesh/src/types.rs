//! Mesh data types shared by every stage.
//!
//! A [`Mesh`] is what the generative model hands back and what each repair
//! stage consumes: positions, triangle indices, and optional per-vertex and
//! per-face attributes.

use nalgebra::{Point3, Vector3};

use crate::error::{MeshError, MeshResult};

/// 8-bit RGB vertex color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl VertexColor {
    #[inline]
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Quantize unit-range channels, as OBJ and glTF store them.
    pub fn from_unit_rgb(r: f32, g: f32, b: f32) -> Self {
        let quantize = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::new(quantize(r), quantize(g), quantize(b))
    }
}

/// Position plus the attributes a generator or the normals stage may attach.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub position: Point3<f64>,
    /// Unit normal, set by `compute_vertex_normals` or read from the input file.
    pub normal: Option<Vector3<f64>>,
    pub color: Option<VertexColor>,
}

impl Vertex {
    #[inline]
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Point3::new(x, y, z),
            normal: None,
            color: None,
        }
    }
}

/// Indexed triangle mesh.
///
/// Faces wind counter-clockwise seen from outside. `face_normals` is either
/// empty or holds exactly one entry per face; stages that reorder or drop
/// faces clear it.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub faces: Vec<[u32; 3]>,
    pub face_normals: Vec<Vector3<f64>>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(vertex_count: usize, face_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            faces: Vec::with_capacity(face_count),
            face_normals: Vec::new(),
        }
    }

    /// Mesh from bare positions and index triples, with no attributes.
    pub fn from_raw(positions: &[[f64; 3]], faces: &[[u32; 3]]) -> Self {
        Self {
            vertices: positions
                .iter()
                .map(|&[x, y, z]| Vertex::from_coords(x, y, z))
                .collect(),
            faces: faces.to_vec(),
            face_normals: Vec::new(),
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// True when there is nothing to render: no vertices or no faces.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    #[inline]
    pub fn has_face_normals(&self) -> bool {
        !self.faces.is_empty() && self.face_normals.len() == self.faces.len()
    }

    /// Fail on the first face that points past the vertex array.
    ///
    /// Model output and decoded files are checked with this before any
    /// stage indexes into `vertices`.
    pub fn check_indices(&self) -> MeshResult<()> {
        let vertex_count = self.vertices.len();
        self.faces
            .iter()
            .enumerate()
            .find_map(|(face_index, face)| {
                face.iter()
                    .find(|&&i| i as usize >= vertex_count)
                    .map(|&bad| MeshError::invalid_vertex_index(face_index, bad, vertex_count))
            })
            .map_or(Ok(()), Err)
    }

    /// Axis-aligned bounds as `(min, max)`, or `None` without vertices.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.vertices.first()?.position;
        Some(self.vertices[1..].iter().fold((first, first), |(lo, hi), v| {
            (lo.inf(&v.position), hi.sup(&v.position))
        }))
    }

    fn corners(&self, &[a, b, c]: &[u32; 3]) -> Triangle {
        Triangle::new(
            self.vertices[a as usize].position,
            self.vertices[b as usize].position,
            self.vertices[c as usize].position,
        )
    }

    /// Faces resolved to positions. Indices must be valid.
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.faces.iter().map(|face| self.corners(face))
    }

    pub fn triangle(&self, face_index: usize) -> Option<Triangle> {
        self.faces.get(face_index).map(|face| self.corners(face))
    }

    /// Enclosed volume by the divergence theorem.
    ///
    /// Positive for a closed, outward-wound surface and negative when the
    /// surface is inside-out. Open meshes give an origin-dependent value.
    pub fn signed_volume(&self) -> f64 {
        self.triangles()
            .map(|t| t.v0.coords.dot(&t.v1.coords.cross(&t.v2.coords)))
            .sum::<f64>()
            / 6.0
    }
}

/// One face with its corner positions resolved.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Point3<f64>,
    pub v1: Point3<f64>,
    pub v2: Point3<f64>,
}

impl Triangle {
    #[inline]
    pub fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Cross product of the two edges leaving `v0`; its length is twice the area.
    #[inline]
    pub fn normal_unnormalized(&self) -> Vector3<f64> {
        (self.v1 - self.v0).cross(&(self.v2 - self.v0))
    }

    /// Unit normal, or `None` for a zero-area face.
    pub fn normal(&self) -> Option<Vector3<f64>> {
        self.normal_unnormalized().try_normalize(f64::EPSILON.sqrt())
    }

    #[inline]
    pub fn area(&self) -> f64 {
        0.5 * self.normal_unnormalized().norm()
    }

    /// Null faces for cleanup: area below `threshold`.
    #[inline]
    pub fn is_degenerate(&self, threshold: f64) -> bool {
        self.area() < threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_raw_has_no_attributes() {
        let mesh = Mesh::from_raw(&[[1.0, 2.0, 3.0]], &[]);
        let v = &mesh.vertices[0];
        assert_eq!(v.position, Point3::new(1.0, 2.0, 3.0));
        assert!(v.normal.is_none() && v.color.is_none());
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_unit_rgb_quantizes_and_clamps() {
        assert_eq!(VertexColor::from_unit_rgb(1.0, 0.5, -0.2), VertexColor::new(255, 128, 0));
    }

    #[test]
    fn test_triangle_normal_and_area() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(0.0, 3.0, 0.0),
        );
        let normal = tri.normal().unwrap();
        assert_relative_eq!(normal.z, 1.0);
        assert_relative_eq!(tri.area(), 4.5);
        assert!(!tri.is_degenerate(1e-12));
    }

    #[test]
    fn test_collinear_triangle_is_degenerate() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        );
        assert!(tri.normal().is_none());
        assert!(tri.is_degenerate(1e-12));
    }

    #[test]
    fn test_bounds() {
        let mesh = Mesh::from_raw(
            &[[0.0, 0.0, 0.0], [10.0, 5.0, 3.0], [-2.0, 8.0, 1.0]],
            &[[0, 1, 2]],
        );
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Point3::new(-2.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(10.0, 8.0, 3.0));
        assert!(Mesh::new().bounds().is_none());
    }

    #[test]
    fn test_signed_volume_flips_with_winding() {
        let mut tet = Mesh::from_raw(
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            &[[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        );
        assert_relative_eq!(tet.signed_volume(), 1.0 / 6.0);
        for face in &mut tet.faces {
            face.swap(1, 2);
        }
        assert_relative_eq!(tet.signed_volume(), -1.0 / 6.0);
    }

    #[test]
    fn test_check_indices() {
        let ok = Mesh::from_raw(&[[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[[0, 1, 2]]);
        assert!(ok.check_indices().is_ok());

        let bad = Mesh::from_raw(
            &[[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2], [0, 1, 7]],
        );
        assert!(matches!(
            bad.check_indices().unwrap_err(),
            MeshError::InvalidVertexIndex {
                face_index: 1,
                vertex_index: 7,
                vertex_count: 3
            }
        ));
    }
}

//! Mesh topology queries via adjacency structures.

use hashbrown::{HashMap, HashSet};

/// Canonical (min, max) key for an undirected edge.
#[inline]
pub fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b { (a, b) } else { (b, a) }
}

/// Lightweight topology structure for mesh queries.
///
/// Vertex-to-face and edge-to-face lookups without a full half-edge structure.
#[derive(Debug, Clone)]
pub struct MeshAdjacency {
    /// Maps vertex index → list of face indices that use this vertex.
    pub vertex_to_faces: HashMap<u32, Vec<u32>>,

    /// Maps edge (min_idx, max_idx) → list of face indices that share this edge.
    pub edge_to_faces: HashMap<(u32, u32), Vec<u32>>,
}

impl MeshAdjacency {
    /// Build adjacency structures from a face list.
    pub fn build(faces: &[[u32; 3]]) -> Self {
        let mut vertex_to_faces: HashMap<u32, Vec<u32>> = HashMap::new();
        let mut edge_to_faces: HashMap<(u32, u32), Vec<u32>> = HashMap::new();

        for (face_idx, &[v0, v1, v2]) in faces.iter().enumerate() {
            let face_idx = face_idx as u32;

            vertex_to_faces.entry(v0).or_default().push(face_idx);
            vertex_to_faces.entry(v1).or_default().push(face_idx);
            vertex_to_faces.entry(v2).or_default().push(face_idx);

            for &(a, b) in &[(v0, v1), (v1, v2), (v2, v0)] {
                edge_to_faces.entry(edge_key(a, b)).or_default().push(face_idx);
            }
        }

        Self {
            vertex_to_faces,
            edge_to_faces,
        }
    }

    /// Find boundary edges (edges with exactly 1 adjacent face).
    pub fn boundary_edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.edge_to_faces
            .iter()
            .filter(|(_, faces)| faces.len() == 1)
            .map(|(&edge, _)| edge)
    }

    /// Find non-manifold edges (edges with more than 2 adjacent faces).
    pub fn non_manifold_edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.edge_to_faces
            .iter()
            .filter(|(_, faces)| faces.len() > 2)
            .map(|(&edge, _)| edge)
    }

    /// Check if the mesh is manifold (at most 2 faces per edge).
    pub fn is_manifold(&self) -> bool {
        self.edge_to_faces.values().all(|faces| faces.len() <= 2)
    }

    /// Check if the mesh is watertight (no boundary edges).
    pub fn is_watertight(&self) -> bool {
        self.edge_to_faces.values().all(|faces| faces.len() >= 2)
    }

    /// Number of unique undirected edges.
    pub fn edge_count(&self) -> usize {
        self.edge_to_faces.len()
    }

    /// Count boundary edges.
    pub fn boundary_edge_count(&self) -> usize {
        self.edge_to_faces
            .values()
            .filter(|faces| faces.len() == 1)
            .count()
    }

    /// Count non-manifold edges.
    pub fn non_manifold_edge_count(&self) -> usize {
        self.edge_to_faces
            .values()
            .filter(|faces| faces.len() > 2)
            .count()
    }

    /// Get faces adjacent to an edge. The edge is canonicalized.
    pub fn faces_for_edge(&self, v0: u32, v1: u32) -> Option<&[u32]> {
        self.edge_to_faces.get(&edge_key(v0, v1)).map(|v| v.as_slice())
    }

    /// Split the faces around `vertex` into fans connected through edges
    /// incident to `vertex`.
    ///
    /// A manifold vertex has exactly one fan. A bowtie vertex, where two
    /// surface sheets touch at a single point, has two or more.
    pub fn vertex_fans(&self, vertex: u32, faces: &[[u32; 3]]) -> Vec<Vec<u32>> {
        let Some(incident) = self.vertex_to_faces.get(&vertex) else {
            return Vec::new();
        };

        let mut visited: HashSet<u32> = HashSet::new();
        let mut fans = Vec::new();

        for &start in incident {
            if !visited.insert(start) {
                continue;
            }
            let mut fan = vec![start];
            let mut stack = vec![start];

            while let Some(f) = stack.pop() {
                for &other in &faces[f as usize] {
                    if other == vertex {
                        continue;
                    }
                    if let Some(neighbors) = self.edge_to_faces.get(&edge_key(vertex, other)) {
                        for &n in neighbors {
                            if visited.insert(n) {
                                fan.push(n);
                                stack.push(n);
                            }
                        }
                    }
                }
            }
            fans.push(fan);
        }

        fans
    }

    /// Vertices whose incident faces form more than one fan.
    pub fn non_manifold_vertices(&self, faces: &[[u32; 3]]) -> Vec<u32> {
        let mut result: Vec<u32> = self
            .vertex_to_faces
            .keys()
            .copied()
            .filter(|&v| self.vertex_fans(v, faces).len() > 1)
            .collect();
        result.sort_unstable();
        result
    }
}

/// Check that every interior edge is traversed in opposite directions by its
/// two faces.
pub fn is_winding_consistent(faces: &[[u32; 3]]) -> bool {
    let mut directed: HashMap<(u32, u32), u32> = HashMap::new();
    for &[a, b, c] in faces {
        for (u, v) in [(a, b), (b, c), (c, a)] {
            *directed.entry((u, v)).or_insert(0) += 1;
        }
    }
    directed.iter().all(|(_, &count)| count == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_triangle() -> Vec<[u32; 3]> {
        vec![[0, 1, 2]]
    }

    fn two_triangles_shared_edge() -> Vec<[u32; 3]> {
        vec![[0, 1, 2], [1, 0, 3]]
    }

    fn tetrahedron() -> Vec<[u32; 3]> {
        vec![[0, 1, 2], [0, 2, 3], [0, 3, 1], [1, 3, 2]]
    }

    #[test]
    fn test_single_triangle_is_not_watertight() {
        let adj = MeshAdjacency::build(&single_triangle());
        assert!(!adj.is_watertight());
        assert!(adj.is_manifold());
        assert_eq!(adj.boundary_edge_count(), 3);
    }

    #[test]
    fn test_tetrahedron_is_watertight() {
        let adj = MeshAdjacency::build(&tetrahedron());
        assert!(adj.is_watertight());
        assert!(adj.is_manifold());
        assert_eq!(adj.edge_count(), 6);
        assert_eq!(adj.non_manifold_edge_count(), 0);
        assert!(is_winding_consistent(&tetrahedron()));
    }

    #[test]
    fn test_edge_canonicalization() {
        let adj = MeshAdjacency::build(&two_triangles_shared_edge());
        assert_eq!(adj.faces_for_edge(0, 1), adj.faces_for_edge(1, 0));
        assert_eq!(adj.faces_for_edge(0, 1).map(|f| f.len()), Some(2));
    }

    #[test]
    fn test_flipped_face_breaks_winding() {
        let mut faces = tetrahedron();
        faces[0] = [0, 2, 1];
        assert!(!is_winding_consistent(&faces));
    }

    #[test]
    fn test_bowtie_vertex_has_two_fans() {
        // Two triangles touching only at vertex 0.
        let faces = vec![[0, 1, 2], [0, 3, 4]];
        let adj = MeshAdjacency::build(&faces);
        assert_eq!(adj.vertex_fans(0, &faces).len(), 2);
        assert_eq!(adj.non_manifold_vertices(&faces), vec![0]);
    }

    #[test]
    fn test_tetrahedron_vertices_are_manifold() {
        let faces = tetrahedron();
        let adj = MeshAdjacency::build(&faces);
        assert!(adj.non_manifold_vertices(&faces).is_empty());
    }
}

//! Topology repair operations used by the watertight stage and cleanup.
//!
//! Every operation validates face indices first and returns the number of
//! elements it changed, so callers can treat a failure as "mesh untouched".

use hashbrown::{HashMap, HashSet};
use nalgebra::Point3;
use tracing::{debug, info};

use crate::adjacency::MeshAdjacency;
use crate::error::MeshResult;
use crate::{Mesh, Triangle};

/// Default tolerance for merging coincident vertices.
pub const DEFAULT_WELD_EPSILON: f64 = 1e-8;

/// Default area below which a face counts as null.
pub const DEFAULT_NULL_AREA: f64 = 1e-12;

/// Fix non-manifold edges by removing excess faces.
///
/// For each edge shared by more than two faces, the two largest-area faces
/// are kept and the rest removed. Returns the number of faces removed.
pub fn fix_non_manifold_edges(mesh: &mut Mesh) -> MeshResult<usize> {
    mesh.check_indices()?;

    let adjacency = MeshAdjacency::build(&mesh.faces);
    let mut faces_to_remove: HashSet<u32> = HashSet::new();
    let mut edges_fixed = 0usize;

    for faces in adjacency.edge_to_faces.values() {
        if faces.len() <= 2 {
            continue;
        }
        edges_fixed += 1;

        let mut by_area: Vec<(u32, f64)> = faces
            .iter()
            .map(|&f| (f, face_area(mesh, f)))
            .collect();
        by_area.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        for (f, _) in by_area.into_iter().skip(2) {
            faces_to_remove.insert(f);
        }
    }

    if faces_to_remove.is_empty() {
        return Ok(0);
    }

    retain_faces(mesh, |idx| !faces_to_remove.contains(&(idx as u32)));

    info!(
        "Fixed {} non-manifold edges by removing {} faces",
        edges_fixed,
        faces_to_remove.len()
    );
    Ok(faces_to_remove.len())
}

/// Split non-manifold (bowtie) vertices.
///
/// Each extra fan of faces around such a vertex gets its own copy of the
/// vertex. Returns the number of vertices added.
pub fn fix_non_manifold_vertices(mesh: &mut Mesh) -> MeshResult<usize> {
    mesh.check_indices()?;

    let adjacency = MeshAdjacency::build(&mesh.faces);
    let mut added = 0usize;

    for vertex in adjacency.non_manifold_vertices(&mesh.faces) {
        let fans = adjacency.vertex_fans(vertex, &mesh.faces);
        for fan in fans.into_iter().skip(1) {
            let new_idx = mesh.vertices.len() as u32;
            let mut copy = mesh.vertices[vertex as usize].clone();
            copy.normal = None;
            mesh.vertices.push(copy);

            for f in fan {
                for idx in mesh.faces[f as usize].iter_mut() {
                    if *idx == vertex {
                        *idx = new_idx;
                    }
                }
            }
            added += 1;
        }
    }

    if added > 0 {
        info!("Split non-manifold vertices: {} vertices added", added);
    }
    Ok(added)
}

/// Remove duplicate faces from the mesh.
///
/// Faces with the same vertex set are duplicates regardless of winding or
/// starting vertex. The first occurrence is kept. Returns the number removed.
pub fn remove_duplicate_faces(mesh: &mut Mesh) -> MeshResult<usize> {
    mesh.check_indices()?;

    let mut seen: HashSet<[u32; 3]> = HashSet::new();
    let keep: Vec<bool> = mesh
        .faces
        .iter()
        .map(|face| {
            let mut key = *face;
            key.sort_unstable();
            seen.insert(key)
        })
        .collect();

    let removed = keep.iter().filter(|&&k| !k).count();
    if removed == 0 {
        return Ok(0);
    }

    retain_faces(mesh, |idx| keep[idx]);
    info!("Removed {} duplicate faces", removed);
    Ok(removed)
}

/// Merge vertices that are within `epsilon` of each other.
///
/// Uses spatial hashing. Faces that collapse as a result are dropped and
/// orphaned vertices compacted. Returns the number of vertices merged.
pub fn merge_duplicate_vertices(mesh: &mut Mesh, epsilon: f64) -> MeshResult<usize> {
    mesh.check_indices()?;
    if mesh.vertices.is_empty() {
        return Ok(0);
    }

    let cell_size = (epsilon * 2.0).max(f64::MIN_POSITIVE);

    let mut spatial_hash: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();
    for (idx, vertex) in mesh.vertices.iter().enumerate() {
        let cell = pos_to_cell(&vertex.position, cell_size);
        spatial_hash.entry(cell).or_default().push(idx as u32);
    }

    let mut vertex_remap: Vec<u32> = (0..mesh.vertices.len() as u32).collect();
    let mut merged_count = 0usize;

    for (idx, vertex) in mesh.vertices.iter().enumerate() {
        let idx = idx as u32;
        if vertex_remap[idx as usize] != idx {
            continue;
        }

        let cell = pos_to_cell(&vertex.position, cell_size);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(candidates) =
                        spatial_hash.get(&(cell.0 + dx, cell.1 + dy, cell.2 + dz))
                    else {
                        continue;
                    };
                    for &other in candidates {
                        if other <= idx || vertex_remap[other as usize] != other {
                            continue;
                        }
                        let dist = (vertex.position - mesh.vertices[other as usize].position).norm();
                        if dist <= epsilon {
                            vertex_remap[other as usize] = idx;
                            merged_count += 1;
                        }
                    }
                }
            }
        }
    }

    if merged_count == 0 {
        return Ok(0);
    }

    for face in &mut mesh.faces {
        for v in face.iter_mut() {
            *v = vertex_remap[*v as usize];
        }
    }
    mesh.faces
        .retain(|&[i0, i1, i2]| i0 != i1 && i1 != i2 && i0 != i2);
    mesh.face_normals.clear();
    remove_unreferenced_vertices(mesh);

    info!(
        "Merged {} duplicate vertices (epsilon = {:.1e})",
        merged_count, epsilon
    );
    Ok(merged_count)
}

/// Remove null faces: repeated indices or area below `area_threshold`.
///
/// Returns the number of faces removed.
pub fn remove_null_faces(mesh: &mut Mesh, area_threshold: f64) -> MeshResult<usize> {
    mesh.check_indices()?;

    let keep: Vec<bool> = mesh
        .faces
        .iter()
        .map(|&[i0, i1, i2]| {
            if i0 == i1 || i1 == i2 || i0 == i2 {
                return false;
            }
            let tri = Triangle::new(
                mesh.vertices[i0 as usize].position,
                mesh.vertices[i1 as usize].position,
                mesh.vertices[i2 as usize].position,
            );
            !tri.is_degenerate(area_threshold)
        })
        .collect();

    let removed = keep.iter().filter(|&&k| !k).count();
    if removed == 0 {
        return Ok(0);
    }

    retain_faces(mesh, |idx| keep[idx]);
    info!(
        "Removed {} null faces (area < {:.1e})",
        removed, area_threshold
    );
    Ok(removed)
}

/// Remove unreferenced vertices and compact the vertex array.
///
/// Returns the number of vertices removed.
pub fn remove_unreferenced_vertices(mesh: &mut Mesh) -> usize {
    let original_count = mesh.vertices.len();

    let mut referenced = vec![false; original_count];
    for face in &mesh.faces {
        for &v in face {
            if let Some(slot) = referenced.get_mut(v as usize) {
                *slot = true;
            }
        }
    }

    if referenced.iter().all(|&r| r) {
        return 0;
    }

    let mut remap = vec![u32::MAX; original_count];
    let mut new_vertices = Vec::with_capacity(original_count);
    for (old_idx, vertex) in mesh.vertices.iter().enumerate() {
        if referenced[old_idx] {
            remap[old_idx] = new_vertices.len() as u32;
            new_vertices.push(vertex.clone());
        }
    }

    for face in &mut mesh.faces {
        for v in face.iter_mut() {
            *v = remap[*v as usize];
        }
    }

    let removed = original_count - new_vertices.len();
    mesh.vertices = new_vertices;
    debug!("Removed {} unreferenced vertices", removed);
    removed
}

fn face_area(mesh: &Mesh, face_idx: u32) -> f64 {
    mesh.triangle(face_idx as usize)
        .map(|t| t.area())
        .unwrap_or(0.0)
}

fn retain_faces(mesh: &mut Mesh, keep: impl Fn(usize) -> bool) {
    let mut idx = 0;
    mesh.faces.retain(|_| {
        let k = keep(idx);
        idx += 1;
        k
    });
    mesh.face_normals.clear();
}

fn pos_to_cell(pos: &Point3<f64>, cell_size: f64) -> (i64, i64, i64) {
    (
        (pos.x / cell_size).floor() as i64,
        (pos.y / cell_size).floor() as i64,
        (pos.z / cell_size).floor() as i64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;

    fn quad() -> Mesh {
        Mesh::from_raw(
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            &[[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn test_remove_duplicate_faces_any_winding() {
        let mut mesh = quad();
        mesh.faces.push([2, 0, 1]);
        mesh.faces.push([0, 2, 1]);
        assert_eq!(remove_duplicate_faces(&mut mesh).unwrap(), 2);
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_fix_non_manifold_edge_keeps_two_largest() {
        let mut mesh = quad();
        // Third and fourth faces on edge (0, 2): one big fin, one tiny fin.
        mesh.vertices.push(Vertex::from_coords(0.5, 0.5, 5.0));
        mesh.vertices.push(Vertex::from_coords(0.5, 0.5, 0.01));
        mesh.faces.push([0, 2, 4]);
        mesh.faces.push([0, 2, 5]);

        let removed = fix_non_manifold_edges(&mut mesh).unwrap();
        assert_eq!(removed, 2);
        assert!(MeshAdjacency::build(&mesh.faces).is_manifold());
        assert!(mesh.faces.contains(&[0, 2, 4]));
    }

    #[test]
    fn test_split_bowtie_vertex() {
        let mut mesh = Mesh::from_raw(
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [-1.0, 0.0, 0.0],
                [0.0, -1.0, 0.0],
            ],
            &[[0, 1, 2], [0, 3, 4]],
        );

        let added = fix_non_manifold_vertices(&mut mesh).unwrap();
        assert_eq!(added, 1);
        assert_eq!(mesh.vertex_count(), 6);
        let adj = MeshAdjacency::build(&mesh.faces);
        assert!(adj.non_manifold_vertices(&mesh.faces).is_empty());
    }

    #[test]
    fn test_merge_duplicate_vertices() {
        // Two triangles with separate copies of the shared edge vertices.
        let mut mesh = Mesh::from_raw(
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            &[[0, 1, 2], [3, 4, 5]],
        );

        let merged = merge_duplicate_vertices(&mut mesh, DEFAULT_WELD_EPSILON).unwrap();
        assert_eq!(merged, 2);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 2);
        assert_eq!(
            MeshAdjacency::build(&mesh.faces).faces_for_edge(0, 2).map(|f| f.len()),
            Some(2)
        );
    }

    #[test]
    fn test_remove_null_faces() {
        let mut mesh = quad();
        mesh.faces.push([0, 0, 1]);
        mesh.vertices.push(Vertex::from_coords(2.0, 0.0, 0.0));
        mesh.faces.push([0, 1, 4]); // collinear
        assert_eq!(remove_null_faces(&mut mesh, DEFAULT_NULL_AREA).unwrap(), 2);
        assert_eq!(mesh.face_count(), 2);
    }

    #[test]
    fn test_invalid_indices_fail_without_mutation() {
        let mut mesh = quad();
        mesh.faces.push([0, 1, 42]);
        let before = mesh.faces.clone();
        assert!(remove_duplicate_faces(&mut mesh).is_err());
        assert!(fix_non_manifold_edges(&mut mesh).is_err());
        assert_eq!(mesh.faces, before);
    }

    #[test]
    fn test_remove_unreferenced_vertices() {
        let mut mesh = quad();
        mesh.vertices.push(Vertex::from_coords(9.0, 9.0, 9.0));
        assert_eq!(remove_unreferenced_vertices(&mut mesh), 1);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(remove_unreferenced_vertices(&mut mesh), 0);
    }
}

//! End-to-end tests for shapegen-mesh.
//!
//! These run the stages the way the generation pipeline does:
//! load -> basic -> advanced -> stats -> export.

use std::path::Path;

use shapegen_mesh::{
    AdvancedOptimizeConfig, AdvancedOptimizer, BasicOptimizeConfig, BasicOptimizer, ExportFormat,
    Mesh, MeshError, Vertex, decode_mesh, encode_mesh, load_mesh, mesh_stats, save_mesh,
    save_mesh_as,
};
use tempfile::TempDir;

/// Unit cube, 8 vertices and 12 outward-facing triangles.
fn create_test_cube(size: f64) -> Mesh {
    let mut mesh = Mesh::new();

    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0)); // 0
    mesh.vertices.push(Vertex::from_coords(size, 0.0, 0.0)); // 1
    mesh.vertices.push(Vertex::from_coords(size, size, 0.0)); // 2
    mesh.vertices.push(Vertex::from_coords(0.0, size, 0.0)); // 3
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, size)); // 4
    mesh.vertices.push(Vertex::from_coords(size, 0.0, size)); // 5
    mesh.vertices.push(Vertex::from_coords(size, size, size)); // 6
    mesh.vertices.push(Vertex::from_coords(0.0, size, size)); // 7

    // Bottom (z=0)
    mesh.faces.push([0, 2, 1]);
    mesh.faces.push([0, 3, 2]);
    // Top (z=size)
    mesh.faces.push([4, 5, 6]);
    mesh.faces.push([4, 6, 7]);
    // Front (y=0)
    mesh.faces.push([0, 1, 5]);
    mesh.faces.push([0, 5, 4]);
    // Back (y=size)
    mesh.faces.push([3, 7, 6]);
    mesh.faces.push([3, 6, 2]);
    // Left (x=0)
    mesh.faces.push([0, 4, 7]);
    mesh.faces.push([0, 7, 3]);
    // Right (x=size)
    mesh.faces.push([1, 2, 6]);
    mesh.faces.push([1, 6, 5]);

    mesh
}

/// UV sphere with `rings * segments * 2` triangles (minus the pole fans).
fn create_sphere(rings: u32, segments: u32) -> Mesh {
    let mut mesh = Mesh::new();
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 1.0));
    for r in 1..rings {
        let theta = std::f64::consts::PI * r as f64 / rings as f64;
        for s in 0..segments {
            let phi = 2.0 * std::f64::consts::PI * s as f64 / segments as f64;
            mesh.vertices.push(Vertex::from_coords(
                theta.sin() * phi.cos(),
                theta.sin() * phi.sin(),
                theta.cos(),
            ));
        }
    }
    let south = mesh.vertices.len() as u32;
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, -1.0));

    let ring = |r: u32, s: u32| 1 + (r - 1) * segments + (s % segments);
    for s in 0..segments {
        mesh.faces.push([0, ring(1, s), ring(1, s + 1)]);
    }
    for r in 1..rings - 1 {
        for s in 0..segments {
            let (a, b) = (ring(r, s), ring(r, s + 1));
            let (c, d) = (ring(r + 1, s), ring(r + 1, s + 1));
            mesh.faces.push([a, c, d]);
            mesh.faces.push([a, d, b]);
        }
    }
    for s in 0..segments {
        mesh.faces.push([south, ring(rings - 1, s + 1), ring(rings - 1, s)]);
    }
    mesh
}

#[test]
fn test_cube_under_budget_is_unchanged() {
    let cube = create_test_cube(1.0);
    let outcome = BasicOptimizer::new(BasicOptimizeConfig::with_max_faces(100))
        .run(cube.clone())
        .unwrap();

    assert_eq!(outcome.mesh.face_count(), 12);
    assert_eq!(outcome.mesh.vertex_count(), 8);
    assert!(outcome.warnings.is_empty());
    let stats = mesh_stats(&outcome.mesh);
    assert!(stats.is_watertight);
    assert_eq!(stats.euler_number, 2);
}

#[test]
fn test_sphere_decimated_to_budget() {
    let sphere = create_sphere(24, 32);
    let before = sphere.face_count();
    assert!(before > 1000);

    let outcome = BasicOptimizer::new(BasicOptimizeConfig::with_max_faces(300))
        .run(sphere)
        .unwrap();

    assert!(outcome.mesh.face_count() <= 300);
    assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
    let stats = mesh_stats(&outcome.mesh);
    assert!(stats.is_watertight);
    assert_eq!(stats.euler_number, 2);
}

#[test]
fn test_floater_removed_before_decimation() {
    let mut mesh = create_sphere(24, 32);
    let offset = mesh.vertices.len() as u32;
    // Tiny triangle far from the sphere.
    mesh.vertices.push(Vertex::from_coords(5.0, 5.0, 5.0));
    mesh.vertices.push(Vertex::from_coords(5.1, 5.0, 5.0));
    mesh.vertices.push(Vertex::from_coords(5.0, 5.1, 5.0));
    mesh.faces.push([offset, offset + 1, offset + 2]);

    let outcome = BasicOptimizer::new(BasicOptimizeConfig::default())
        .run(mesh)
        .unwrap();

    let (_, max) = outcome.mesh.bounds().unwrap();
    assert!(max.x <= 1.0 + 1e-9);
    assert_eq!(mesh_stats(&outcome.mesh).euler_number, 2);
}

#[test]
fn test_full_pipeline_through_files() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.obj");

    let mut open = create_test_cube(2.0);
    open.faces.truncate(10);
    save_mesh(&open, &input).unwrap();

    let loaded = load_mesh(&input).unwrap();
    let basic = BasicOptimizer::new(BasicOptimizeConfig::with_max_faces(1000))
        .run(loaded)
        .unwrap();
    let advanced = AdvancedOptimizer::new(AdvancedOptimizeConfig {
        make_watertight: true,
        fill_holes: true,
        recalculate_normals: true,
        ..Default::default()
    })
    .run(basic.mesh);

    assert!(advanced.warnings.is_empty(), "{:?}", advanced.warnings);
    let stats = mesh_stats(&advanced.mesh);
    assert!(stats.is_watertight);
    assert!(stats.is_winding_consistent);
    assert!(advanced.mesh.signed_volume() > 0.0);

    let output = dir.path().join("output.glb");
    save_mesh_as(&advanced.mesh, &output, ExportFormat::Glb).unwrap();
    let reloaded = load_mesh(&output).unwrap();
    assert_eq!(reloaded.face_count(), advanced.mesh.face_count());
}

#[test]
fn test_smoothing_keeps_topology() {
    let sphere = create_sphere(12, 16);
    let faces = sphere.faces.clone();
    let outcome = AdvancedOptimizer::new(AdvancedOptimizeConfig {
        smooth: true,
        smooth_iterations: 5,
        ..Default::default()
    })
    .run(sphere);

    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.mesh.faces, faces);
    // Taubin smoothing should not collapse the sphere.
    let volume = outcome.mesh.signed_volume();
    assert!(volume > 3.0 && volume < 4.5, "volume {}", volume);
}

#[test]
fn test_unsupported_export_format_is_validation_error() {
    let err = "fbx".parse::<ExportFormat>().unwrap_err();
    assert!(matches!(err, MeshError::UnsupportedFormat { .. }));
    assert!(err.code().is_validation());
    assert!(err.to_string().contains("fbx"));
}

#[test]
fn test_encode_every_format_non_empty() {
    let cube = create_test_cube(1.0);
    for format in ExportFormat::ALL {
        let bytes = encode_mesh(&cube, format).unwrap();
        assert!(!bytes.is_empty(), "{}", format);
    }
}

#[test]
fn test_ply_round_trip_keeps_faces() {
    for mesh in [create_test_cube(1.0), create_sphere(24, 32)] {
        let bytes = encode_mesh(&mesh, ExportFormat::Ply).unwrap();
        let decoded = decode_mesh(&bytes, ExportFormat::Ply, Path::new("mesh.ply")).unwrap();
        assert_eq!(decoded.vertex_count(), mesh.vertex_count());
        assert_eq!(decoded.faces, mesh.faces);
    }
}

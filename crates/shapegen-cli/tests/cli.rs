//! End-to-end runs of the shapegen binary.

use std::path::Path;
use std::process::{Command, Output};

const CUBE_OBJ: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
v 0 0 1
v 1 0 1
v 1 1 1
v 0 1 1
f 1 3 2
f 1 4 3
f 5 6 7
f 5 7 8
f 1 2 6
f 1 6 5
f 4 8 7
f 4 7 3
f 1 5 8
f 1 8 4
f 2 3 7
f 2 7 6
";

fn shapegen(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_shapegen"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run shapegen")
}

fn write_cube(dir: &Path) -> String {
    let path = dir.join("cube.obj");
    std::fs::write(&path, CUBE_OBJ).unwrap();
    path.display().to_string()
}

fn json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_stats_json() {
    let dir = tempfile::tempdir().unwrap();
    let cube = write_cube(dir.path());

    let value = json(&shapegen(&["--format", "json", "stats", &cube]));
    assert_eq!(value["faces"], 12);
    assert_eq!(value["vertices"], 8);
    assert_eq!(value["is_watertight"], true);
}

#[test]
fn test_optimize_writes_output() {
    let dir = tempfile::tempdir().unwrap();
    let cube = write_cube(dir.path());
    let out = dir.path().join("clean.stl");

    let value = json(&shapegen(&[
        "--format",
        "json",
        "optimize",
        &cube,
        "-o",
        out.to_str().unwrap(),
        "--normals",
    ]));
    assert_eq!(value["output_faces"], 12);
    assert_eq!(value["format"], "stl");
    assert!(value["warnings"].as_array().unwrap().is_empty());
    assert_eq!(std::fs::metadata(&out).unwrap().len(), 84 + 50 * 12);
}

#[test]
fn test_invalid_setting_exits_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let cube = write_cube(dir.path());
    let out = dir.path().join("clean.glb");

    let output = shapegen(&["optimize", &cube, "-o", out.to_str().unwrap(), "--max-faces", "5"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_faces"));
    assert!(!out.exists());
}

#[test]
fn test_convert_unknown_extension_fails() {
    let dir = tempfile::tempdir().unwrap();
    let cube = write_cube(dir.path());
    let out = dir.path().join("cube.fbx");

    let output = shapegen(&["convert", &cube, "-o", out.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_status_on_cpu() {
    let value = json(&shapegen(&["--format", "json", "status", "--device", "cpu"]));
    assert_eq!(value["device"], "cpu");
    assert_eq!(value["accelerated"], false);
    assert_eq!(value["gpu_total_gb"], 0.0);
}

#[test]
fn test_views_without_front_fails() {
    let output = shapegen(&["views", "--view", "left=/nonexistent/left.png"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("SHAPE-1001"));
}

#[test]
fn test_normalize_two_views() {
    let dir = tempfile::tempdir().unwrap();
    let front = dir.path().join("front.png");
    let left = dir.path().join("left.png");
    image::RgbaImage::from_fn(8, 8, |x, y| image::Rgba([(x * 30) as u8, (y * 30) as u8, 90, 255]))
        .save(&front)
        .unwrap();
    image::RgbaImage::from_pixel(8, 8, image::Rgba([20, 20, 20, 255]))
        .save(&left)
        .unwrap();
    let out = dir.path().join("normalized");

    let value = json(&shapegen(&[
        "--format",
        "json",
        "normalize",
        "--view",
        &format!("front={}", front.display()),
        "--view",
        &format!("left={}", left.display()),
        "-o",
        out.to_str().unwrap(),
    ]));
    assert_eq!(value["reference"], "front");
    assert!(out.join("front.png").exists());
    assert!(out.join("left.png").exists());
}

//! Error types for mesh stages with rich diagnostics.
//!
//! Each error has a unique code in the format `MESH-XXXX`:
//! - `MESH-1xxx`: I/O errors (file reading, writing, parsing)
//! - `MESH-2xxx`: Validation errors (topology, indices)
//! - `MESH-3xxx`: Repair and optimization errors
//! - `MESH-4xxx`: Format errors (unsupported export or import target)
//!
//! # Example
//!
//! ```rust,ignore
//! use shapegen_mesh::{MeshError, ErrorCode};
//!
//! let err = MeshError::unsupported_format("fbx");
//! assert_eq!(err.code(), ErrorCode::UnsupportedFormat);
//! ```

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Formats accepted by [`crate::ExportFormat`], in display order.
pub const SUPPORTED_FORMATS: &[&str] = &["glb", "gltf", "obj", "ply", "stl", "off"];

/// Machine-readable error codes for mesh operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // I/O errors (1xxx)
    /// MESH-1001: Failed to read file
    IoRead = 1001,
    /// MESH-1002: Failed to write file
    IoWrite = 1002,
    /// MESH-1003: Failed to parse mesh data
    ParseError = 1003,

    // Validation errors (2xxx)
    /// MESH-2001: Face references invalid vertex index
    InvalidVertexIndex = 2001,
    /// MESH-2003: Mesh has no vertices or faces
    EmptyMesh = 2003,

    // Repair errors (3xxx)
    /// MESH-3001: Repair operation failed
    RepairFailed = 3001,
    /// MESH-3002: Hole filling failed
    HoleFillFailed = 3002,
    /// MESH-3007: Smoothing failed
    SmoothingFailed = 3007,
    /// MESH-3008: Normal recomputation failed
    NormalsFailed = 3008,

    // Format errors (4xxx)
    /// MESH-4001: Unsupported file format
    UnsupportedFormat = 4001,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `MESH-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::IoRead => "MESH-1001",
            ErrorCode::IoWrite => "MESH-1002",
            ErrorCode::ParseError => "MESH-1003",
            ErrorCode::InvalidVertexIndex => "MESH-2001",
            ErrorCode::EmptyMesh => "MESH-2003",
            ErrorCode::RepairFailed => "MESH-3001",
            ErrorCode::HoleFillFailed => "MESH-3002",
            ErrorCode::SmoothingFailed => "MESH-3007",
            ErrorCode::NormalsFailed => "MESH-3008",
            ErrorCode::UnsupportedFormat => "MESH-4001",
        }
    }

    /// True for errors caused by the caller's request rather than the mesh.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ErrorCode::UnsupportedFormat | ErrorCode::InvalidVertexIndex | ErrorCode::EmptyMesh
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for mesh errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Run repair operations to fix the issue.
    RunRepair { operations: Vec<String> },
    /// Use a different file format.
    UseDifferentFormat { suggested: Vec<String> },
    /// Adjust parameters for the operation.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// No automatic recovery available.
    None,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::RunRepair { operations } => {
                write!(f, "Run repair operations: {}", operations.join(", "))
            }
            RecoverySuggestion::UseDifferentFormat { suggested } => {
                write!(f, "Try using a different format: {}", suggested.join(", "))
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
            RecoverySuggestion::None => {
                write!(f, "No automatic recovery available")
            }
        }
    }
}

/// Location information for mesh errors.
#[derive(Debug, Clone)]
pub enum MeshLocation {
    /// Error at a specific face.
    Face {
        index: usize,
        vertices: Option<[u32; 3]>,
    },
    /// Error in a file.
    File { path: PathBuf },
    /// No specific location.
    Unknown,
}

impl std::fmt::Display for MeshLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeshLocation::Face { index, vertices } => {
                if let Some([a, b, c]) = vertices {
                    write!(f, "face {} with vertices [{}, {}, {}]", index, a, b, c)
                } else {
                    write!(f, "face {}", index)
                }
            }
            MeshLocation::File { path } => write!(f, "{}", path.display()),
            MeshLocation::Unknown => write!(f, "unknown location"),
        }
    }
}

/// Errors that can occur during mesh operations.
#[derive(Debug, Error, Diagnostic)]
pub enum MeshError {
    /// Error reading from a file.
    #[error("failed to read mesh from {path}")]
    #[diagnostic(
        code(mesh::io::read),
        help("Check that the file exists and is readable. Try: ls -la {}", path.display())
    )]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file or buffer.
    #[error("failed to write mesh to {path}")]
    #[diagnostic(
        code(mesh::io::write),
        help("Check that the directory exists and is writable")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing mesh data.
    #[error("failed to parse mesh from {path}: {details}")]
    #[diagnostic(
        code(mesh::parse::error),
        help("The data may be corrupted or in an unsupported format variant.")
    )]
    ParseError { path: PathBuf, details: String },

    /// Unsupported file format.
    #[error("unsupported mesh format: {format:?}")]
    #[diagnostic(
        code(mesh::format::unsupported),
        help("Supported formats: glb, gltf, obj, ply, stl, off")
    )]
    UnsupportedFormat { format: Option<String> },

    /// Empty mesh (no vertices or faces).
    #[error("mesh is empty: {details}")]
    #[diagnostic(
        code(mesh::validation::empty),
        help("The mesh must have at least one vertex and one face.")
    )]
    EmptyMesh { details: String },

    /// Mesh repair failed.
    #[error("mesh repair failed: {details}")]
    #[diagnostic(
        code(mesh::repair::failed),
        help("Try running individual repair operations to identify the specific issue.")
    )]
    RepairFailed { details: String },

    /// Invalid vertex index in face data.
    #[error(
        "invalid vertex index: face {face_index} references vertex {vertex_index}, but mesh only has {vertex_count} vertices"
    )]
    #[diagnostic(
        code(mesh::validation::vertex_index),
        help("The mesh producer emitted out-of-range face indices.")
    )]
    InvalidVertexIndex {
        face_index: usize,
        vertex_index: u32,
        vertex_count: usize,
    },

    /// Hole filling failed.
    #[error("hole filling failed: {details}")]
    #[diagnostic(
        code(mesh::repair::hole_fill),
        help("The hole may have a self-intersecting boundary. Lower max_hole_size to skip it.")
    )]
    HoleFillFailed { details: String },

    /// Smoothing failed.
    #[error("smoothing failed: {details}")]
    #[diagnostic(
        code(mesh::smooth::failed),
        help("Smoothing needs a mesh with at least one interior vertex.")
    )]
    SmoothingFailed { details: String },

    /// Normal recomputation failed.
    #[error("normal recomputation failed: {details}")]
    #[diagnostic(
        code(mesh::normals::failed),
        help("Remove degenerate faces before recomputing normals.")
    )]
    NormalsFailed { details: String },
}

impl MeshError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            MeshError::IoRead { .. } => ErrorCode::IoRead,
            MeshError::IoWrite { .. } => ErrorCode::IoWrite,
            MeshError::ParseError { .. } => ErrorCode::ParseError,
            MeshError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            MeshError::EmptyMesh { .. } => ErrorCode::EmptyMesh,
            MeshError::RepairFailed { .. } => ErrorCode::RepairFailed,
            MeshError::InvalidVertexIndex { .. } => ErrorCode::InvalidVertexIndex,
            MeshError::HoleFillFailed { .. } => ErrorCode::HoleFillFailed,
            MeshError::SmoothingFailed { .. } => ErrorCode::SmoothingFailed,
            MeshError::NormalsFailed { .. } => ErrorCode::NormalsFailed,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            MeshError::UnsupportedFormat { .. } => RecoverySuggestion::UseDifferentFormat {
                suggested: SUPPORTED_FORMATS.iter().map(|s| s.to_string()).collect(),
            },
            MeshError::NormalsFailed { .. } => {
                RecoverySuggestion::RunRepair {
                    operations: vec![
                        "fix_non_manifold_edges".to_string(),
                        "remove_duplicate_faces".to_string(),
                        "remove_null_faces".to_string(),
                    ],
                }
            }
            MeshError::HoleFillFailed { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![("max_hole_size".to_string(), "50".to_string())],
            },
            MeshError::SmoothingFailed { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![("smooth_iterations".to_string(), "1".to_string())],
            },
            _ => RecoverySuggestion::None,
        }
    }

    /// Returns location information if available.
    pub fn location(&self) -> MeshLocation {
        match self {
            MeshError::IoRead { path, .. }
            | MeshError::IoWrite { path, .. }
            | MeshError::ParseError { path, .. } => MeshLocation::File { path: path.clone() },
            MeshError::InvalidVertexIndex { face_index, .. } => MeshLocation::Face {
                index: *face_index,
                vertices: None,
            },
            _ => MeshLocation::Unknown,
        }
    }

    // Constructor helpers

    /// Create an I/O read error.
    pub fn io_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::IoRead {
            path: path.into(),
            source,
        }
    }

    /// Create an I/O write error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a parse error.
    pub fn parse_error(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        MeshError::ParseError {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create an unsupported format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        MeshError::UnsupportedFormat {
            format: Some(format.into()),
        }
    }

    /// Create an empty mesh error.
    pub fn empty_mesh(details: impl Into<String>) -> Self {
        MeshError::EmptyMesh {
            details: details.into(),
        }
    }

    /// Create a repair failed error.
    pub fn repair_failed(details: impl Into<String>) -> Self {
        MeshError::RepairFailed {
            details: details.into(),
        }
    }

    /// Create an invalid vertex index error.
    pub fn invalid_vertex_index(face_index: usize, vertex_index: u32, vertex_count: usize) -> Self {
        MeshError::InvalidVertexIndex {
            face_index,
            vertex_index,
            vertex_count,
        }
    }

    /// Create a hole fill failed error.
    pub fn hole_fill_failed(details: impl Into<String>) -> Self {
        MeshError::HoleFillFailed {
            details: details.into(),
        }
    }

    /// Create a smoothing failed error.
    pub fn smoothing_failed(details: impl Into<String>) -> Self {
        MeshError::SmoothingFailed {
            details: details.into(),
        }
    }

    /// Create a normals failed error.
    pub fn normals_failed(details: impl Into<String>) -> Self {
        MeshError::NormalsFailed {
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = MeshError::empty_mesh("no faces");
        assert_eq!(err.code(), ErrorCode::EmptyMesh);
        assert_eq!(err.code().as_str(), "MESH-2003");

        let err = MeshError::unsupported_format("fbx");
        assert_eq!(err.code().as_str(), "MESH-4001");
        assert!(err.code().is_validation());
    }

    #[test]
    fn test_error_display() {
        let err = MeshError::invalid_vertex_index(5, 100, 50);
        let msg = err.to_string();
        assert!(msg.contains("face 5"));
        assert!(msg.contains("vertex 100"));
        assert!(msg.contains("50 vertices"));
    }

    #[test]
    fn test_unsupported_format_suggests_supported_list() {
        let err = MeshError::unsupported_format("fbx");
        let suggestion = err.recovery_suggestion().to_string();
        for fmt in SUPPORTED_FORMATS {
            assert!(suggestion.contains(fmt), "missing {fmt} in {suggestion}");
        }
    }

    #[test]
    fn test_location_for_face_error() {
        let err = MeshError::invalid_vertex_index(3, 9, 4);
        assert_eq!(err.location().to_string(), "face 3");
    }
}

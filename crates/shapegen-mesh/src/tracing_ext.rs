//! Tracing helpers for mesh stages.
//!
//! Enable output by installing a subscriber in the application, for example
//! with `RUST_LOG=shapegen_mesh=debug`.
//!
//! - **INFO**: stage summaries and timing
//! - **WARN**: best-effort repair steps that were skipped
//! - **DEBUG**: per-step counts and mesh state
//! - **TRACE**: detailed bounds dumps

use std::time::Instant;
use tracing::{Span, debug, info, trace};

use crate::Mesh;

/// A timer that logs the elapsed time of a mesh stage when dropped.
///
/// ```rust,ignore
/// use shapegen_mesh::tracing_ext::OperationTimer;
///
/// fn expensive_operation(mesh: &Mesh) {
///     let _timer = OperationTimer::with_mesh("expensive_operation", mesh);
///     // ... do work ...
/// }
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    /// Create a new operation timer.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("mesh_operation", operation = name);
        debug!(target: "shapegen_mesh::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Create a timer carrying the input mesh size as span fields.
    pub fn with_mesh(name: &'static str, mesh: &Mesh) -> Self {
        let span = tracing::info_span!(
            "mesh_operation",
            operation = name,
            faces = mesh.face_count(),
            vertices = mesh.vertex_count()
        );
        debug!(
            target: "shapegen_mesh::timing",
            operation = name,
            faces = mesh.face_count(),
            vertices = mesh.vertex_count(),
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// The span opened for this timer.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        info!(
            target: "shapegen_mesh::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "Operation completed"
        );
    }
}

/// Log vertex/face counts and dimensions at debug level.
pub fn log_mesh_stats(mesh: &Mesh, context: &str) {
    let (min_bounds, max_bounds) = mesh.bounds().unwrap_or_default();
    let dims = max_bounds - min_bounds;

    debug!(
        target: "shapegen_mesh::mesh_state",
        context = context,
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        dimensions = format!("{:.3} x {:.3} x {:.3}", dims.x, dims.y, dims.z),
        "Mesh state"
    );

    trace!(
        target: "shapegen_mesh::mesh_state",
        context = context,
        min = format!("[{:.4}, {:.4}, {:.4}]", min_bounds.x, min_bounds.y, min_bounds.z),
        max = format!("[{:.4}, {:.4}, {:.4}]", max_bounds.x, max_bounds.y, max_bounds.z),
        has_normals = mesh.vertices.iter().any(|v| v.normal.is_some()),
        has_face_normals = mesh.has_face_normals(),
        "Mesh bounds"
    );
}

/// Log the before/after face counts of a stage at info level.
pub fn log_stage_delta(stage: &str, before: &Mesh, after: &Mesh) {
    info!(
        target: "shapegen_mesh::stage",
        stage = stage,
        faces_before = before.face_count(),
        faces_after = after.face_count(),
        vertices_before = before.vertex_count(),
        vertices_after = after.vertex_count(),
        "Stage finished"
    );
}

//! Service-level tests with in-process fake models.
//!
//! Run with: cargo test -p shapegen --test service_tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use image::{Rgba, RgbaImage};
use shapegen::{
    BoxError, DeviceContext, DeviceKind, DevicePreference, ErrorKind, GenerationConfig,
    ImageSource, InferenceInput, InferenceOutput, InferenceRequest, InputMode, ModelKind,
    ModelLoader, ModelSource, Preprocessor, ShapeError, ShapeModel, ShapeService, ViewName,
    ViewSet,
};
use shapegen_mesh::{ExportFormat, Mesh, mesh_stats};

// =============================================================================
// Fakes
// =============================================================================

fn cube() -> Mesh {
    Mesh::from_raw(
        &[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
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

#[derive(Default)]
struct Calls {
    loads: Mutex<Vec<ModelKind>>,
    inferences: AtomicUsize,
    last_view_count: AtomicUsize,
}

struct FakeModel {
    calls: Arc<Calls>,
    output: fn() -> InferenceOutput,
}

impl ShapeModel for FakeModel {
    fn infer(&self, request: &InferenceRequest<'_>) -> Result<InferenceOutput, BoxError> {
        self.calls.inferences.fetch_add(1, Ordering::SeqCst);
        let views = match request.input {
            InferenceInput::Image(_) => 1,
            InferenceInput::Views(views) => views.len(),
        };
        self.calls.last_view_count.store(views, Ordering::SeqCst);
        Ok((self.output)())
    }
}

struct FakeLoader {
    calls: Arc<Calls>,
    output: fn() -> InferenceOutput,
}

impl ModelLoader for FakeLoader {
    fn load(
        &self,
        source: &ModelSource,
        _device: &DeviceContext,
    ) -> Result<Box<dyn ShapeModel>, BoxError> {
        self.calls.loads.lock().unwrap().push(source.kind);
        Ok(Box::new(FakeModel {
            calls: Arc::clone(&self.calls),
            output: self.output,
        }))
    }
}

fn service_with(auto_load: bool, output: fn() -> InferenceOutput) -> (ShapeService, Arc<Calls>) {
    let calls = Arc::new(Calls::default());
    let loader = Arc::new(FakeLoader {
        calls: Arc::clone(&calls),
        output,
    });
    let service = ShapeService::builder(loader)
        .device(DeviceContext::cpu())
        .auto_load(auto_load)
        .build()
        .unwrap();
    (service, calls)
}

fn service(auto_load: bool) -> (ShapeService, Arc<Calls>) {
    service_with(auto_load, || InferenceOutput::Sequence(vec![cube(), Mesh::new()]))
}

fn image(value: u8) -> ImageSource {
    RgbaImage::from_pixel(16, 16, Rgba([value, value / 2, 255 - value, 255])).into()
}

fn fast_config() -> GenerationConfig {
    GenerationConfig {
        remove_background: false,
        max_faces: 1_000,
        ..Default::default()
    }
}

// =============================================================================
// Model lifecycle
// =============================================================================

#[test]
fn test_status_on_fresh_service() {
    let (service, calls) = service(false);
    let status = service.get_status();

    assert!(!status.ready);
    assert!(status.loaded_kinds.is_empty());
    assert_eq!(status.gpu_used_gb, 0.0);
    assert_eq!(status.gpu_total_gb, 0.0);
    assert_eq!(status.device, "cpu");
    assert!(calls.loads.lock().unwrap().is_empty());
}

#[test]
fn test_auto_load_default_model() {
    let (service, _) = service(true);
    let status = service.get_status();
    assert!(status.ready);
    assert_eq!(status.loaded_kinds, vec![ModelKind::SingleImage]);
}

#[test]
fn test_builder_probes_cpu_preference() {
    let calls = Arc::new(Calls::default());
    let loader = Arc::new(FakeLoader {
        calls: Arc::clone(&calls),
        output: || InferenceOutput::Single(cube()),
    });
    let service = ShapeService::builder(loader)
        .device_preference(DevicePreference::Cpu)
        .default_model(ModelKind::MultiView)
        .weights_dir("/srv/weights")
        .build()
        .unwrap();

    assert_eq!(service.get_status().device_kind, DeviceKind::Cpu);
    assert_eq!(service.get_status().loaded_kinds, vec![ModelKind::MultiView]);
    assert_eq!(service.config().weights_dir, std::path::PathBuf::from("/srv/weights"));
}

#[test]
fn test_double_load_instantiates_once() {
    let (service, calls) = service(false);
    service.load_model(ModelKind::MultiView).unwrap();
    service.load_model(ModelKind::MultiView).unwrap();

    assert_eq!(*calls.loads.lock().unwrap(), vec![ModelKind::MultiView]);
    assert_eq!(service.get_status().loaded_kinds, vec![ModelKind::MultiView]);
}

#[test]
fn test_unload_removes_and_absent_is_noop() {
    let (service, _) = service(false);
    service.load_model(ModelKind::SingleImage).unwrap();

    assert!(service.unload_model(ModelKind::SingleImage));
    assert!(service.get_status().loaded_kinds.is_empty());
    assert!(!service.unload_model(ModelKind::SingleImage));
    assert!(!service.unload_model(ModelKind::MultiView));
}

#[test]
fn test_concurrent_loads_instantiate_once() {
    let (service, calls) = service(false);
    let service = Arc::new(service);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || service.load_model(ModelKind::SingleImage))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(calls.loads.lock().unwrap().len(), 1);
}

// =============================================================================
// Generation
// =============================================================================

#[test]
fn test_single_image_small_mesh_unchanged() {
    let (service, calls) = service(true);
    let result = service.generate(image(120), &fast_config()).unwrap();

    assert_eq!(result.input_mode, InputMode::SingleImage);
    assert_eq!(result.model, ModelKind::SingleImage);
    assert_eq!(result.view_count, 1);
    assert_eq!(result.mesh.face_count(), 12);
    assert!(result.warnings.is_empty());
    assert_eq!(calls.inferences.load(Ordering::SeqCst), 1);
    assert!(mesh_stats(&result.mesh).is_watertight);
}

#[test]
fn test_single_image_requires_resident_model() {
    let (service, calls) = service(false);
    let err = service.generate(image(120), &fast_config()).unwrap_err();

    assert!(matches!(
        err,
        ShapeError::ModelNotLoaded {
            kind: Some(ModelKind::SingleImage)
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Resource);
    assert_eq!(calls.inferences.load(Ordering::SeqCst), 0);
    assert!(calls.loads.lock().unwrap().is_empty());
}

#[test]
fn test_multi_view_loads_lazily() {
    let (service, calls) = service(false);
    let views = ViewSet::new()
        .with(ViewName::Front, image(200))
        .with(ViewName::Left, image(40));

    let result = service.generate(views, &fast_config()).unwrap();

    assert_eq!(result.input_mode, InputMode::MultiView);
    assert_eq!(result.view_count, 2);
    assert_eq!(calls.last_view_count.load(Ordering::SeqCst), 2);
    assert_eq!(*calls.loads.lock().unwrap(), vec![ModelKind::MultiView]);
    assert_eq!(service.manager().current_model(), Some(ModelKind::MultiView));
}

#[test]
fn test_missing_front_fails_before_inference() {
    let (service, calls) = service(true);
    let views = ViewSet::new().with(ViewName::Left, image(40));

    let err = service.generate(views, &fast_config()).unwrap_err();

    assert!(matches!(err, ShapeError::MissingFrontView));
    assert!(err.is_validation());
    assert_eq!(calls.inferences.load(Ordering::SeqCst), 0);
    assert!(!service.manager().is_loaded(ModelKind::MultiView));
}

#[test]
fn test_unknown_view_rejected_at_boundary() {
    let err = ViewSet::from_named([("front", image(1)), ("top", image(2))]).unwrap_err();
    assert!(matches!(err, ShapeError::UnknownView { .. }));
}

#[test]
fn test_invalid_config_fails_before_inference() {
    let (service, calls) = service(true);
    let config = GenerationConfig {
        num_inference_steps: 0,
        ..fast_config()
    };
    let err = service.generate(image(1), &config).unwrap_err();
    assert!(err.is_validation());
    assert_eq!(calls.inferences.load(Ordering::SeqCst), 0);
}

#[test]
fn test_empty_model_output_is_fatal() {
    let (service, _) = service_with(true, || InferenceOutput::Sequence(Vec::new()));
    let err = service.generate(image(1), &fast_config()).unwrap_err();
    assert!(matches!(
        err,
        ShapeError::NoMesh {
            kind: ModelKind::SingleImage
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Processing);
}

#[test]
fn test_failing_repair_step_is_a_warning() {
    let (service, _) = service_with(true, || {
        InferenceOutput::Single(Mesh::from_raw(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
            &[[0, 1, 2]],
        ))
    });
    let mut config = fast_config();
    config.optimize_mesh = false;
    config.repair.recalculate_normals = true;

    let result = service.generate(image(1), &config).unwrap();

    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].step, "face_normals");
    assert_eq!(result.mesh.face_count(), 1);
    assert!(result.mesh.face_normals.is_empty());
}

#[test]
fn test_hole_size_below_three_is_rejected() {
    let (service, calls) = service(true);
    let mut config = fast_config();
    config.repair.fill_holes = true;
    config.repair.max_hole_size = 2;

    let err = service.generate(image(1), &config).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(calls.inferences.load(Ordering::SeqCst), 0);
}

#[test]
fn test_task_ids_are_unique() {
    let (service, _) = service(true);
    let a = service.generate(image(1), &fast_config()).unwrap();
    let b = service.generate(image(1), &fast_config()).unwrap();
    assert_ne!(a.task_id, b.task_id);
}

#[test]
fn test_export_uses_configured_format() {
    let (service, _) = service(true);
    let config = GenerationConfig {
        output_format: ExportFormat::Stl,
        ..fast_config()
    };
    let result = service.generate(image(1), &config).unwrap();
    let bytes = result.export().unwrap();
    // Binary STL: 80-byte header, count, 50 bytes per triangle.
    assert_eq!(bytes.len(), 84 + 50 * 12);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mesh.stl");
    result.save(&path).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), bytes);
}

#[test]
fn test_unsupported_format_is_validation() {
    let err: ShapeError = "fbx".parse::<ExportFormat>().unwrap_err().into();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// =============================================================================
// Preprocessing
// =============================================================================

#[test]
fn test_two_views_without_lighting() {
    let mut config = fast_config();
    config.lighting.normalize = false;
    let views = ViewSet::new()
        .with(ViewName::Front, image(200))
        .with(ViewName::Left, image(40));

    let processed = Preprocessor::default()
        .prepare_views(&views, &config)
        .unwrap();

    assert_eq!(processed.view_count(), 2);
    assert_eq!(processed.available_views(), vec![ViewName::Front, ViewName::Left]);
    assert_eq!(processed.lighting_reference, None);
    assert_eq!(
        processed.views[&ViewName::Left],
        image(40).load_rgba().unwrap()
    );
}

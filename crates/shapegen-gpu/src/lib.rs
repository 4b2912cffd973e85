//! Accelerator discovery for shapegen.
//!
//! Inference models are large and GPU-resident, so the service needs to know
//! which device it is running on and roughly how much of it is in use. This
//! crate wraps wgpu adapter probing behind a small [`DeviceContext`]:
//!
//! | Preference | Tried in order |
//! |------------|----------------|
//! | `auto`     | GPU (Vulkan/DX12), Metal, CPU |
//! | `gpu`      | GPU only |
//! | `metal`    | Metal only |
//! | `cpu`      | CPU |
//!
//! Software adapters are skipped. Memory figures are reported in gigabytes
//! and are zero when no accelerator is attached.
//!
//! # Example
//!
//! ```no_run
//! use shapegen_gpu::{DeviceContext, DevicePreference};
//!
//! let ctx = DeviceContext::probe(DevicePreference::Auto).unwrap();
//! let mem = ctx.memory_info();
//! println!("{} ({}): {:.1}/{:.1} GB", ctx.name(), ctx.kind(), mem.used_gb, mem.total_gb);
//! ```

pub mod context;
pub mod error;

pub use context::{AdapterInfo, DeviceContext, DeviceKind, DevicePreference, MemoryInfo};
pub use error::{GpuError, GpuResult};

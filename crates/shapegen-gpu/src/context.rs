//! Accelerator discovery and memory accounting.
//!
//! The device is chosen once, when a [`DeviceContext`] is probed: a discrete
//! or integrated GPU first, then a Metal adapter, then the CPU. Models are
//! instantiated against whatever kind was selected.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wgpu::{Backends, Device, DeviceDescriptor, Instance, Queue, RequestAdapterOptions};

use crate::error::{GpuError, GpuResult};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Which kind of device to run on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Best available device.
    #[default]
    Auto,
    /// Vulkan or DX12 adapter only.
    Gpu,
    /// Metal adapter only.
    Metal,
    /// Never touch an accelerator.
    Cpu,
}

impl FromStr for DevicePreference {
    type Err = GpuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(DevicePreference::Auto),
            "gpu" | "cuda" | "vulkan" => Ok(DevicePreference::Gpu),
            "metal" | "mps" => Ok(DevicePreference::Metal),
            "cpu" => Ok(DevicePreference::Cpu),
            _ => Err(GpuError::InvalidPreference {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DevicePreference::Auto => "auto",
            DevicePreference::Gpu => "gpu",
            DevicePreference::Metal => "metal",
            DevicePreference::Cpu => "cpu",
        })
    }
}

/// The kind of device a context ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Gpu,
    Metal,
    Cpu,
}

impl DeviceKind {
    /// Candidate kinds for a preference, in the order they are tried.
    pub fn candidates(preference: DevicePreference) -> &'static [DeviceKind] {
        match preference {
            DevicePreference::Auto => &[DeviceKind::Gpu, DeviceKind::Metal, DeviceKind::Cpu],
            DevicePreference::Gpu => &[DeviceKind::Gpu],
            DevicePreference::Metal => &[DeviceKind::Metal],
            DevicePreference::Cpu => &[DeviceKind::Cpu],
        }
    }

    /// True for kinds backed by an accelerator.
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, DeviceKind::Cpu)
    }

    fn backends(&self) -> Backends {
        match self {
            DeviceKind::Gpu => Backends::VULKAN | Backends::DX12,
            DeviceKind::Metal => Backends::METAL,
            DeviceKind::Cpu => Backends::empty(),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceKind::Gpu => "gpu",
            DeviceKind::Metal => "metal",
            DeviceKind::Cpu => "cpu",
        })
    }
}

/// Information about the selected adapter.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    /// Device name.
    pub name: String,
    /// Vendor id.
    pub vendor: String,
    /// Device type (discrete, integrated, etc.).
    pub device_type: String,
    /// Backend API (Vulkan, Metal, DX12).
    pub backend: String,
}

impl From<wgpu::AdapterInfo> for AdapterInfo {
    fn from(info: wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name,
            vendor: format!("{:#06x}", info.vendor),
            device_type: format!("{:?}", info.device_type),
            backend: format!("{:?}", info.backend),
        }
    }
}

/// Device memory in gigabytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub used_gb: f64,
    pub total_gb: f64,
}

struct Accelerator {
    device: Device,
    queue: Queue,
    info: AdapterInfo,
    limits: wgpu::Limits,
}

/// The device models run on, plus a running tally of reserved memory.
pub struct DeviceContext {
    kind: DeviceKind,
    accelerator: Option<Accelerator>,
    reserved: AtomicU64,
}

impl DeviceContext {
    /// Probe for a device matching `preference`.
    ///
    /// `Auto` always succeeds, landing on the CPU when no adapter is usable.
    ///
    /// # Errors
    /// Returns [`GpuError::NotAvailable`] when an explicit accelerator kind was
    /// requested and no adapter of that kind could be initialized.
    pub fn probe(preference: DevicePreference) -> GpuResult<Self> {
        debug!(%preference, "Probing devices");

        for &kind in DeviceKind::candidates(preference) {
            if kind == DeviceKind::Cpu {
                info!("Using CPU device");
                return Ok(Self::cpu());
            }
            match pollster::block_on(request_accelerator(kind)) {
                Ok(accelerator) => {
                    info!(
                        kind = %kind,
                        adapter = %accelerator.info.name,
                        backend = %accelerator.info.backend,
                        "Accelerator initialized"
                    );
                    return Ok(Self {
                        kind,
                        accelerator: Some(accelerator),
                        reserved: AtomicU64::new(0),
                    });
                }
                Err(e) => debug!(kind = %kind, error = %e, "Device kind unavailable"),
            }
        }

        let requested = preference.to_string();
        warn!(%requested, "Requested device not available");
        Err(GpuError::NotAvailable { requested })
    }

    /// A context with no accelerator attached.
    pub fn cpu() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            accelerator: None,
            reserved: AtomicU64::new(0),
        }
    }

    /// The kind of device selected at probe time.
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Human-readable device name.
    pub fn name(&self) -> &str {
        self.accelerator
            .as_ref()
            .map(|a| a.info.name.as_str())
            .unwrap_or("cpu")
    }

    pub fn adapter_info(&self) -> Option<&AdapterInfo> {
        self.accelerator.as_ref().map(|a| &a.info)
    }

    /// Record `bytes` of device memory as in use.
    pub fn reserve(&self, bytes: u64) {
        self.reserved.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Return `bytes` previously passed to [`reserve`](Self::reserve).
    pub fn release(&self, bytes: u64) {
        let _ = self
            .reserved
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                Some(cur.saturating_sub(bytes))
            });
    }

    /// Used and total device memory.
    ///
    /// wgpu does not report physical memory, so the total is the largest
    /// buffer the adapter will allocate. Both values are zero on the CPU.
    pub fn memory_info(&self) -> MemoryInfo {
        match &self.accelerator {
            Some(acc) => MemoryInfo {
                used_gb: self.reserved.load(Ordering::Relaxed) as f64 / BYTES_PER_GB,
                total_gb: acc.limits.max_buffer_size as f64 / BYTES_PER_GB,
            },
            None => MemoryInfo::default(),
        }
    }

    /// Let the driver reclaim resources dropped since the last submission.
    pub fn release_cache(&self) {
        if let Some(acc) = &self.accelerator {
            acc.queue.submit(std::iter::empty());
            let _ = acc.device.poll(wgpu::Maintain::Wait);
            debug!(adapter = %acc.info.name, "Device cache released");
        }
    }
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("kind", &self.kind)
            .field("adapter_info", &self.adapter_info())
            .field("reserved", &self.reserved.load(Ordering::Relaxed))
            .finish()
    }
}

async fn request_accelerator(kind: DeviceKind) -> GpuResult<Accelerator> {
    let instance = Instance::new(&wgpu::InstanceDescriptor {
        backends: kind.backends(),
        ..Default::default()
    });

    let not_available = || GpuError::NotAvailable {
        requested: kind.to_string(),
    };

    let adapter = instance
        .request_adapter(&RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        })
        .await
        .ok_or_else(not_available)?;

    let raw_info = adapter.get_info();
    // Software rasterizers (llvmpipe, WARP) are not worth the transfer cost.
    if raw_info.device_type == wgpu::DeviceType::Cpu {
        debug!(name = %raw_info.name, "Skipping software adapter");
        return Err(not_available());
    }
    let info = AdapterInfo::from(raw_info);

    let (device, queue) = adapter
        .request_device(
            &DeviceDescriptor {
                label: Some("shapegen"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            },
            None,
        )
        .await
        .map_err(|e| GpuError::DeviceRequest {
            adapter: info.name.clone(),
            message: e.to_string(),
        })?;

    let limits = device.limits();
    Ok(Accelerator {
        device,
        queue,
        info,
        limits,
    })
}

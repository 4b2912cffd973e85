//! Accelerator error types.
//!
//! Codes follow the `GPU-XXXX` scheme:
//! - `GPU-1xxx`: invalid device requests
//! - `GPU-2xxx`: device discovery and initialization failures

use miette::Diagnostic;
use thiserror::Error;

/// Errors that can occur while probing or using an accelerator.
#[derive(Debug, Error, Diagnostic)]
pub enum GpuError {
    /// Device preference string was not recognized.
    #[error("unknown device preference '{value}'")]
    #[diagnostic(code(gpu::preference), help("Use one of: auto, gpu, metal, cpu"))]
    InvalidPreference { value: String },

    /// The explicitly requested device kind has no usable adapter.
    #[error("no {requested} adapter available on this system")]
    #[diagnostic(
        code(gpu::not_available),
        help("Use the 'auto' device preference to fall back to the CPU")
    )]
    NotAvailable { requested: String },

    /// An adapter was found but the logical device could not be created.
    #[error("device request failed on {adapter}: {message}")]
    #[diagnostic(code(gpu::device_request))]
    DeviceRequest { adapter: String, message: String },
}

impl GpuError {
    /// Returns the error code as a string in the format `GPU-XXXX`.
    pub fn code(&self) -> &'static str {
        match self {
            GpuError::InvalidPreference { .. } => "GPU-1001",
            GpuError::NotAvailable { .. } => "GPU-2001",
            GpuError::DeviceRequest { .. } => "GPU-2002",
        }
    }
}

/// Result type for accelerator operations.
pub type GpuResult<T> = Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            GpuError::InvalidPreference { value: "tpu".into() },
            GpuError::NotAvailable { requested: "metal".into() },
            GpuError::DeviceRequest {
                adapter: "llvmpipe".into(),
                message: "lost".into(),
            },
        ];
        let codes: Vec<_> = errors.iter().map(GpuError::code).collect();
        assert_eq!(codes, ["GPU-1001", "GPU-2001", "GPU-2002"]);
    }
}

//! Backend selection for the Burn framework.
//!
//! The tensor backend is chosen at compile time: `cuda` when that feature is
//! on, NdArray (CPU) otherwise. [`Device`] is the runtime request from the
//! config file.

use burn::backend::Autodiff;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
pub type DefaultBackend = burn_ndarray::NdArray;

#[cfg(all(not(feature = "cuda"), not(feature = "ndarray")))]
compile_error!("At least one backend (cuda or ndarray) must be enabled!");

/// The default autodiff backend for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Concrete device type of [`DefaultBackend`]
pub type BackendDevice = <DefaultBackend as burn::tensor::backend::Backend>::Device;

/// Device requested in configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// CPU backend
    Cpu,
    /// GPU with the given index
    Gpu(usize),
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "CPU"),
            Device::Gpu(id) => write!(f, "GPU:{}", id),
        }
    }
}

/// Get the default device of the compiled backend
pub fn default_device() -> BackendDevice {
    BackendDevice::default()
}

/// Map the requested device onto the compiled backend.
///
/// A GPU request on a CPU-only build falls back to the CPU with a warning.
pub fn select_device(requested: Device) -> BackendDevice {
    #[cfg(feature = "cuda")]
    {
        match requested {
            Device::Gpu(index) => {
                info!("Using CUDA device {}", index);
                burn_cuda::CudaDevice::new(index)
            }
            Device::Cpu => {
                warn!("CPU requested but this build uses the CUDA backend; using GPU:0");
                default_device()
            }
        }
    }

    #[cfg(not(feature = "cuda"))]
    {
        if let Device::Gpu(index) = requested {
            warn!(
                "GPU:{} requested but this build has no GPU backend - falling back to CPU",
                index
            );
        } else {
            info!("Using CPU backend");
        }
        default_device()
    }
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(not(feature = "cuda"))]
    {
        "NdArray (CPU)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_display() {
        assert_eq!(Device::Cpu.to_string(), "CPU");
        assert_eq!(Device::Gpu(1).to_string(), "GPU:1");
    }

    #[test]
    fn test_backend_name() {
        assert!(!backend_name().is_empty());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_gpu_request_falls_back_on_cpu_build() {
        assert_eq!(select_device(Device::Gpu(0)), default_device());
    }
}

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Compute Backend Abstraction
//!
//! Provides a unified interface for the CPU and GPU implementations of the
//! pixel-averaging kernel. Sensors hold a `Box<dyn ComputeBackend>` and only
//! ever branch on whether one could be created.

mod cpu;
#[cfg(feature = "gpu")]
mod wgpu_backend;

pub use cpu::CpuBackend;
#[cfg(feature = "gpu")]
pub use wgpu_backend::WgpuBackend;

use crate::{Color, ComputeError, Frame, Result, SensorRegion};
use luxsense_config::{BackendPreference, ComputeConfig, GpuBackendSet};
use tracing::{info, warn};

/// Compute backend trait - abstracts CPU vs GPU execution
///
/// Backends release their resources on drop.
pub trait ComputeBackend: Send {
    /// Get backend name for logging/debugging
    fn backend_name(&self) -> &str;

    fn backend_type(&self) -> BackendType;

    /// True if the backend can accept work
    fn is_available(&self) -> bool {
        true
    }

    fn is_gpu(&self) -> bool {
        self.backend_type() == BackendType::Wgpu
    }

    /// Average a flat list of RGBA samples into one colour
    ///
    /// `Ok(None)` for an empty list.
    fn average_samples(&mut self, samples: &[[f32; 4]]) -> Result<Option<Color>>;

    /// Average every region of `frame` in one pass
    ///
    /// The result is index-aligned with `regions`; `None` marks a window that
    /// lies completely outside the frame.
    fn average_regions(
        &mut self,
        frame: &Frame,
        regions: &[SensorRegion],
        dispatch: &DispatchConfig,
    ) -> Result<Vec<Option<Color>>>;
}

/// Per-pass dispatch options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Let each GPU invocation process several regions
    pub use_optimized_kernel: bool,
    /// Regions per invocation when `use_optimized_kernel` is set, clamped to [1, 16]
    pub sensors_per_thread: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            use_optimized_kernel: false,
            sensors_per_thread: 4,
        }
    }
}

impl DispatchConfig {
    pub fn clamped_sensors_per_thread(&self) -> u32 {
        self.sensors_per_thread.clamp(1, 16)
    }
}

/// Backend type enum for construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendType {
    /// rayon-parallel CPU implementation, always available
    Cpu,
    /// Compute shaders via WGPU (Metal, DirectX 12, opt-in Vulkan/GL)
    Wgpu,
    /// GPU if one is available, CPU otherwise
    #[default]
    Auto,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Cpu => write!(f, "CPU"),
            BackendType::Wgpu => write!(f, "WGPU"),
            BackendType::Auto => write!(f, "Auto"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(BackendType::Cpu),
            "wgpu" | "gpu" => Ok(BackendType::Wgpu),
            "auto" => Ok(BackendType::Auto),
            _ => Err(ComputeError::InvalidBackend(s.to_string())),
        }
    }
}

/// Configuration for backend selection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BackendConfig {
    pub backend_type: BackendType,
    /// Which native GPU APIs may be probed
    pub gpu_backends: GpuBackendSet,
}

impl BackendConfig {
    pub fn cpu() -> Self {
        Self {
            backend_type: BackendType::Cpu,
            ..Default::default()
        }
    }
}

impl From<&ComputeConfig> for BackendConfig {
    fn from(config: &ComputeConfig) -> Self {
        let backend_type = match config.backend {
            BackendPreference::Auto => BackendType::Auto,
            BackendPreference::Cpu => BackendType::Cpu,
            BackendPreference::Gpu => BackendType::Wgpu,
        };
        Self {
            backend_type,
            gpu_backends: config.gpu_backends,
        }
    }
}

/// Backend selection decision with rationale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDecision {
    /// Never `Auto`
    pub backend_type: BackendType,
    pub reason: String,
    pub gpu_available: bool,
}

/// Resolve the backend to build
///
/// `Auto` picks WGPU when an adapter is reachable and CPU otherwise. An
/// explicit `Wgpu` request is kept even without an adapter so that
/// [`create_backend`] reports the failure instead of silently using the CPU.
pub fn select_backend(config: &BackendConfig) -> BackendDecision {
    match config.backend_type {
        BackendType::Cpu => BackendDecision {
            backend_type: BackendType::Cpu,
            reason: "Forced CPU via configuration".to_string(),
            gpu_available: false,
        },
        BackendType::Wgpu => {
            let gpu_available = is_gpu_available(config.gpu_backends);
            let reason = if gpu_available {
                "Forced WGPU via configuration".to_string()
            } else {
                format!("WGPU forced but not available on {}", platform_info())
            };
            BackendDecision {
                backend_type: BackendType::Wgpu,
                reason,
                gpu_available,
            }
        }
        BackendType::Auto => {
            if is_gpu_available(config.gpu_backends) {
                BackendDecision {
                    backend_type: BackendType::Wgpu,
                    reason: "WGPU selected: GPU adapter available".to_string(),
                    gpu_available: true,
                }
            } else {
                BackendDecision {
                    backend_type: BackendType::Cpu,
                    reason: format!("CPU selected: no GPU compute on {}", platform_info()),
                    gpu_available: false,
                }
            }
        }
    }
}

/// Build the backend chosen by [`select_backend`]
///
/// # Errors
///
/// `ComputeError::BackendUnavailable` when WGPU was requested explicitly and
/// cannot be created.
pub fn create_backend(config: &BackendConfig) -> Result<Box<dyn ComputeBackend>> {
    let decision = select_backend(config);
    info!(
        "Backend selection: {} ({})",
        decision.backend_type, decision.reason
    );

    match decision.backend_type {
        BackendType::Wgpu => create_gpu_backend(config.gpu_backends),
        BackendType::Cpu | BackendType::Auto => Ok(Box::new(CpuBackend::new())),
    }
}

/// Build a GPU backend or fail; never falls back to the CPU
pub fn create_gpu_backend(gpu_backends: GpuBackendSet) -> Result<Box<dyn ComputeBackend>> {
    #[cfg(feature = "gpu")]
    {
        match WgpuBackend::for_platform(gpu_backends) {
            Ok(backend) => Ok(Box::new(backend)),
            Err(e) => {
                warn!("GPU backend creation failed: {}", e);
                Err(e)
            }
        }
    }
    #[cfg(not(feature = "gpu"))]
    {
        let _ = gpu_backends;
        warn!("GPU requested but 'gpu' feature not enabled at compile time");
        Err(ComputeError::BackendUnavailable(
            "compiled without the 'gpu' feature".to_string(),
        ))
    }
}

/// Adapter probes actually performed, at most one per [`GpuBackendSet`]
#[cfg(feature = "gpu")]
static ADAPTER_PROBES: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

/// Check if a GPU adapter is reachable with the allowed APIs
///
/// The adapter is probed once per API set and the answer cached for the
/// life of the process.
pub fn is_gpu_available(gpu_backends: GpuBackendSet) -> bool {
    #[cfg(feature = "gpu")]
    {
        use std::sync::atomic::Ordering;
        use std::sync::OnceLock;

        static PLATFORM: OnceLock<bool> = OnceLock::new();
        static ALL: OnceLock<bool> = OnceLock::new();

        let cached = match gpu_backends {
            GpuBackendSet::Platform => &PLATFORM,
            GpuBackendSet::All => &ALL,
        };
        *cached.get_or_init(|| {
            ADAPTER_PROBES.fetch_add(1, Ordering::Relaxed);
            let found =
                wgpu_backend::probe_adapter(wgpu_backend::allowed_backends(gpu_backends)).is_some();
            tracing::debug!(?gpu_backends, found, "GPU adapter probe");
            found
        })
    }
    #[cfg(not(feature = "gpu"))]
    {
        let _ = gpu_backends;
        false
    }
}

/// Human-readable description of the platform's compute path
pub fn platform_info() -> String {
    let path = if cfg!(target_os = "macos") {
        "macOS - Metal compute shaders"
    } else if cfg!(target_os = "windows") {
        "Windows - DirectX 12 compute shaders"
    } else if cfg!(target_os = "linux") {
        "Linux - CPU only"
    } else {
        "Unsupported platform - CPU only"
    };

    if cfg!(feature = "gpu") {
        path.to_string()
    } else {
        format!("{} (GPU support not compiled in)", path)
    }
}

/// Whether GPU acceleration would be used with the given API set
pub fn support_status(gpu_backends: GpuBackendSet) -> String {
    if is_gpu_available(gpu_backends) {
        "GPU acceleration supported".to_string()
    } else {
        "CPU fallback mode - GPU acceleration not available".to_string()
    }
}

//! Tessera Render
//!
//! wgpu integration for the ring allocator: GPU-backed ring slots, device
//! capability probing and a renderer-owned pipeline cache.

pub mod backend;
pub mod gpu_ring;
pub mod pipeline_cache;

pub use backend::{probe_capabilities, request_headless_device};
pub use gpu_ring::{GpuRing, StagedBuffer};
pub use pipeline_cache::{ComputePipelineCache, PipelineCache};
pub use wgpu;

use tessera_core::{RingError, SettingsError};
use thiserror::Error;

/// Rendering backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Metal (macOS, iOS)
    Metal,
    /// DirectX 12 (Windows)
    DirectX12,
    /// Vulkan (cross-platform)
    Vulkan,
    /// OpenGL / GLES (cross-platform, fallback)
    OpenGL,
    /// WebGPU (web)
    WebGpu,
    /// No-op backend
    Empty,
}

impl From<wgpu::Backend> for BackendType {
    fn from(backend: wgpu::Backend) -> Self {
        match backend {
            wgpu::Backend::Metal => Self::Metal,
            wgpu::Backend::Dx12 => Self::DirectX12,
            wgpu::Backend::Vulkan => Self::Vulkan,
            wgpu::Backend::Gl => Self::OpenGL,
            wgpu::Backend::BrowserWebGpu => Self::WebGpu,
            wgpu::Backend::Empty => Self::Empty,
        }
    }
}

/// Capability probe result
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    pub backend: BackendType,
    pub adapter_name: String,
    pub max_buffer_size: u64,
    pub min_uniform_buffer_offset_alignment: u32,
    pub min_storage_buffer_offset_alignment: u32,
    pub supports_compute: bool,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Ring(#[from] RingError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("no compatible graphics adapter found")]
    NoAdapter,

    #[error("failed to create device")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("ring buffer of {requested} bytes exceeds device limit of {limit} bytes")]
    BufferTooLarge { requested: u64, limit: u64 },
}

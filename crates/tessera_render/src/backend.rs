//! Adapter selection and capability probing

use crate::{DeviceCapabilities, RenderError};

/// Probe what the ring allocator needs to know about an adapter.
pub fn probe_capabilities(adapter: &wgpu::Adapter) -> DeviceCapabilities {
    let info = adapter.get_info();
    let limits = adapter.limits();
    let downlevel = adapter.get_downlevel_capabilities();

    DeviceCapabilities {
        backend: info.backend.into(),
        adapter_name: info.name,
        max_buffer_size: limits.max_buffer_size,
        min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
        min_storage_buffer_offset_alignment: limits.min_storage_buffer_offset_alignment,
        supports_compute: downlevel
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS),
    }
}

/// Request a device without a surface, for offscreen or compute-only work.
pub async fn request_headless_device(
) -> Result<(wgpu::Device, wgpu::Queue, DeviceCapabilities), RenderError> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok_or(RenderError::NoAdapter)?;

    let caps = probe_capabilities(&adapter);
    tracing::info!(
        backend = ?caps.backend,
        adapter = %caps.adapter_name,
        uniform_alignment = caps.min_uniform_buffer_offset_alignment,
        "selected adapter"
    );

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("tessera device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        )
        .await?;

    Ok((device, queue, caps))
}

//! Frame loop over wgpu ring slots
//!
//! Each frame the camera and instance data go into the current slot, a
//! compute pass projects the instances through the camera, and the slot is
//! uploaded and submitted before the ring advances.

use crate::scene::{CameraUniforms, InstanceParams, Scene};
use anyhow::{Context, Result};
use tessera_core::AllocatorSettings;
use tessera_render::{request_headless_device, ComputePipelineCache, GpuRing};

const PROJECT_SHADER: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    eye: vec4<f32>,
};

struct Instance {
    translation_scale: vec4<f32>,
    color: vec4<f32>,
};

@group(0) @binding(0) var<uniform> camera: Camera;
@group(0) @binding(1) var<storage, read> instances: array<Instance>;
@group(0) @binding(2) var<storage, read_write> clip_positions: array<vec4<f32>>;

@compute @workgroup_size(64)
fn project_instances(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i >= arrayLength(&instances)) {
        return;
    }
    let p = vec4<f32>(instances[i].translation_scale.xyz, 1.0);
    clip_positions[i] = camera.view_proj * p;
}
"#;

const ENTRY_POINT: &str = "project_instances";
const WORKGROUP_SIZE: u32 = 64;

pub fn run(settings: &AllocatorSettings, frames: u64, scene: &Scene) -> Result<()> {
    let (device, queue, caps) =
        pollster::block_on(request_headless_device()).context("failed to acquire GPU device")?;
    let mut ring = GpuRing::from_settings(&device, settings).context("failed to create GPU ring")?;
    tracing::info!(
        alignment = ring.ring().alignment().get(),
        "GPU ring ready"
    );

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("project instances"),
        source: wgpu::ShaderSource::Wgsl(PROJECT_SHADER.into()),
    });
    let clip_positions = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("clip positions"),
        size: (scene.max_instances() * std::mem::size_of::<[f32; 4]>()) as u64,
        usage: wgpu::BufferUsages::STORAGE,
        mapped_at_creation: false,
    });
    let mut pipelines = ComputePipelineCache::new();

    if !caps.supports_compute {
        tracing::warn!(backend = ?caps.backend, "adapter has no compute support; skipping dispatch");
    }

    for frame in 0..frames {
        let camera = ring.allocate::<CameraUniforms>(1)?;
        ring.write(&camera, &[scene.camera(frame)])?;

        let params = scene.instances(frame);
        let instances = ring.allocate::<InstanceParams>(params.len())?;
        ring.write(&instances, &params)?;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tessera frame"),
        });

        if caps.supports_compute {
            let pipeline = pipelines.compute(&device, &module, None, ENTRY_POINT);
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("frame bindings"),
                layout: &pipeline.get_bind_group_layout(0),
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(ring.binding(&camera)?),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Buffer(ring.binding(&instances)?),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: clip_positions.as_entire_binding(),
                    },
                ],
            });

            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("project instances"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups((params.len() as u32).div_ceil(WORKGROUP_SIZE), 1, 1);
        }

        // Writes must be queued before the submit that reads them.
        let uploaded = ring.upload(&queue);
        queue.submit(std::iter::once(encoder.finish()));

        let usage = ring.advance_frame();
        tracing::debug!(frame, slot = usage.slot, uploaded, bytes = usage.bytes, "frame submitted");
    }

    report_final_poll(device.poll(wgpu::Maintain::Wait));
    crate::log_summary(ring.ring().history(), ring.ring().buffer_size());
    Ok(())
}

/// Log the outcome of the final wait. Returns whether every submission retired.
fn report_final_poll(result: wgpu::MaintainResult) -> bool {
    match result {
        wgpu::MaintainResult::SubmissionQueueEmpty => {
            tracing::debug!("all frames completed on the GPU");
            true
        }
        wgpu::MaintainResult::Ok => {
            tracing::warn!("GPU work still pending after final wait");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_poll_reports_pending_work() {
        assert!(report_final_poll(wgpu::MaintainResult::SubmissionQueueEmpty));
        assert!(!report_final_poll(wgpu::MaintainResult::Ok));
    }
}

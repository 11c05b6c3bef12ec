//! Frame loop over host-memory ring slots

use crate::scene::{CameraUniforms, InstanceParams, Scene};
use anyhow::{ensure, Context, Result};
use tessera_core::{AllocatorSettings, HostBuffer, RingAllocator};

pub fn run(settings: &AllocatorSettings, frames: u64, scene: &Scene) -> Result<RingAllocator<HostBuffer>> {
    let mut ring =
        RingAllocator::from_settings(settings).context("failed to create host ring allocator")?;

    for frame in 0..frames {
        let camera = ring.allocate::<CameraUniforms>(1)?;
        ring.write(&camera, &[scene.camera(frame)])?;

        let params = scene.instances(frame);
        let instances = ring.allocate::<InstanceParams>(params.len())?;
        ring.write(&instances, &params)?;

        // Submission: the slot is handed off and must not change.
        ring.freeze();
        ensure!(
            ring.read(&instances)? == params,
            "slot {} does not hold frame {frame}'s instances",
            ring.current_index()
        );

        let usage = ring.advance_frame();
        tracing::debug!(
            frame,
            slot = usage.slot,
            bytes = usage.bytes,
            utilization = usage.utilization(),
            "frame closed"
        );
    }

    Ok(ring)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_frames_and_wraps_ring() {
        let settings = AllocatorSettings {
            ring_depth: 3,
            buffer_size: 64 * 1024,
            alignment: Some(256),
            history_len: 16,
        };
        let ring = run(&settings, 10, &Scene::default()).unwrap();
        assert_eq!(ring.generation(), 10);
        assert_eq!(ring.current_index(), 10 % 3);
        assert_eq!(ring.history().len(), 10);
        assert!(ring.history().peak_bytes() > 80);
    }

    #[test]
    fn undersized_ring_fails_fast() {
        let settings = AllocatorSettings {
            ring_depth: 2,
            buffer_size: 1024,
            alignment: Some(256),
            history_len: 4,
        };
        let err = run(&settings, 1, &Scene::default()).unwrap_err();
        assert!(err.to_string().contains("out of memory"));
    }
}

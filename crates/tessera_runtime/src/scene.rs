//! Synthetic per-frame data: an orbiting camera over a grid of instances
//! whose count varies frame to frame.

use glam::{Mat4, Vec3, Vec4};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniforms {
    pub view_proj: Mat4,
    pub eye: Vec4,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceParams {
    /// xyz translation, w uniform scale
    pub translation_scale: Vec4,
    pub color: Vec4,
}

pub struct Scene {
    pub base_instances: usize,
    pub extra_instances: usize,
    pub aspect: f32,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            base_instances: 64,
            extra_instances: 192,
            aspect: 16.0 / 9.0,
        }
    }
}

impl Scene {
    pub fn max_instances(&self) -> usize {
        self.base_instances.max(1) + self.extra_instances
    }

    pub fn camera(&self, frame: u64) -> CameraUniforms {
        let angle = frame as f32 * 0.01;
        let eye = Vec3::new(angle.cos() * 20.0, 8.0, angle.sin() * 20.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, self.aspect, 0.1, 500.0);
        CameraUniforms {
            view_proj: proj * view,
            eye: eye.extend(1.0),
        }
    }

    /// Instance count cycles between `base` and `base + extra`.
    pub fn instance_count(&self, frame: u64) -> usize {
        let span = self.extra_instances as u64 + 1;
        self.base_instances.max(1) + (frame.wrapping_mul(37) % span) as usize
    }

    pub fn instances(&self, frame: u64) -> Vec<InstanceParams> {
        let count = self.instance_count(frame);
        let side = (count as f32).sqrt().ceil() as usize;
        (0..count)
            .map(|i| {
                let x = (i % side) as f32 - side as f32 * 0.5;
                let z = (i / side) as f32 - side as f32 * 0.5;
                let t = i as f32 / count as f32;
                InstanceParams {
                    translation_scale: Vec4::new(x, 0.0, z, 0.5),
                    color: Vec4::new(t, 1.0 - t, 0.5, 1.0),
                }
            })
            .collect()
    }
}

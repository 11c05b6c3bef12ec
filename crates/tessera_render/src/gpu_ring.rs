//! GPU-backed ring allocator
//!
//! Each ring slot is a `wgpu::Buffer` with a host shadow. Writes land in the
//! shadow; [`GpuRing::upload`] pushes the touched range of the current slot
//! through the queue right before the frame's command buffers are submitted.

use crate::RenderError;
use bytemuck::Pod;
use std::ops::Range;
use tessera_core::{
    AllocatorSettings, Alignment, BackingBuffer, FrameUsage, RingAllocator, RingError,
    SubAllocation, MAX_BUFFER_SIZE,
};

/// Byte range written since the last flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct DirtyRange(Option<Range<u64>>);

impl DirtyRange {
    fn mark(&mut self, range: Range<u64>) {
        if range.is_empty() {
            return;
        }
        self.0 = Some(match self.0.take() {
            Some(prev) => prev.start.min(range.start)..prev.end.max(range.end),
            None => range,
        });
    }

    /// Take the range widened to the queue's copy alignment, clamped to `len`.
    fn take_aligned(&mut self, len: u64) -> Option<Range<u64>> {
        let range = self.0.take()?;
        let mask = wgpu::COPY_BUFFER_ALIGNMENT - 1;
        let start = range.start & !mask;
        let end = ((range.end + mask) & !mask).min(len);
        Some(start..end)
    }
}

/// One ring slot: device buffer plus host shadow.
pub struct StagedBuffer {
    buffer: wgpu::Buffer,
    shadow: Box<[u8]>,
    dirty: DirtyRange,
}

impl StagedBuffer {
    pub fn new(device: &wgpu::Device, label: &str, size: u64, usage: wgpu::BufferUsages) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            shadow: vec![0u8; size as usize].into_boxed_slice(),
            dirty: DirtyRange::default(),
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Upload pending writes. Returns the number of bytes queued.
    pub fn flush(&mut self, queue: &wgpu::Queue) -> u64 {
        let Some(range) = self.dirty.take_aligned(self.shadow.len() as u64) else {
            return 0;
        };
        let bytes = &self.shadow[range.start as usize..range.end as usize];
        queue.write_buffer(&self.buffer, range.start, bytes);
        range.end - range.start
    }
}

impl BackingBuffer for StagedBuffer {
    fn len(&self) -> u64 {
        self.shadow.len() as u64
    }

    fn write_bytes(&mut self, offset: u64, bytes: &[u8]) {
        let start = offset as usize;
        self.shadow[start..start + bytes.len()].copy_from_slice(bytes);
        self.dirty.mark(offset..offset + bytes.len() as u64);
    }

    fn read_bytes(&self) -> Option<&[u8]> {
        Some(&self.shadow)
    }
}

/// Ring allocator whose slots are device buffers.
pub struct GpuRing {
    ring: RingAllocator<StagedBuffer>,
}

impl GpuRing {
    /// Slots can back both uniform and storage bindings.
    pub const DEFAULT_USAGE: wgpu::BufferUsages =
        wgpu::BufferUsages::UNIFORM.union(wgpu::BufferUsages::STORAGE);

    pub fn new(device: &wgpu::Device, ring_depth: usize, buffer_size: u64) -> Result<Self, RenderError> {
        Self::with_alignment(device, ring_depth, buffer_size, Alignment::for_target())
    }

    pub fn from_settings(device: &wgpu::Device, settings: &AllocatorSettings) -> Result<Self, RenderError> {
        settings.validate()?;
        let ring = Self::with_alignment(
            device,
            settings.ring_depth as usize,
            settings.buffer_size,
            settings.resolved_alignment()?,
        )?;
        Ok(Self {
            ring: ring.ring.with_history_capacity(settings.history_len),
        })
    }

    /// `alignment` is raised to the device's uniform/storage offset alignment
    /// when that is stricter.
    pub fn with_alignment(
        device: &wgpu::Device,
        ring_depth: usize,
        buffer_size: u64,
        alignment: Alignment,
    ) -> Result<Self, RenderError> {
        let limits = device.limits();
        let device_alignment = limits
            .min_uniform_buffer_offset_alignment
            .max(limits.min_storage_buffer_offset_alignment) as u64;
        let alignment = Alignment::new(device_alignment).map_or(alignment, |a| alignment.max(a));

        // The host shadow caps the slot size as well as the device.
        let limit = limits.max_buffer_size.min(MAX_BUFFER_SIZE);
        let mask = wgpu::COPY_BUFFER_ALIGNMENT - 1;
        let buffer_size = match buffer_size.checked_add(mask) {
            Some(padded) if padded & !mask <= limit => padded & !mask,
            _ => {
                return Err(RenderError::BufferTooLarge {
                    requested: buffer_size,
                    limit,
                })
            }
        };

        let buffers = (0..ring_depth)
            .map(|slot| {
                StagedBuffer::new(
                    device,
                    &format!("tessera ring slot {slot}"),
                    buffer_size,
                    Self::DEFAULT_USAGE,
                )
            })
            .collect();

        Ok(Self {
            ring: RingAllocator::from_buffers(buffers, alignment)?,
        })
    }

    pub fn allocate<T>(&mut self, count: usize) -> Result<SubAllocation<T>, RingError> {
        self.ring.allocate(count)
    }

    pub fn write<T: Pod>(&mut self, sub: &SubAllocation<T>, data: &[T]) -> Result<(), RingError> {
        self.ring.write(sub, data)
    }

    /// Queue the current slot's pending writes and freeze the ring: the
    /// frame's data is now owned by the submission.
    pub fn upload(&mut self, queue: &wgpu::Queue) -> u64 {
        let bytes = self.ring.current_buffer_mut().flush(queue);
        self.ring.freeze();
        tracing::trace!(
            slot = self.ring.current_index(),
            bytes,
            "uploaded ring slot"
        );
        bytes
    }

    pub fn advance_frame(&mut self) -> FrameUsage {
        self.ring.advance_frame()
    }

    pub fn freeze(&mut self) {
        self.ring.freeze();
    }

    pub fn unfreeze(&mut self) {
        self.ring.unfreeze();
    }

    pub fn is_writable(&self) -> bool {
        self.ring.is_writable()
    }

    /// Binding for `sub` in the current slot's device buffer.
    ///
    /// Zero-length regions are rejected: wgpu reads an unsized binding as
    /// "to the end of the buffer".
    pub fn binding<T>(&self, sub: &SubAllocation<T>) -> Result<wgpu::BufferBinding<'_>, RingError> {
        self.ring.check_current(sub)?;
        let size = wgpu::BufferSize::new(sub.len_bytes()).ok_or(RingError::EmptyAllocation)?;
        Ok(wgpu::BufferBinding {
            buffer: self.ring.current_buffer().buffer(),
            offset: sub.offset(),
            size: Some(size),
        })
    }

    pub fn current_buffer(&self) -> &wgpu::Buffer {
        self.ring.current_buffer().buffer()
    }

    pub fn ring(&self) -> &RingAllocator<StagedBuffer> {
        &self.ring
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_headless_device;

    /// Tests needing a device pass trivially on machines without an adapter.
    fn device() -> Option<(wgpu::Device, wgpu::Queue)> {
        match pollster::block_on(request_headless_device()) {
            Ok((device, queue, _)) => Some((device, queue)),
            Err(err) => {
                eprintln!("no GPU available, skipping: {err}");
                None
            }
        }
    }

    fn device_alignment(device: &wgpu::Device) -> u64 {
        let limits = device.limits();
        limits
            .min_uniform_buffer_offset_alignment
            .max(limits.min_storage_buffer_offset_alignment) as u64
    }

    #[test]
    fn staged_buffer_flushes_dirty_range_once() {
        let Some((device, queue)) = device() else { return };
        let mut staged = StagedBuffer::new(&device, "staged", 64, wgpu::BufferUsages::UNIFORM);

        staged.write_bytes(6, &[1, 2, 3]);
        assert_eq!(staged.read_bytes().map(|b| &b[5..10]), Some(&[0, 1, 2, 3, 0][..]));
        assert_eq!(staged.flush(&queue), 8);
        assert_eq!(staged.flush(&queue), 0);
    }

    #[test]
    fn upload_freezes_ring() {
        let Some((device, queue)) = device() else { return };
        let mut ring = GpuRing::new(&device, 2, 4096).unwrap();

        let sub = ring.allocate::<u32>(4).unwrap();
        ring.write(&sub, &[1, 2, 3, 4]).unwrap();
        assert_eq!(ring.upload(&queue), 16);
        assert!(!ring.is_writable());
        assert_eq!(ring.write(&sub, &[5]), Err(RingError::NotWritable));

        ring.advance_frame();
        assert!(ring.is_writable());
    }

    #[test]
    fn binding_rejects_stale_handles() {
        let Some((device, _queue)) = device() else { return };
        let mut ring = GpuRing::new(&device, 2, 4096).unwrap();

        let sub = ring.allocate::<u32>(4).unwrap();
        assert_eq!(ring.binding(&sub).map(|b| b.offset).ok(), Some(0));
        ring.advance_frame();
        assert!(matches!(
            ring.binding(&sub),
            Err(RingError::StaleAllocation { .. })
        ));
    }

    #[test]
    fn binding_rejects_empty_region() {
        let Some((device, _queue)) = device() else { return };
        let mut ring = GpuRing::new(&device, 2, 4096).unwrap();

        let empty = ring.allocate::<u32>(0).unwrap();
        assert!(matches!(ring.binding(&empty), Err(RingError::EmptyAllocation)));
    }

    #[test]
    fn alignment_raised_to_device_limit() {
        let Some((device, _queue)) = device() else { return };
        let required = device_alignment(&device);
        let mut ring = GpuRing::with_alignment(&device, 2, 4096, Alignment::MOBILE).unwrap();
        assert!(ring.ring().alignment().get() >= required);

        ring.allocate::<u8>(1).unwrap();
        let sub = ring.allocate::<u32>(1).unwrap();
        let offset = ring.binding(&sub).map(|b| b.offset).unwrap();
        assert!(offset > 0);
        assert_eq!(offset % required, 0);
    }

    #[test]
    fn oversized_ring_rejected() {
        let Some((device, _queue)) = device() else { return };
        let limit = device.limits().max_buffer_size.min(MAX_BUFFER_SIZE);

        assert!(matches!(
            GpuRing::new(&device, 2, limit + 1),
            Err(RenderError::BufferTooLarge { .. })
        ));
        assert!(matches!(
            GpuRing::new(&device, 2, u64::MAX),
            Err(RenderError::BufferTooLarge { .. })
        ));
    }

    #[test]
    fn dirty_range_merges_writes() {
        let mut dirty = DirtyRange::default();
        dirty.mark(256..320);
        dirty.mark(0..64);
        dirty.mark(100..100);
        assert_eq!(dirty.0, Some(0..320));
    }

    #[test]
    fn dirty_range_aligns_to_copy_size() {
        let mut dirty = DirtyRange::default();
        dirty.mark(5..11);
        assert_eq!(dirty.take_aligned(1024), Some(4..12));
        assert_eq!(dirty.take_aligned(1024), None);
    }

    #[test]
    fn dirty_range_clamped_to_buffer() {
        let mut dirty = DirtyRange::default();
        dirty.mark(60..63);
        assert_eq!(dirty.take_aligned(64), Some(60..64));
    }
}

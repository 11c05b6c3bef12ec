//! Ring-buffered per-frame allocator
//!
//! The CPU writes per-frame data (camera matrices, instance parameters) into
//! one of `N` equally sized backing buffers while the GPU may still be reading
//! the others. Each frame the render loop calls [`RingAllocator::advance_frame`]
//! once, after the frame's command buffers have been submitted; the slot it
//! leaves is not written again until the ring has wrapped all the way around.
//!
//! Nothing here waits on the GPU. Correctness depends on the ring being deeper
//! than the number of frames the GPU can lag behind; reusing a slot too early
//! shows up as corrupted frames, not as an error.
//!
//! ```ignore
//! let mut ring = RingAllocator::new(3, 64 * 1024)?;
//! loop {
//!     let camera = ring.allocate::<CameraUniforms>(1)?;
//!     ring.write(&camera, &[uniforms])?;
//!     ring.freeze();
//!     // ... encode + submit commands reading `camera` ...
//!     ring.advance_frame();
//! }
//! ```

use crate::align::Alignment;
use crate::backing::{BackingBuffer, HostBuffer};
use crate::settings::AllocatorSettings;
use crate::usage::{FrameUsage, UsageHistory};
use bytemuck::Pod;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Allocator protocol violations.
///
/// None of these are transient: they mean the ring is undersized for the
/// frame's demand or the caller broke the allocate → write → advance order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingError {
    #[error("ring slot out of memory: {requested} bytes at offset {offset} exceeds capacity {capacity}")]
    CapacityExceeded {
        requested: u64,
        offset: u64,
        capacity: u64,
    },

    #[error("ring allocator is frozen; no allocations or writes until the next frame")]
    NotWritable,

    #[error("sub-allocation from frame {allocation} used in frame {current}")]
    StaleAllocation { allocation: u64, current: u64 },

    #[error("write of {len} bytes overflows a {capacity} byte sub-allocation")]
    WriteOverflow { len: u64, capacity: u64 },

    #[error("invalid ring configuration: {0}")]
    InvalidConfig(String),

    #[error("sub-allocation belongs to allocator {allocation}, not {current}")]
    ForeignAllocation { allocation: u64, current: u64 },

    #[error("sub-allocation ends at byte {end}, past slot capacity {capacity}")]
    OutOfBounds { end: u64, capacity: u64 },

    #[error("zero-length sub-allocation cannot be bound")]
    EmptyAllocation,

    #[error("backing buffer cannot be read from the host")]
    Unreadable,
}

/// Largest slot size a host allocation can hold.
pub const MAX_BUFFER_SIZE: u64 = isize::MAX as u64;

static NEXT_ALLOCATOR_ID: AtomicU64 = AtomicU64::new(0);

/// Non-owning view of a region in the slot that was writable when it was
/// carved out.
///
/// Only valid until the next [`RingAllocator::advance_frame`]; the allocator
/// rejects it afterwards.
pub struct SubAllocation<T> {
    allocator: u64,
    slot: usize,
    generation: u64,
    offset: u64,
    len_bytes: u64,
    count: usize,
    _element: PhantomData<fn() -> T>,
}

impl<T> SubAllocation<T> {
    /// Ring slot the region lives in.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Frame generation the region was allocated in.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Byte offset inside the slot's buffer.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn len_bytes(&self) -> u64 {
        self.len_bytes
    }

    /// Element count.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn byte_range(&self) -> Range<u64> {
        self.offset..self.offset + self.len_bytes
    }
}

impl<T> Clone for SubAllocation<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SubAllocation<T> {}

impl<T> PartialEq for SubAllocation<T> {
    fn eq(&self, other: &Self) -> bool {
        self.allocator == other.allocator
            && self.slot == other.slot
            && self.generation == other.generation
            && self.offset == other.offset
            && self.len_bytes == other.len_bytes
    }
}

impl<T> Eq for SubAllocation<T> {}

impl<T> fmt::Debug for SubAllocation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubAllocation")
            .field("element", &std::any::type_name::<T>())
            .field("allocator", &self.allocator)
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .field("offset", &self.offset)
            .field("len_bytes", &self.len_bytes)
            .finish()
    }
}

/// Fixed ring of `N` backing buffers with linear sub-allocation in the
/// current one.
pub struct RingAllocator<B> {
    id: u64,
    buffers: Vec<B>,
    buffer_size: u64,
    alignment: Alignment,
    current: usize,
    /// High-water mark in `buffers[current]`.
    allocated: u64,
    allocations: u32,
    generation: u64,
    frozen: bool,
    history: UsageHistory,
}

impl RingAllocator<HostBuffer> {
    /// Host-memory ring with the target's default alignment.
    pub fn new(ring_depth: usize, buffer_size: u64) -> Result<Self, RingError> {
        Self::with_alignment(ring_depth, buffer_size, Alignment::for_target())
    }

    pub fn with_alignment(
        ring_depth: usize,
        buffer_size: u64,
        alignment: Alignment,
    ) -> Result<Self, RingError> {
        if ring_depth == 0 {
            return Err(RingError::InvalidConfig(
                "ring depth must be at least 1".to_string(),
            ));
        }
        if buffer_size > MAX_BUFFER_SIZE {
            return Err(RingError::InvalidConfig(format!(
                "buffer size {buffer_size} exceeds {MAX_BUFFER_SIZE} bytes"
            )));
        }
        let buffers = (0..ring_depth)
            .map(|_| HostBuffer::zeroed(buffer_size))
            .collect();
        Self::from_buffers(buffers, alignment)
    }

    pub fn from_settings(settings: &AllocatorSettings) -> Result<Self, RingError> {
        settings
            .validate()
            .map_err(|e| RingError::InvalidConfig(e.to_string()))?;
        let alignment = settings
            .resolved_alignment()
            .map_err(|e| RingError::InvalidConfig(e.to_string()))?;
        Ok(Self::with_alignment(
            settings.ring_depth as usize,
            settings.buffer_size,
            alignment,
        )?
        .with_history_capacity(settings.history_len))
    }
}

impl<B: BackingBuffer> RingAllocator<B> {
    /// Build a ring over caller-supplied buffers, one per slot.
    ///
    /// All buffers must be non-empty and the same length.
    pub fn from_buffers(buffers: Vec<B>, alignment: Alignment) -> Result<Self, RingError> {
        let Some(first) = buffers.first() else {
            return Err(RingError::InvalidConfig(
                "ring depth must be at least 1".to_string(),
            ));
        };
        let buffer_size = first.len();
        if buffer_size == 0 {
            return Err(RingError::InvalidConfig(
                "buffer size must be non-zero".to_string(),
            ));
        }
        if buffer_size > MAX_BUFFER_SIZE {
            return Err(RingError::InvalidConfig(format!(
                "buffer size {buffer_size} exceeds {MAX_BUFFER_SIZE} bytes"
            )));
        }
        if let Some((slot, b)) = buffers
            .iter()
            .enumerate()
            .find(|(_, b)| b.len() != buffer_size)
        {
            return Err(RingError::InvalidConfig(format!(
                "slot {slot} is {} bytes, expected {buffer_size}",
                b.len()
            )));
        }

        let id = NEXT_ALLOCATOR_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            id,
            ring_depth = buffers.len(),
            buffer_size,
            alignment = alignment.get(),
            "created ring allocator"
        );

        Ok(Self {
            id,
            buffers,
            buffer_size,
            alignment,
            current: 0,
            allocated: 0,
            allocations: 0,
            generation: 0,
            frozen: false,
            history: UsageHistory::default(),
        })
    }

    /// Number of frames of usage kept in [`RingAllocator::history`].
    pub fn with_history_capacity(mut self, frames: usize) -> Self {
        self.history = UsageHistory::new(frames);
        self
    }

    /// Reserve room for `count` elements of `T` in the current slot.
    ///
    /// The region starts at the high-water mark rounded up to the ring's
    /// alignment (or `T`'s, if stricter). The high-water mark moves to the end
    /// of the region and is left untouched on failure.
    pub fn allocate<T>(&mut self, count: usize) -> Result<SubAllocation<T>, RingError> {
        if self.frozen {
            tracing::error!(
                slot = self.current,
                generation = self.generation,
                "allocation attempted on a frozen ring"
            );
            return Err(RingError::NotWritable);
        }

        let align = Alignment::new(std::mem::align_of::<T>() as u64)
            .map_or(self.alignment, |a| self.alignment.max(a));
        let size = (std::mem::size_of::<T>() as u64).checked_mul(count as u64);
        let offset = align.align_up(self.allocated);

        let (offset, size) = match (offset, size) {
            (Some(offset), Some(size))
                if offset
                    .checked_add(size)
                    .is_some_and(|end| end <= self.buffer_size) =>
            {
                (offset, size)
            }
            (offset, size) => {
                let err = RingError::CapacityExceeded {
                    requested: size.unwrap_or(u64::MAX),
                    offset: offset.unwrap_or(u64::MAX),
                    capacity: self.buffer_size,
                };
                tracing::error!(
                    slot = self.current,
                    allocated = self.allocated,
                    "{err}"
                );
                return Err(err);
            }
        };

        self.allocated = offset + size;
        self.allocations += 1;

        Ok(SubAllocation {
            allocator: self.id,
            slot: self.current,
            generation: self.generation,
            offset,
            len_bytes: size,
            count,
            _element: PhantomData,
        })
    }

    /// Untyped form of [`RingAllocator::allocate`].
    pub fn allocate_bytes(&mut self, len: usize) -> Result<SubAllocation<u8>, RingError> {
        self.allocate::<u8>(len)
    }

    /// Copy `data` into the start of `sub`'s region.
    pub fn write<T: Pod>(&mut self, sub: &SubAllocation<T>, data: &[T]) -> Result<(), RingError> {
        if self.frozen {
            tracing::error!(
                slot = self.current,
                generation = self.generation,
                "write attempted on a frozen ring"
            );
            return Err(RingError::NotWritable);
        }
        self.check_current(sub)?;

        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as u64 > sub.len_bytes {
            return Err(RingError::WriteOverflow {
                len: bytes.len() as u64,
                capacity: sub.len_bytes,
            });
        }

        self.buffers[self.current].write_bytes(sub.offset, bytes);
        Ok(())
    }

    /// Raw bytes of `sub`'s region, for host-readable backings.
    pub fn read_bytes<T>(&self, sub: &SubAllocation<T>) -> Result<&[u8], RingError> {
        self.check_current(sub)?;
        let bytes = self.buffers[self.current]
            .read_bytes()
            .ok_or(RingError::Unreadable)?;
        let range = sub.offset as usize..(sub.offset + sub.len_bytes) as usize;
        Ok(&bytes[range])
    }

    /// Copy `sub`'s region back out as `T`s.
    pub fn read<T: Pod>(&self, sub: &SubAllocation<T>) -> Result<Vec<T>, RingError> {
        let bytes = self.read_bytes(sub)?;
        let mut out = vec![T::zeroed(); sub.count];
        if std::mem::size_of::<T>() > 0 {
            bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(bytes);
        }
        Ok(out)
    }

    /// Close the current frame and make the next slot writable.
    ///
    /// Call exactly once per frame, after the frame's GPU work has been
    /// submitted. Resets the high-water mark, moves to `(i + 1) mod N`, and
    /// lifts any freeze: the new slot opens a fresh allocate → write → submit
    /// window. Sub-allocations from the closed frame become stale.
    pub fn advance_frame(&mut self) -> FrameUsage {
        let usage = FrameUsage {
            slot: self.current,
            generation: self.generation,
            bytes: self.allocated,
            allocations: self.allocations,
            capacity: self.buffer_size,
        };
        self.history.record(usage);

        self.current = (self.current + 1) % self.buffers.len();
        self.allocated = 0;
        self.allocations = 0;
        self.generation += 1;
        self.frozen = false;

        tracing::trace!(
            slot = self.current,
            generation = self.generation,
            closed_bytes = usage.bytes,
            "advanced ring"
        );
        usage
    }

    /// Block further allocations and writes until the next frame (or
    /// [`RingAllocator::unfreeze`]).
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        !self.frozen
    }

    #[inline]
    pub fn ring_depth(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn buffer_size(&self) -> u64 {
        self.buffer_size
    }

    #[inline]
    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// Index of the writable slot.
    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// High-water mark of the current slot.
    #[inline]
    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    #[inline]
    pub fn remaining(&self) -> u64 {
        self.buffer_size - self.allocated
    }

    /// Frames closed so far.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_buffer(&self) -> &B {
        &self.buffers[self.current]
    }

    /// Mutable access to the writable slot, for backings that stage writes
    /// and flush them at submission.
    pub fn current_buffer_mut(&mut self) -> &mut B {
        &mut self.buffers[self.current]
    }

    /// Any slot, e.g. to bind it. Other slots may be in flight on the GPU.
    pub fn buffer(&self, slot: usize) -> Option<&B> {
        self.buffers.get(slot)
    }

    pub fn history(&self) -> &UsageHistory {
        &self.history
    }

    /// Process-unique id stamped into every sub-allocation from this ring.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Reject sub-allocations from another ring or an earlier frame.
    pub fn check_current<T>(&self, sub: &SubAllocation<T>) -> Result<(), RingError> {
        if sub.allocator != self.id {
            tracing::error!(?sub, current = self.id, "sub-allocation from another ring");
            return Err(RingError::ForeignAllocation {
                allocation: sub.allocator,
                current: self.id,
            });
        }
        if sub.generation != self.generation || sub.slot != self.current {
            tracing::error!(?sub, current = self.generation, "stale sub-allocation");
            return Err(RingError::StaleAllocation {
                allocation: sub.generation,
                current: self.generation,
            });
        }
        let end = sub.offset.checked_add(sub.len_bytes).unwrap_or(u64::MAX);
        if end > self.buffer_size {
            return Err(RingError::OutOfBounds {
                end,
                capacity: self.buffer_size,
            });
        }
        Ok(())
    }
}

impl<B> fmt::Debug for RingAllocator<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingAllocator")
            .field("id", &self.id)
            .field("ring_depth", &self.buffers.len())
            .field("buffer_size", &self.buffer_size)
            .field("alignment", &self.alignment)
            .field("current", &self.current)
            .field("allocated", &self.allocated)
            .field("generation", &self.generation)
            .field("frozen", &self.frozen)
            .finish()
    }
}

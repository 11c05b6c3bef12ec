//! Backing storage for ring slots

/// One slot of the ring: a fixed-size byte buffer the CPU writes into.
///
/// GPU implementations may not be readable from the host; they return `None`
/// from [`BackingBuffer::read_bytes`].
pub trait BackingBuffer {
    /// Capacity in bytes. Never changes after creation.
    fn len(&self) -> u64;

    /// Copy `bytes` to `offset`. Callers guarantee the range is in bounds.
    fn write_bytes(&mut self, offset: u64, bytes: &[u8]);

    fn read_bytes(&self) -> Option<&[u8]> {
        None
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Heap-allocated, zero-initialized backing.
#[derive(Debug, Clone)]
pub struct HostBuffer {
    bytes: Box<[u8]>,
}

impl HostBuffer {
    pub fn zeroed(len: u64) -> Self {
        Self {
            bytes: vec![0u8; len as usize].into_boxed_slice(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl BackingBuffer for HostBuffer {
    #[inline]
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    #[inline]
    fn write_bytes(&mut self, offset: u64, bytes: &[u8]) {
        let start = offset as usize;
        self.bytes[start..start + bytes.len()].copy_from_slice(bytes);
    }

    fn read_bytes(&self) -> Option<&[u8]> {
        Some(&self.bytes)
    }
}

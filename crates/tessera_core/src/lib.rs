//! Tessera Core
//!
//! Per-frame scratch memory for CPU-written, GPU-read data:
//! - Ring allocator over a fixed set of backing buffers
//! - Alignment policy per target class
//! - Host-side backing buffers (GPU backings live in `tessera_render`)
//! - Usage history and allocator settings

pub mod align;
pub mod backing;
pub mod ring;
pub mod settings;
pub mod usage;

pub use align::Alignment;
pub use backing::{BackingBuffer, HostBuffer};
pub use ring::{RingAllocator, RingError, SubAllocation, MAX_BUFFER_SIZE};
pub use settings::{AllocatorSettings, SettingsError};
pub use usage::{FrameUsage, UsageHistory};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}

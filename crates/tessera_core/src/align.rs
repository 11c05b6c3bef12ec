//! Sub-allocation alignment
//!
//! Constant-buffer offsets must land on a hardware-defined boundary: 16 bytes
//! on mobile-class GPUs, 256 bytes on desktop-class ones.

use std::fmt;

/// Power-of-two byte alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Alignment(u64);

impl Alignment {
    /// Mobile/constrained targets.
    pub const MOBILE: Alignment = Alignment(16);
    /// Desktop-class targets.
    pub const DESKTOP: Alignment = Alignment(256);

    /// Returns `None` unless `bytes` is a non-zero power of two.
    pub fn new(bytes: u64) -> Option<Self> {
        bytes.is_power_of_two().then_some(Self(bytes))
    }

    /// Alignment for the platform this binary is compiled for.
    pub const fn for_target() -> Self {
        if cfg!(any(
            target_os = "ios",
            target_os = "tvos",
            target_os = "watchos",
            target_os = "android"
        )) {
            Self::MOBILE
        } else {
            Self::DESKTOP
        }
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The stricter of the two alignments.
    #[inline]
    pub fn max(self, other: Alignment) -> Alignment {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }

    /// Round `value` up to the next multiple of this alignment.
    ///
    /// Returns `None` on overflow.
    #[inline]
    pub fn align_up(self, value: u64) -> Option<u64> {
        let mask = self.0 - 1;
        value.checked_add(mask).map(|v| v & !mask)
    }

    #[inline]
    pub fn is_aligned(self, value: u64) -> bool {
        value & (self.0 - 1) == 0
    }
}

impl Default for Alignment {
    fn default() -> Self {
        Self::for_target()
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} B", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two() {
        assert!(Alignment::new(0).is_none());
        assert!(Alignment::new(48).is_none());
        assert_eq!(Alignment::new(64).map(Alignment::get), Some(64));
    }

    #[test]
    fn align_up_rounds_to_boundary() {
        let a = Alignment::DESKTOP;
        assert_eq!(a.align_up(0), Some(0));
        assert_eq!(a.align_up(1), Some(256));
        assert_eq!(a.align_up(256), Some(256));
        assert_eq!(a.align_up(320), Some(512));
        assert_eq!(a.align_up(u64::MAX), None);
    }

    #[test]
    fn target_alignment_is_known_value() {
        let a = Alignment::for_target();
        assert!(a == Alignment::MOBILE || a == Alignment::DESKTOP);
        assert_eq!(Alignment::default(), a);
    }

    #[test]
    fn max_picks_stricter() {
        assert_eq!(Alignment::MOBILE.max(Alignment::DESKTOP), Alignment::DESKTOP);
        assert_eq!(Alignment::DESKTOP.max(Alignment::MOBILE), Alignment::DESKTOP);
    }
}

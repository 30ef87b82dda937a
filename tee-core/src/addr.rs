//! Virtual addresses inside a TA address space.
use core::ops::Add;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
/// A virtual address.
///
/// Unlike a hardware address type this does not enforce canonical form: TA
/// images are validated against a per-class ceiling by the loader instead.
pub struct VirtAddr(u64);

impl VirtAddr {
    #[must_use]
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    #[must_use]
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[must_use]
    #[inline]
    /// Adds `offset`, returning `None` on overflow.
    pub const fn checked_add(self, offset: u64) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    #[must_use]
    #[inline]
    /// Returns the distance from `base` to `self`, or `None` if `self < base`.
    pub const fn checked_offset_from(self, base: Self) -> Option<u64> {
        self.0.checked_sub(base.0)
    }
}

impl Add<u64> for VirtAddr {
    type Output = Self;

    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0.checked_add(rhs).expect("virtual address overflow"))
    }
}

impl core::fmt::LowerHex for VirtAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::LowerHex::fmt(&self.0, f)
    }
}

#[must_use]
#[inline]
/// Rounds `value` down to a multiple of `align`.
pub const fn align_down(value: u64, align: u64) -> u64 {
    assert!(align.is_power_of_two());
    value & !(align - 1)
}

#[must_use]
#[inline]
/// Rounds `value` up to a multiple of `align`, or `None` on overflow.
pub const fn align_up(value: u64, align: u64) -> Option<u64> {
    assert!(align.is_power_of_two());
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment() {
        assert_eq!(align_down(0x1234, 0x1000), 0x1000);
        assert_eq!(align_up(0x1234, 0x1000), Some(0x2000));
        assert_eq!(align_up(0x2000, 0x1000), Some(0x2000));
        assert_eq!(align_up(u64::MAX, 0x1000), None);
    }

    #[test]
    fn test_checked_arithmetic() {
        let base = VirtAddr::new(0x4000_0000);
        assert_eq!(base.checked_add(0x200), Some(VirtAddr::new(0x4000_0200)));
        assert_eq!(VirtAddr::new(u64::MAX).checked_add(1), None);
        assert_eq!(VirtAddr::new(0x4000_0200).checked_offset_from(base), Some(0x200));
        assert_eq!(base.checked_offset_from(VirtAddr::new(0x4000_0200)), None);
        assert_eq!(base + 0x10, VirtAddr::new(0x4000_0010));
    }
}

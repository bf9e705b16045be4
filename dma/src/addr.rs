//! Addresses and addressable-range masks.

use core::fmt;

/// Host physical address, or a device-visible bus address.
pub type PhysAddr = u64;

/// Convert a CPU pointer to the physical address behind it.
///
/// Firmware runs identity-mapped, so this is a plain cast.
#[inline(always)]
pub fn virt_to_phys(ptr: *const u8) -> PhysAddr {
    ptr as usize as PhysAddr
}

/// Bitmask describing which bus addresses a device can generate.
///
/// An address `a` is reachable iff `a & !mask == 0`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DmaMask(PhysAddr);

impl DmaMask {
    /// Full representable range.
    pub const MAX: Self = Self(!0);

    /// Devices limited to 32-bit addressing.
    pub const BITS_32: Self = Self(0xFFFF_FFFF);

    /// Mask from raw bits.
    #[inline]
    pub const fn from_bits(bits: PhysAddr) -> Self {
        Self(bits)
    }

    /// Mask covering the low `width` address bits. Widths of 64 and above
    /// give [`DmaMask::MAX`].
    #[inline]
    pub const fn with_width(width: u32) -> Self {
        if width >= PhysAddr::BITS {
            Self::MAX
        } else {
            Self(((1 as PhysAddr) << width) - 1)
        }
    }

    /// Raw mask bits.
    #[inline]
    pub const fn bits(self) -> PhysAddr {
        self.0
    }

    /// Check a single address.
    #[inline]
    pub const fn contains(self, addr: PhysAddr) -> bool {
        addr & !self.0 == 0
    }

    /// Check every byte of `[addr, addr + len)`.
    ///
    /// A range that wraps past the top of the address space is never
    /// contained. An empty range only needs its start address to fit.
    pub const fn contains_range(self, addr: PhysAddr, len: usize) -> bool {
        if len == 0 {
            return self.contains(addr);
        }
        match addr.checked_add(len as PhysAddr - 1) {
            Some(last) => self.contains(addr) && self.contains(last),
            None => false,
        }
    }
}

impl Default for DmaMask {
    fn default() -> Self {
        Self::MAX
    }
}

impl fmt::Debug for DmaMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DmaMask({:#x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width() {
        assert_eq!(DmaMask::with_width(32), DmaMask::BITS_32);
        assert_eq!(DmaMask::with_width(64), DmaMask::MAX);
        assert_eq!(DmaMask::with_width(48).bits(), 0xFFFF_FFFF_FFFF);
        assert_eq!(DmaMask::with_width(0).bits(), 0);
        assert_eq!(DmaMask::from_bits(0xFFFF_FFFF), DmaMask::BITS_32);
        assert_eq!(DmaMask::from_bits(0xFFF).bits(), 0xFFF);
    }

    #[test]
    fn test_contains_range() {
        let mask = DmaMask::BITS_32;
        assert!(mask.contains(0x1000));
        assert!(mask.contains_range(0xFFFF_F000, 0x1000));
        assert!(!mask.contains_range(0xFFFF_F000, 0x1001));
        assert!(!mask.contains(0x1_0000_0000));
        assert!(!DmaMask::MAX.contains_range(PhysAddr::MAX, 2));
        assert!(DmaMask::MAX.contains_range(PhysAddr::MAX, 1));
    }

    #[test]
    fn test_virt_to_phys_identity() {
        let buf = [0u8; 16];
        assert_eq!(virt_to_phys(buf.as_ptr()), buf.as_ptr() as usize as u64);
    }
}

//! Generic (dispatched) DMA operations.
//!
//! [`GenericDma`] forwards every call to whichever [`DmaBackend`] the
//! platform configured. The backend owns the translation hardware or bounce
//! buffers; `GenericDma` owns the contract: whatever the backend returns, no
//! device address outside the mask reaches the caller.

use core::ptr::NonNull;

use log::warn;

use crate::addr::{DmaMask, PhysAddr};
use crate::error::{DmaError, Result};
use crate::mapping::{DmaDirection, DmaMapping};
use crate::ops::{private, DmaOps};

/// Platform address-translation backend (IOMMU, bounce buffers, ...).
///
/// Backends may fail with [`DmaError::AddressOutOfRange`] when they cannot
/// place a mapping inside `mask`, or [`DmaError::TranslationExhausted`] when
/// they run out of entries. Tokens they produce must carry enough state to
/// undo the mapping later (including any copy-back on unmap).
pub trait DmaBackend {
    fn map(&self, mask: DmaMask, addr: PhysAddr, len: usize, dir: DmaDirection)
        -> Result<DmaMapping>;

    fn unmap(&self, mapping: DmaMapping);

    fn alloc(&self, mask: DmaMask, len: usize, align: usize) -> Result<(NonNull<u8>, DmaMapping)>;

    /// # Safety
    ///
    /// Arguments must come from one [`alloc`](Self::alloc) call on this backend.
    unsafe fn free(&self, addr: NonNull<u8>, len: usize, mapping: DmaMapping);

    /// Reprogram the translation window for a new device mask.
    fn set_mask(&self, mask: DmaMask);
}

/// Operations table that dispatches to a runtime-selected backend.
#[derive(Clone, Copy)]
pub struct GenericDma<'b> {
    backend: &'b (dyn DmaBackend + 'b),
}

impl<'b> GenericDma<'b> {
    pub const fn new(backend: &'b (dyn DmaBackend + 'b)) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &'b (dyn DmaBackend + 'b) {
        self.backend
    }
}

impl private::Sealed for GenericDma<'_> {}

impl DmaOps for GenericDma<'_> {
    fn map(
        &self,
        mask: DmaMask,
        addr: PhysAddr,
        len: usize,
        dir: DmaDirection,
    ) -> Result<DmaMapping> {
        let mapping = self.backend.map(mask, addr, len, dir)?;
        if !mask.contains_range(mapping.addr(), len) {
            warn!(
                "generic dma: backend mapped {:#x} to {:#x}+{:#x}, outside {:?}",
                addr,
                mapping.addr(),
                len,
                mask
            );
            self.backend.unmap(mapping);
            return Err(DmaError::AddressOutOfRange);
        }
        Ok(mapping)
    }

    fn unmap(&self, mapping: DmaMapping) {
        self.backend.unmap(mapping);
    }

    fn alloc(&self, mask: DmaMask, len: usize, align: usize) -> Result<(NonNull<u8>, DmaMapping)> {
        let (buf, mapping) = self.backend.alloc(mask, len, align)?;
        if !mask.contains_range(mapping.addr(), len) {
            warn!(
                "generic dma: backend allocated {:#x}+{:#x}, outside {:?}",
                mapping.addr(),
                len,
                mask
            );
            // SAFETY: straight from the backend's alloc, never exposed.
            unsafe { self.backend.free(buf, len, mapping) };
            return Err(DmaError::AddressOutOfRange);
        }
        Ok((buf, mapping))
    }

    unsafe fn free(&self, addr: NonNull<u8>, len: usize, mapping: DmaMapping) {
        self.backend.free(addr, len, mapping);
    }

    fn set_mask(&self, mask: DmaMask) {
        self.backend.set_mask(mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{Arena, FakeIommu, Passthrough};

    #[test]
    fn test_translates_into_window() {
        let arena = Arena::new();
        let iommu = FakeIommu::new(arena.pool(), 0x8000_0000, 4);
        let ops = GenericDma::new(&iommu);

        // Host address far above 4GB, device only reaches 32 bits
        let mapping = ops
            .map(DmaMask::BITS_32, 0x12_3456_7010, 64, DmaDirection::Receive)
            .unwrap();
        assert!(DmaMask::BITS_32.contains_range(mapping.addr(), 64));
        assert_eq!(mapping.addr() & 0xFFF, 0x010);
        assert_eq!(iommu.live(), 1);
        assert_eq!(iommu.last_direction.get(), Some(DmaDirection::Receive));

        ops.unmap(mapping);
        assert_eq!(iommu.live(), 0);
    }

    #[test]
    fn test_exhaustion_propagates() {
        let arena = Arena::new();
        let iommu = FakeIommu::new(arena.pool(), 0x8000_0000, 1);
        let ops = GenericDma::new(&iommu);

        let first = ops
            .map(DmaMask::MAX, 0x1000, 64, DmaDirection::Transmit)
            .unwrap();
        let err = ops
            .map(DmaMask::MAX, 0x2000, 64, DmaDirection::Transmit)
            .unwrap_err();
        assert_eq!(err, DmaError::TranslationExhausted);
        ops.unmap(first);
    }

    #[test]
    fn test_out_of_mask_result_is_rejected_and_released() {
        let arena = Arena::new();
        let backend = Passthrough::new(arena.pool());
        let ops = GenericDma::new(&backend);

        let err = ops
            .map(DmaMask::BITS_32, 0x1_0000_0000, 64, DmaDirection::Transmit)
            .unwrap_err();
        assert_eq!(err, DmaError::AddressOutOfRange);
        assert_eq!(backend.released.get(), 1);
    }

    #[test]
    fn test_out_of_mask_alloc_is_rejected_and_freed() {
        let arena = Arena::new();
        let backend = Passthrough::new(arena.pool());
        let ops = GenericDma::new(&backend);

        // Arena lives on the host heap; a 12-bit mask cannot reach it
        let err = ops.alloc(DmaMask::with_width(12), 256, 64).unwrap_err();
        assert_eq!(err, DmaError::AddressOutOfRange);
        assert_eq!(backend.released.get(), 1);
        assert_eq!(arena.pool().used(), 0);
    }

    #[test]
    fn test_set_mask_reaches_backend() {
        let arena = Arena::new();
        let iommu = FakeIommu::new(arena.pool(), 0x8000_0000, 4);
        let ops = GenericDma::new(&iommu);

        ops.set_mask(DmaMask::with_width(40));
        assert_eq!(iommu.programmed_mask(), DmaMask::with_width(40));
    }
}

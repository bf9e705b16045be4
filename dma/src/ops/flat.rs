//! Flat DMA operations.
//!
//! For platforms where the device sees host physical memory directly. Every
//! call is `#[inline]`, so a device typed over `FlatDma` compiles down to
//! the allocator calls and nothing else.

use core::ptr::NonNull;

use dma_pool::{PhysAllocator, SystemPool};
use log::warn;

use crate::addr::{virt_to_phys, DmaMask, PhysAddr};
use crate::error::{DmaError, Result};
use crate::mapping::{DmaDirection, DmaMapping, DmaToken};
use crate::ops::{private, DmaOps};

/// Identity-mapping operations table.
///
/// Coherent buffers come from `A`, which defaults to the global pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatDma<A = SystemPool> {
    allocator: A,
}

impl<A> FlatDma<A> {
    /// Flat table over the given allocator.
    pub const fn new(allocator: A) -> Self {
        Self { allocator }
    }

    /// The backing allocator.
    pub fn allocator(&self) -> &A {
        &self.allocator
    }
}

impl<A: PhysAllocator> private::Sealed for FlatDma<A> {}

impl<A: PhysAllocator> DmaOps for FlatDma<A> {
    #[inline(always)]
    fn map(
        &self,
        _mask: DmaMask,
        addr: PhysAddr,
        _len: usize,
        _dir: DmaDirection,
    ) -> Result<DmaMapping> {
        // Physical address is the device address
        Ok(DmaMapping::new(addr, DmaToken::NONE))
    }

    #[inline(always)]
    fn unmap(&self, _mapping: DmaMapping) {}

    #[inline]
    fn alloc(&self, _mask: DmaMask, len: usize, align: usize) -> Result<(NonNull<u8>, DmaMapping)> {
        let buf = self.allocator.alloc_phys(len, align).map_err(|e| {
            warn!("flat dma: alloc of {:#x} bytes (align {:#x}) failed: {}", len, align, e);
            DmaError::from(e)
        })?;

        let mapping = DmaMapping::new(virt_to_phys(buf.as_ptr()), DmaToken::NONE);
        Ok((buf, mapping))
    }

    #[inline]
    unsafe fn free(&self, addr: NonNull<u8>, len: usize, _mapping: DmaMapping) {
        self.allocator.free_phys(addr, len);
    }

    #[inline(always)]
    fn set_mask(&self, _mask: DmaMask) {
        // Nothing to reprogram
    }
}

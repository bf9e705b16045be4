//! Test doubles: a private memory arena and two translation backends.

use core::cell::Cell;
use core::ptr::NonNull;

use dma_pool::{DmaPool, MemoryRegion, PhysAllocator};

use crate::addr::{virt_to_phys, DmaMask, PhysAddr};
use crate::error::{DmaError, Result};
use crate::mapping::{DmaDirection, DmaMapping, DmaToken};
use crate::ops::DmaBackend;

#[repr(C, align(4096))]
struct Storage([u8; Arena::SIZE]);

/// Page-aligned heap memory with its own pool, so tests never share state.
pub struct Arena {
    pool: DmaPool,
    // Kept alive for the pool; never touched directly.
    _storage: Box<Storage>,
}

impl Arena {
    pub const SIZE: usize = 256 * 1024;

    pub fn new() -> Self {
        let mut storage = Box::new(Storage([0; Self::SIZE]));
        let pool = DmaPool::new();
        let base = storage.0.as_mut_ptr() as usize;
        unsafe { pool.init(MemoryRegion::new(base, Self::SIZE)) }.unwrap();
        Self {
            pool,
            _storage: storage,
        }
    }

    pub fn pool(&self) -> &DmaPool {
        &self.pool
    }
}

/// IOMMU with a small window of fixed-size translation slots.
///
/// Slot `i` maps device addresses `window + i * SLOT_SIZE ..`. The token is
/// the slot index plus one.
pub struct FakeIommu<'p> {
    pool: &'p DmaPool,
    window: PhysAddr,
    slots: usize,
    used: Cell<u32>,
    mask: Cell<DmaMask>,
    pub last_direction: Cell<Option<DmaDirection>>,
}

impl<'p> FakeIommu<'p> {
    pub const SLOT_SIZE: usize = 0x10_0000;

    pub fn new(pool: &'p DmaPool, window: PhysAddr, slots: usize) -> Self {
        assert!(slots <= 32);
        Self {
            pool,
            window,
            slots,
            used: Cell::new(0),
            mask: Cell::new(DmaMask::MAX),
            last_direction: Cell::new(None),
        }
    }

    /// Translation entries currently live.
    pub fn live(&self) -> u32 {
        self.used.get().count_ones()
    }

    /// Mask last programmed through `set_mask`.
    pub fn programmed_mask(&self) -> DmaMask {
        self.mask.get()
    }

    fn claim(&self, mask: DmaMask, addr: PhysAddr, len: usize) -> Result<DmaMapping> {
        let offset = (addr as usize) & (dma_pool::PAGE_SIZE - 1);
        if offset + len > Self::SLOT_SIZE {
            return Err(DmaError::TranslationExhausted);
        }
        let used = self.used.get();
        let slot = (0..self.slots)
            .find(|i| used & (1 << i) == 0)
            .ok_or(DmaError::TranslationExhausted)?;

        let daddr = self.window + (slot * Self::SLOT_SIZE + offset) as PhysAddr;
        if !mask.contains_range(daddr, len) {
            return Err(DmaError::AddressOutOfRange);
        }
        self.used.set(used | (1 << slot));
        Ok(DmaMapping::new(daddr, DmaToken::new(slot + 1)))
    }

    fn release(&self, mapping: &DmaMapping) {
        let slot = mapping.token().raw() - 1;
        self.used.set(self.used.get() & !(1 << slot));
    }
}

impl DmaBackend for FakeIommu<'_> {
    fn map(
        &self,
        mask: DmaMask,
        addr: PhysAddr,
        len: usize,
        dir: DmaDirection,
    ) -> Result<DmaMapping> {
        self.last_direction.set(Some(dir));
        self.claim(mask, addr, len)
    }

    fn unmap(&self, mapping: DmaMapping) {
        self.release(&mapping);
    }

    fn alloc(&self, mask: DmaMask, len: usize, align: usize) -> Result<(NonNull<u8>, DmaMapping)> {
        let buf = self.pool.alloc_phys(len, align)?;
        match self.claim(mask, virt_to_phys(buf.as_ptr()), len) {
            Ok(mapping) => Ok((buf, mapping)),
            Err(e) => {
                unsafe { self.pool.free_phys(buf, len) };
                Err(e)
            }
        }
    }

    unsafe fn free(&self, addr: NonNull<u8>, len: usize, mapping: DmaMapping) {
        self.release(&mapping);
        self.pool.free_phys(addr, len);
    }

    fn set_mask(&self, mask: DmaMask) {
        self.mask.set(mask);
    }
}

/// Misbehaving backend that hands back untranslated addresses regardless
/// of the mask.
pub struct Passthrough<'p> {
    pool: &'p DmaPool,
    pub released: Cell<usize>,
}

impl<'p> Passthrough<'p> {
    pub fn new(pool: &'p DmaPool) -> Self {
        Self {
            pool,
            released: Cell::new(0),
        }
    }
}

impl DmaBackend for Passthrough<'_> {
    fn map(&self, _: DmaMask, addr: PhysAddr, _: usize, _: DmaDirection) -> Result<DmaMapping> {
        Ok(DmaMapping::new(addr, DmaToken::NONE))
    }

    fn unmap(&self, _mapping: DmaMapping) {
        self.released.set(self.released.get() + 1);
    }

    fn alloc(&self, _: DmaMask, len: usize, align: usize) -> Result<(NonNull<u8>, DmaMapping)> {
        let buf = self.pool.alloc_phys(len, align)?;
        Ok((buf, DmaMapping::new(virt_to_phys(buf.as_ptr()), DmaToken::NONE)))
    }

    unsafe fn free(&self, addr: NonNull<u8>, len: usize, _mapping: DmaMapping) {
        self.released.set(self.released.get() + 1);
        self.pool.free_phys(addr, len);
    }

    fn set_mask(&self, _: DmaMask) {}
}

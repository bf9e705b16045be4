//! DMA-capable device context.
//!
//! A [`DmaDevice`] binds one driver instance to one operations table and
//! tracks the device's addressable range. Drivers go through it for every
//! map/alloc and the matching unmap/free.

use core::ptr::NonNull;

use log::{debug, error, trace, warn};

use crate::accounting::DmaObserver;
use crate::addr::{DmaMask, PhysAddr};
use crate::error::{DmaError, ReleaseError, ReleaseResult, Result};
use crate::mapping::{DmaDirection, DmaMapping, MappingKind};
use crate::ops::DmaOps;

/// A DMA-capable device.
///
/// `O` picks the dispatch path. With a concrete table such as
/// [`FlatDma`](crate::FlatDma) every call is resolved statically; with the
/// default `dyn DmaOps` the table is chosen at runtime per device.
///
/// The table is shared, never owned. Records produced through this device
/// remember which table made them and are refused if released through
/// any other table (or through the wrong release call). A refused record is
/// returned in the [`ReleaseError`] and nothing is released.
pub struct DmaDevice<'a, O: ?Sized + DmaOps = dyn DmaOps + 'a> {
    ops: &'a O,
    mask: DmaMask,
    observer: Option<&'a dyn DmaObserver>,
}

impl<'a, O: ?Sized + DmaOps> DmaDevice<'a, O> {
    /// Bind a device to an operations table, with the full address mask.
    pub fn new(ops: &'a O) -> Self {
        Self {
            ops,
            mask: DmaMask::MAX,
            observer: None,
        }
    }

    /// Re-bind to a different table.
    ///
    /// The current mask is programmed into the new table. Records still
    /// outstanding against the old table can no longer be released here.
    pub fn init(&mut self, ops: &'a O) {
        self.ops = ops;
        self.ops.set_mask(self.mask);
        debug!("dma: device re-initialized, mask {:?}", self.mask);
    }

    /// Attach an accounting observer.
    pub fn with_observer(mut self, observer: &'a dyn DmaObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn set_observer(&mut self, observer: Option<&'a dyn DmaObserver>) {
        self.observer = observer;
    }

    /// The installed operations table.
    #[inline]
    pub fn ops(&self) -> &'a O {
        self.ops
    }

    /// Current addressable-range mask.
    #[inline]
    pub fn mask(&self) -> DmaMask {
        self.mask
    }

    /// Check whether the device can reach `[addr, addr + len)` untranslated.
    #[inline]
    pub fn is_addressable(&self, addr: PhysAddr, len: usize) -> bool {
        self.mask.contains_range(addr, len)
    }

    /// Set the addressable-range mask and reprogram the table.
    pub fn set_mask(&mut self, mask: DmaMask) {
        self.mask = mask;
        self.ops.set_mask(mask);
        debug!("dma: mask set to {:?}", mask);
    }

    /// Device can address all of host memory.
    #[inline]
    pub fn set_mask_max(&mut self) {
        self.set_mask(DmaMask::MAX);
    }

    /// Map `len` bytes at `addr` for a transfer in `dir`.
    ///
    /// Zero-length requests are rejected with [`DmaError::ZeroLength`].
    pub fn map(&self, addr: PhysAddr, len: usize, dir: DmaDirection) -> Result<DmaMapping> {
        if len == 0 {
            return Err(DmaError::ZeroLength);
        }

        let mut mapping = self
            .ops
            .map(self.mask, addr, len, dir)
            .map_err(|e| {
                warn!("dma: map {:#x}+{:#x} {:?} failed: {}", addr, len, dir, e);
                e
            })?;
        self.stamp(&mut mapping, MappingKind::Streaming);

        if let Some(observer) = self.observer {
            observer.mapped(&mapping, len);
        }
        trace!("dma: map {:#x}+{:#x} {:?} -> {:#x}", addr, len, dir, mapping.addr());
        Ok(mapping)
    }

    /// Release a mapping produced by [`map`](Self::map) on this device.
    pub fn unmap(&self, mapping: DmaMapping) -> ReleaseResult {
        let mapping = self.check_owner(mapping, MappingKind::Streaming)?;

        if let Some(observer) = self.observer {
            observer.unmapped(&mapping);
        }
        trace!("dma: unmap {:#x}", mapping.addr());
        self.ops.unmap(mapping);
        Ok(())
    }

    /// Allocate and map a coherent buffer.
    ///
    /// `align` must be a power of two; zero-length requests are rejected
    /// with [`DmaError::ZeroLength`].
    pub fn alloc(&self, len: usize, align: usize) -> Result<(NonNull<u8>, DmaMapping)> {
        if len == 0 {
            return Err(DmaError::ZeroLength);
        }
        if !align.is_power_of_two() {
            return Err(DmaError::InvalidAlignment);
        }

        let (buf, mut mapping) = self.ops.alloc(self.mask, len, align).map_err(|e| {
            warn!("dma: alloc {:#x} (align {:#x}) failed: {}", len, align, e);
            e
        })?;
        self.stamp(&mut mapping, MappingKind::Coherent);

        if let Some(observer) = self.observer {
            observer.allocated(&mapping, len);
        }
        trace!("dma: alloc {:#x} at {:p} -> {:#x}", len, buf.as_ptr(), mapping.addr());
        Ok((buf, mapping))
    }

    /// Unmap and free a coherent buffer.
    ///
    /// # Safety
    ///
    /// `addr` and `len` must be the buffer and length from the
    /// [`alloc`](Self::alloc) call that produced `mapping`, and the buffer
    /// must not be touched afterwards.
    pub unsafe fn free(&self, addr: NonNull<u8>, len: usize, mapping: DmaMapping) -> ReleaseResult {
        let mapping = self.check_owner(mapping, MappingKind::Coherent)?;

        if let Some(observer) = self.observer {
            observer.freed(&mapping, len);
        }
        trace!("dma: free {:#x} at {:p}", len, addr.as_ptr());
        self.ops.free(addr, len, mapping);
        Ok(())
    }

    fn ops_id(&self) -> usize {
        self.ops as *const O as *const () as usize
    }

    fn stamp(&self, mapping: &mut DmaMapping, kind: MappingKind) {
        mapping.origin = self.ops_id();
        mapping.kind = kind;
    }

    /// Hands the record back, unforwarded, when it belongs elsewhere.
    fn check_owner(
        &self,
        mapping: DmaMapping,
        kind: MappingKind,
    ) -> core::result::Result<DmaMapping, ReleaseError> {
        if mapping.origin != self.ops_id() || mapping.kind != kind {
            error!(
                "dma: refusing {:?} release of {:?} (wrong table or release call)",
                kind, mapping
            );
            return Err(ReleaseError::new(mapping));
        }
        Ok(mapping)
    }
}

impl<O: ?Sized + DmaOps> core::fmt::Debug for DmaDevice<'_, O> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DmaDevice")
            .field("ops", &format_args!("{:#x}", self.ops_id()))
            .field("mask", &self.mask)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

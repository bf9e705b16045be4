//! DMA operations tables.
//!
//! [`DmaOps`] is the capability set a [`DmaDevice`](crate::DmaDevice)
//! calls into. Two implementations exist:
//!
//! - [`FlatDma`]: no translation, device address == physical address
//! - [`GenericDma`]: forwards to a platform [`DmaBackend`] (IOMMU, bounce
//!   buffers) and polices the device mask on what it returns
//!
//! Tables are immutable and carry no per-device state, so one table can be
//! shared by any number of devices. The device passes its current mask into
//! every call.
//!
//! The set is closed. Platforms plug in by implementing [`DmaBackend`]
//! and wrapping it in [`GenericDma`], which keeps the mask check in place.

pub mod flat;
pub mod generic;

pub use flat::FlatDma;
pub use generic::{DmaBackend, GenericDma};

use core::ptr::NonNull;

use crate::addr::{DmaMask, PhysAddr};
use crate::error::Result;
use crate::mapping::{DmaDirection, DmaMapping};

mod private {
    /// Keeps `DmaOps` implementations inside this crate.
    pub trait Sealed {}
}

/// DMA operations table.
pub trait DmaOps: private::Sealed {
    /// Map `len` bytes at physical address `addr` for a transfer in `dir`.
    fn map(&self, mask: DmaMask, addr: PhysAddr, len: usize, dir: DmaDirection)
        -> Result<DmaMapping>;

    /// Tear down a mapping produced by [`map`](Self::map).
    fn unmap(&self, mapping: DmaMapping);

    /// Allocate and map a coherent buffer of `len` bytes aligned to `align`.
    ///
    /// Returns the CPU pointer to the buffer and its mapping.
    fn alloc(&self, mask: DmaMask, len: usize, align: usize) -> Result<(NonNull<u8>, DmaMapping)>;

    /// Unmap and free a coherent buffer.
    ///
    /// # Safety
    ///
    /// `addr`, `len` and `mapping` must come from one [`alloc`](Self::alloc)
    /// call on this table, and the buffer must not be used afterwards.
    unsafe fn free(&self, addr: NonNull<u8>, len: usize, mapping: DmaMapping);

    /// Reprogram translation hardware for a new device mask.
    fn set_mask(&self, mask: DmaMask);
}

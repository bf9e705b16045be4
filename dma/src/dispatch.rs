//! Build-time dispatch selection.
//!
//! Subsystems name their device type through [`PlatformDevice`]. With the
//! `flat` feature it is monomorphized over the flat table, so every DMA call
//! inlines to an allocator call or nothing. Without it, devices hold a
//! `&dyn DmaOps` and each one can run on a different table (flat for some,
//! an IOMMU-backed [`GenericDma`](crate::GenericDma) for others).
//!
//! Callers write the same code either way:
//!
//! ```ignore
//! let dev = PlatformDevice::new(&FLAT_DMA);
//! ```

use dma_pool::SystemPool;

use crate::device::DmaDevice;
use crate::ops::FlatDma;

/// Flat table over the global DMA pool, shared by every device.
pub static FLAT_DMA: FlatDma<SystemPool> = FlatDma::new(SystemPool);

/// Device type used by subsystems, fixed at build time.
#[cfg(feature = "flat")]
pub type PlatformDevice<'a> = DmaDevice<'a, FlatDma<SystemPool>>;

/// Device type used by subsystems, fixed at build time.
#[cfg(not(feature = "flat"))]
pub type PlatformDevice<'a> = DmaDevice<'a, dyn crate::ops::DmaOps + 'a>;

//! DMA Mapping Layer
//!
//! Gives bus-attached drivers one contract for moving data between host
//! memory and devices, whether or not the platform translates addresses.
//!
//! # Architecture
//!
//! ```text
//!   driver
//!     │  map / unmap / alloc / free / set_mask
//!     ▼
//! ┌──────────────────────────────────────────────┐
//! │ DmaDevice<'a, O>                             │
//! │   ops: &'a O   mask: DmaMask   observer      │
//! └──────────────────────────────────────────────┘
//!     │                              │
//!     ▼ O = FlatDma (inlined)        ▼ O = dyn DmaOps
//! ┌──────────────┐            ┌──────────────────┐
//! │ FlatDma<A>   │            │ GenericDma<'b>   │
//! │ identity map │            │ mask enforcement │
//! └──────────────┘            └──────────────────┘
//!     │                              │
//!     ▼                              ▼
//!   PhysAllocator (dma-pool)     DmaBackend (IOMMU, bounce buffers)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use morpheus_dma::{DmaDevice, DmaDirection, FLAT_DMA};
//!
//! dma_pool::SystemPool::init_static();
//!
//! let mut dev = DmaDevice::new(&FLAT_DMA);
//! dev.set_mask(DmaMask::BITS_32);
//!
//! let mapping = dev.map(tx_addr, tx_len, DmaDirection::Transmit)?;
//! nic.post_tx(mapping.addr(), tx_len);
//! // ... completion ...
//! // Only refused for records made through another table
//! dev.unmap(mapping).map_err(|refused| refused.kind())?;
//! ```
//!
//! # What This Crate Does NOT Do
//!
//! - Scatter-gather descriptor lists
//! - Cache maintenance (belongs to the backend)
//! - General-purpose heap allocation

#![cfg_attr(not(test), no_std)]

pub mod accounting;
pub mod addr;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod iobuf;
pub mod mapping;
pub mod ops;

#[cfg(test)]
mod fake;

// ═══════════════════════════════════════════════════════════════════════════
// RE-EXPORTS
// ═══════════════════════════════════════════════════════════════════════════

pub use accounting::{DmaAccounting, DmaObserver};
pub use addr::{virt_to_phys, DmaMask, PhysAddr};
pub use device::DmaDevice;
pub use dispatch::{PlatformDevice, FLAT_DMA};
pub use error::{DmaError, ReleaseError, ReleaseResult, Result};
pub use iobuf::{DataBuffer, IoBuffer};
pub use mapping::{DmaDirection, DmaMapping, DmaToken};
pub use ops::{DmaBackend, DmaOps, FlatDma, GenericDma};

pub use dma_pool::{PhysAllocator, SystemPool};

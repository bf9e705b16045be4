//! Mapping records and transfer direction.
//!
//! # Record Lifecycle
//! ```text
//!   map() ──> DmaMapping (streaming) ──unmap()──> consumed
//!   alloc() ─> DmaMapping (coherent) ───free()──> consumed
//! ```
//!
//! A record is move-only. Release takes it by value, so a record cannot be
//! released twice or used after release.

use core::fmt;

use crate::addr::PhysAddr;

/// Which way data flows during a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaDirection {
    /// Device reads host memory.
    Transmit,
    /// Device writes host memory.
    Receive,
    /// Device both reads and writes host memory.
    Bidirectional,
}

impl DmaDirection {
    /// Flag bits: TX = 0x01, RX = 0x02, BI = TX | RX.
    #[inline]
    pub const fn bits(self) -> u8 {
        match self {
            Self::Transmit => 0x01,
            Self::Receive => 0x02,
            Self::Bidirectional => 0x03,
        }
    }

    /// Device reads from host memory (host must flush before submit).
    #[inline]
    pub const fn device_reads(self) -> bool {
        self.bits() & 0x01 != 0
    }

    /// Device writes to host memory (host must invalidate / copy back after).
    #[inline]
    pub const fn device_writes(self) -> bool {
        self.bits() & 0x02 != 0
    }
}

/// Opaque, implementation-owned mapping state.
///
/// Only the table that produced a token may interpret it. Backends pack
/// whatever they need to undo the mapping into it (IOMMU entry index,
/// bounce buffer slot, copy-back direction, ...).
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct DmaToken(usize);

impl DmaToken {
    /// Empty token, used by tables that keep no per-mapping state.
    pub const NONE: Self = Self(0);

    /// Wrap backend state.
    #[inline]
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Backend state, for the producing backend only.
    #[inline]
    pub const fn raw(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for DmaToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DmaToken({:#x})", self.0)
    }
}

/// Which release call a record expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MappingKind {
    Streaming,
    Coherent,
}

/// One active DMA mapping.
#[must_use = "a DMA mapping must be released with unmap() or free()"]
pub struct DmaMapping {
    addr: PhysAddr,
    token: DmaToken,
    /// Identity of the table that produced the record, stamped by the device.
    pub(crate) origin: usize,
    pub(crate) kind: MappingKind,
}

impl DmaMapping {
    /// Create a record. Called by operations tables and backends.
    #[inline]
    pub const fn new(addr: PhysAddr, token: DmaToken) -> Self {
        Self {
            addr,
            token,
            origin: 0,
            kind: MappingKind::Streaming,
        }
    }

    /// Address the device hardware should use.
    #[inline]
    pub const fn addr(&self) -> PhysAddr {
        self.addr
    }

    /// Implementation-owned token.
    #[inline]
    pub const fn token(&self) -> DmaToken {
        self.token
    }

    /// Device address of byte `offset` within the mapped range.
    ///
    /// Wraps around the top of the address space; offsets inside the mapped
    /// length never do.
    #[inline]
    pub const fn addr_at(&self, offset: usize) -> PhysAddr {
        self.addr.wrapping_add(offset as PhysAddr)
    }
}

impl fmt::Debug for DmaMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmaMapping")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("token", &self.token)
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_bits() {
        assert_eq!(DmaDirection::Transmit.bits(), 0x01);
        assert_eq!(DmaDirection::Receive.bits(), 0x02);
        assert_eq!(
            DmaDirection::Bidirectional.bits(),
            DmaDirection::Transmit.bits() | DmaDirection::Receive.bits()
        );
        assert!(DmaDirection::Transmit.device_reads());
        assert!(!DmaDirection::Transmit.device_writes());
        assert!(DmaDirection::Receive.device_writes());
        assert!(DmaDirection::Bidirectional.device_reads());
        assert!(DmaDirection::Bidirectional.device_writes());
    }

    #[test]
    fn test_record_offsets() {
        let mapping = DmaMapping::new(0x4000, DmaToken::new(7));
        assert_eq!(mapping.addr_at(0x10), 0x4010);
        assert_eq!(mapping.token().raw(), 7);
        assert!(DmaToken::NONE.is_none());

        let top = DmaMapping::new(PhysAddr::MAX, DmaToken::NONE);
        assert_eq!(top.addr_at(0), PhysAddr::MAX);
        assert_eq!(top.addr_at(1), 0);
    }
}

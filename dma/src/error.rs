//! DMA error types

use core::fmt;

use dma_pool::PoolError;

use crate::mapping::DmaMapping;

pub type Result<T> = core::result::Result<T, DmaError>;

/// Result of a release call. A refused record comes back in the error.
pub type ReleaseResult<B = ()> = core::result::Result<(), ReleaseError<B>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaError {
    /// No memory available for a coherent buffer.
    AllocationFailed,
    /// Device address would fall outside the device's mask.
    AddressOutOfRange,
    /// Backend has no free translation slots or bounce buffers.
    TranslationExhausted,
    /// Map or alloc requested with a length of zero.
    ZeroLength,
    /// Alloc alignment is not a power of two.
    InvalidAlignment,
    /// Mapping released through a different table, or through the wrong call.
    ForeignMapping,
}

impl fmt::Display for DmaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed => write!(f, "DMA buffer allocation failed"),
            Self::AddressOutOfRange => write!(f, "Address out of device DMA range"),
            Self::TranslationExhausted => write!(f, "No DMA translation entries left"),
            Self::ZeroLength => write!(f, "Zero-length DMA request"),
            Self::InvalidAlignment => write!(f, "DMA alignment is not a power of two"),
            Self::ForeignMapping => write!(f, "DMA mapping does not belong to this device"),
        }
    }
}

impl From<PoolError> for DmaError {
    fn from(_: PoolError) -> Self {
        Self::AllocationFailed
    }
}

/// A release the device refused.
///
/// The record (and, for buffer wrappers, the buffer) is handed back
/// untouched, so the caller can still release it through the device or call
/// that owns it. Dropping it leaks whatever the backend holds for it.
#[must_use = "a refused DMA mapping must still be released"]
#[derive(Debug)]
pub struct ReleaseError<B = ()> {
    mapping: DmaMapping,
    buffer: B,
}

impl ReleaseError {
    pub(crate) fn new(mapping: DmaMapping) -> Self {
        Self {
            mapping,
            buffer: (),
        }
    }

    /// Attach the buffer that belongs to the refused record.
    pub(crate) fn with_buffer<B>(self, buffer: B) -> ReleaseError<B> {
        ReleaseError {
            mapping: self.mapping,
            buffer,
        }
    }

    /// Take back the refused record.
    pub fn into_mapping(self) -> DmaMapping {
        self.mapping
    }
}

impl<B> ReleaseError<B> {
    /// Why the release was refused.
    pub fn kind(&self) -> DmaError {
        DmaError::ForeignMapping
    }

    /// The refused record.
    pub fn mapping(&self) -> &DmaMapping {
        &self.mapping
    }

    /// Take back the buffer and its record.
    pub fn into_parts(self) -> (B, DmaMapping) {
        (self.buffer, self.mapping)
    }
}

impl<B> fmt::Display for ReleaseError<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#x})", self.kind(), self.mapping.addr())
    }
}

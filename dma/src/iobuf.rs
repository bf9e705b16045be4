//! I/O buffer helpers for the common transmit and receive cases.
//!
//! # Receive Flow
//! ```text
//!   alloc_inbound(len) ──> (IoBuffer [empty, capacity = len], mapping)
//!        │
//!        ▼  post mapping.addr() to the RX ring, device writes
//!   buf.put(received)  ──> buf.as_slice() holds the frame
//!        │
//!        ▼
//!   free_inbound(buf, mapping)
//! ```

use core::ptr::NonNull;
use core::slice;

use dma_pool::PAGE_SIZE;

use crate::addr::virt_to_phys;
use crate::device::DmaDevice;
use crate::error::{ReleaseResult, Result};
use crate::mapping::{DmaDirection, DmaMapping};
use crate::ops::DmaOps;

/// Anything that exposes a contiguous run of bytes to transmit.
pub trait DataBuffer {
    /// The bytes the device should read.
    fn data(&self) -> &[u8];
}

impl DataBuffer for [u8] {
    fn data(&self) -> &[u8] {
        self
    }
}

impl<const N: usize> DataBuffer for [u8; N] {
    fn data(&self) -> &[u8] {
        self
    }
}

/// A coherent DMA buffer with a fill level.
///
/// Bytes `[0, len)` are data; `[len, capacity)` is tailroom the device may
/// write into. Does not free itself: hand it back with
/// [`DmaDevice::free_inbound`].
#[must_use = "an IoBuffer must be released with free_inbound()"]
pub struct IoBuffer {
    ptr: NonNull<u8>,
    len: usize,
    capacity: usize,
}

impl IoBuffer {
    /// Wrap raw memory as an empty buffer.
    ///
    /// # Safety
    /// - `ptr` must be valid for reads and writes of `capacity` bytes
    /// - Nothing else may access that memory while the buffer exists
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, capacity: usize) -> Self {
        Self {
            ptr,
            len: 0,
            capacity,
        }
    }

    /// CPU pointer to the start of the buffer.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Data length.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes left after the data.
    #[inline]
    pub fn tailroom(&self) -> usize {
        self.capacity - self.len
    }

    /// Data as slice.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Data as mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Grow the data by `n` bytes, returning the newly covered region.
    ///
    /// # Panics
    /// Panics if `n` exceeds the tailroom.
    pub fn put(&mut self, n: usize) -> &mut [u8] {
        assert!(n <= self.tailroom(), "put of {} bytes exceeds tailroom", n);
        let start = self.len;
        self.len += n;
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr().add(start), n) }
    }

    /// Drop all data, keeping the memory.
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl DataBuffer for IoBuffer {
    fn data(&self) -> &[u8] {
        self.as_slice()
    }
}

impl core::fmt::Debug for IoBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IoBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}

// SAFETY: the buffer exclusively owns its memory.
unsafe impl Send for IoBuffer {}

/// Alignment for receive buffers: own size rounded up to a power of two,
/// capped at a page, so small buffers never straddle a page boundary.
pub fn inbound_align(len: usize) -> usize {
    // Clamp first: rounding a huge length up would overflow
    len.clamp(1, PAGE_SIZE).next_power_of_two()
}

impl<'a, O: ?Sized + DmaOps> DmaDevice<'a, O> {
    /// Map a buffer's data for transmission to the device.
    pub fn map_outbound<B: DataBuffer + ?Sized>(&self, buf: &B) -> Result<DmaMapping> {
        let data = buf.data();
        self.map(virt_to_phys(data.as_ptr()), data.len(), DmaDirection::Transmit)
    }

    /// Allocate an empty coherent buffer of `len` bytes for the device to
    /// receive into.
    pub fn alloc_inbound(&self, len: usize) -> Result<(IoBuffer, DmaMapping)> {
        let (ptr, mapping) = self.alloc(len, inbound_align(len))?;
        // SAFETY: fresh allocation of exactly `len` bytes, owned by nobody else.
        let buf = unsafe { IoBuffer::from_raw_parts(ptr, len) };
        Ok((buf, mapping))
    }

    /// Release a buffer from [`alloc_inbound`](Self::alloc_inbound).
    ///
    /// # Safety
    ///
    /// `buf` and `mapping` must come from the same `alloc_inbound` call,
    /// and the device must be done writing to the buffer. If the device
    /// refuses the record, both come back in the error.
    pub unsafe fn free_inbound(&self, buf: IoBuffer, mapping: DmaMapping) -> ReleaseResult<IoBuffer> {
        self.free(buf.ptr, buf.capacity, mapping)
            .map_err(|e| e.with_buffer(buf))
    }
}

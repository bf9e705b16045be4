//! Physical memory pool for coherent DMA buffers.
//!
//! This crate owns the memory that coherent DMA allocations are carved from.
//! It knows nothing about devices, masks or translation; the mapping layer
//! talks to it only through the [`PhysAllocator`] trait.
//!
//! # Memory Sources
//!
//! 1. **Static pool**: 2MB of page-aligned storage compiled into the image
//! 2. **External**: caller provides a region (e.g. reserved by firmware)
//! 3. **Local**: any [`DmaPool`] value initialized over a caller region
//!
//! # Usage
//!
//! ```ignore
//! use dma_pool::{PhysAllocator, SystemPool};
//!
//! SystemPool::init_static();
//!
//! let buf = SystemPool.alloc_phys(4096, 4096)?;
//! // ... hand the buffer to a device ...
//! unsafe { SystemPool.free_phys(buf, 4096) };
//! ```

#![cfg_attr(not(test), no_std)]

use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};

use linked_list_allocator::Heap;
use spin::Mutex;

/// Page size (4KB).
pub const PAGE_SIZE: usize = 4096;

/// Built-in static pool size (2MB).
pub const DEFAULT_POOL_SIZE: usize = 2 * 1024 * 1024;

/// Minimum usable pool region (64KB).
pub const MIN_REGION_SIZE: usize = 64 * 1024;

// ============================================================================
// Utility functions
// ============================================================================

/// Align a value up to the given power-of-two alignment.
#[inline]
pub const fn align_up(val: usize, align: usize) -> usize {
    (val + align - 1) & !(align - 1)
}

/// Align a value down to the given power-of-two alignment.
#[inline]
pub const fn align_down(val: usize, align: usize) -> usize {
    val & !(align - 1)
}

/// Check whether `val` is a multiple of the power-of-two `align`.
#[inline]
pub const fn is_aligned(val: usize, align: usize) -> bool {
    val & (align - 1) == 0
}

// ============================================================================
// Memory region
// ============================================================================

/// A memory region handed to a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Base address (physical = virtual in identity mapping).
    pub base: usize,
    /// Size in bytes.
    pub size: usize,
}

impl MemoryRegion {
    /// Create a new memory region.
    pub const fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    /// Page-aligned subset of this region.
    pub fn aligned(&self) -> Self {
        let aligned_base = align_up(self.base, PAGE_SIZE);
        let adjustment = aligned_base - self.base;
        let aligned_size = align_down(self.size.saturating_sub(adjustment), PAGE_SIZE);
        Self {
            base: aligned_base,
            size: aligned_size,
        }
    }

    /// Check if region can back a pool (non-null, page-aligned, large enough).
    pub fn is_usable(&self) -> bool {
        self.base != 0 && is_aligned(self.base, PAGE_SIZE) && self.size >= MIN_REGION_SIZE
    }
}

// ============================================================================
// Error types
// ============================================================================

/// Pool errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// Pool not initialized.
    NotInitialized,
    /// Pool already initialized.
    AlreadyInitialized,
    /// Requested 0 bytes.
    ZeroLength,
    /// Alignment is not a power of two, or size overflows with it.
    InvalidLayout,
    /// Not enough contiguous memory left.
    OutOfMemory,
    /// Region too small, misaligned or null.
    InvalidRegion,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "DMA pool not initialized"),
            Self::AlreadyInitialized => write!(f, "DMA pool already initialized"),
            Self::ZeroLength => write!(f, "Zero-length allocation"),
            Self::InvalidLayout => write!(f, "Invalid size/alignment"),
            Self::OutOfMemory => write!(f, "DMA pool exhausted"),
            Self::InvalidRegion => write!(f, "Unusable memory region"),
        }
    }
}

/// Result type for pool operations.
pub type Result<T> = core::result::Result<T, PoolError>;

// ============================================================================
// Allocator interface
// ============================================================================

/// Source of physically contiguous, identity-mapped memory.
///
/// This is the only thing the DMA mapping layer needs from a memory manager.
pub trait PhysAllocator {
    /// Allocate `len` bytes aligned to `align` (a power of two).
    ///
    /// Returned memory is zeroed.
    fn alloc_phys(&self, len: usize, align: usize) -> Result<NonNull<u8>>;

    /// Return memory obtained from [`alloc_phys`](Self::alloc_phys).
    ///
    /// # Safety
    ///
    /// `ptr` must come from `alloc_phys` on this allocator with the same
    /// `len`, and must not be used afterwards.
    unsafe fn free_phys(&self, ptr: NonNull<u8>, len: usize);
}

impl<A: PhysAllocator + ?Sized> PhysAllocator for &A {
    #[inline]
    fn alloc_phys(&self, len: usize, align: usize) -> Result<NonNull<u8>> {
        (**self).alloc_phys(len, align)
    }

    #[inline]
    unsafe fn free_phys(&self, ptr: NonNull<u8>, len: usize) {
        (**self).free_phys(ptr, len)
    }
}

// ============================================================================
// DmaPool
// ============================================================================

/// First-fit pool over one contiguous region.
///
/// Unlike a bump allocator, freed buffers go back into the hole list and
/// are reused by later allocations of the same size.
pub struct DmaPool {
    heap: Mutex<Heap>,
    initialized: AtomicBool,
}

impl DmaPool {
    /// Create an empty pool. Allocations fail until [`init`](Self::init).
    pub const fn new() -> Self {
        Self {
            heap: Mutex::new(Heap::empty()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Hand a region to the pool.
    ///
    /// # Safety
    ///
    /// - The region must be identity-mapped (phys == virt) and DMA-capable.
    /// - The region must not be used by anything else.
    /// - The region must outlive every allocation made from the pool.
    pub unsafe fn init(&self, region: MemoryRegion) -> Result<()> {
        let aligned = region.aligned();
        if !aligned.is_usable() {
            return Err(PoolError::InvalidRegion);
        }

        let mut heap = self.heap.lock();
        if self.initialized.load(Ordering::Acquire) {
            return Err(PoolError::AlreadyInitialized);
        }
        heap.init(aligned.base as *mut u8, aligned.size);
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Check if the pool has a region.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Allocate `len` zeroed bytes aligned to `align`.
    pub fn alloc(&self, len: usize, align: usize) -> Result<NonNull<u8>> {
        if !self.is_initialized() {
            return Err(PoolError::NotInitialized);
        }
        if len == 0 {
            return Err(PoolError::ZeroLength);
        }
        let layout = Layout::from_size_align(len, align).map_err(|_| PoolError::InvalidLayout)?;

        let ptr = self
            .heap
            .lock()
            .allocate_first_fit(layout)
            .map_err(|_| PoolError::OutOfMemory)?;

        // SAFETY: the heap just handed out `len` bytes at `ptr`.
        unsafe {
            core::ptr::write_bytes(ptr.as_ptr(), 0, len);
        }
        Ok(ptr)
    }

    /// Return a buffer to the pool.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`alloc`](Self::alloc) on this pool
    /// with the same `len`.
    pub unsafe fn dealloc(&self, ptr: NonNull<u8>, len: usize) {
        // The hole list only looks at the size; alignment 1 always forms a
        // valid layout for a size that was accepted by `alloc`.
        if let Ok(layout) = Layout::from_size_align(len, 1) {
            self.heap.lock().deallocate(ptr, layout);
        }
    }

    /// Total pool size in bytes.
    pub fn total_size(&self) -> usize {
        self.heap.lock().size()
    }

    /// Bytes currently handed out (including allocator rounding).
    pub fn used(&self) -> usize {
        self.heap.lock().used()
    }

    /// Bytes still available.
    pub fn free_space(&self) -> usize {
        self.heap.lock().free()
    }
}

impl Default for DmaPool {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysAllocator for DmaPool {
    #[inline]
    fn alloc_phys(&self, len: usize, align: usize) -> Result<NonNull<u8>> {
        self.alloc(len, align)
    }

    #[inline]
    unsafe fn free_phys(&self, ptr: NonNull<u8>, len: usize) {
        self.dealloc(ptr, len)
    }
}

// ============================================================================
// Global pool
// ============================================================================

/// Page-aligned static storage.
#[repr(C, align(4096))]
struct StaticStorage {
    data: [u8; DEFAULT_POOL_SIZE],
}

static mut STATIC_STORAGE: StaticStorage = StaticStorage {
    data: [0u8; DEFAULT_POOL_SIZE],
};

static SYSTEM: DmaPool = DmaPool::new();

/// Handle to the global DMA pool shared by all drivers.
///
/// Zero-sized, so tables built over it cost nothing to copy or embed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPool;

impl SystemPool {
    /// Initialize with the built-in static storage.
    ///
    /// Safe to call multiple times (subsequent calls are no-ops).
    pub fn init_static() {
        if SYSTEM.is_initialized() {
            return;
        }
        // SAFETY: the storage is private to this crate and only handed out once;
        // a racing second caller gets AlreadyInitialized and is ignored.
        unsafe {
            let base = core::ptr::addr_of_mut!(STATIC_STORAGE) as usize;
            let _ = SYSTEM.init(MemoryRegion::new(base, DEFAULT_POOL_SIZE));
        }
    }

    /// Initialize with an externally provided region.
    ///
    /// # Safety
    ///
    /// Same requirements as [`DmaPool::init`]; additionally the region must
    /// remain valid for the lifetime of the program.
    pub unsafe fn init_external(base: usize, size: usize) -> Result<()> {
        SYSTEM.init(MemoryRegion::new(base, size))
    }

    /// Check if the global pool is initialized.
    #[inline]
    pub fn is_initialized() -> bool {
        SYSTEM.is_initialized()
    }

    /// The global pool itself.
    #[inline]
    pub fn pool() -> &'static DmaPool {
        &SYSTEM
    }
}

impl PhysAllocator for SystemPool {
    #[inline]
    fn alloc_phys(&self, len: usize, align: usize) -> Result<NonNull<u8>> {
        SYSTEM.alloc(len, align)
    }

    #[inline]
    unsafe fn free_phys(&self, ptr: NonNull<u8>, len: usize) {
        SYSTEM.dealloc(ptr, len)
    }
}

// ============================================================================
// Tests
// ============================================================================

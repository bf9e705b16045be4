//! Outstanding-mapping accounting.
//!
//! Devices report every successful map/alloc and every release to an
//! optional [`DmaObserver`]. [`DmaAccounting`] turns those events into two
//! counters that drop back to zero once a driver has released everything,
//! which makes leaks visible at driver shutdown.
//!
//! Counters are diagnostic only. Nothing in the mapping path reads them.

use core::cell::Cell;

use log::warn;

use crate::mapping::DmaMapping;

/// Instrumentation hook called by [`DmaDevice`](crate::DmaDevice).
///
/// All methods default to no-ops.
pub trait DmaObserver {
    /// A streaming mapping was created.
    fn mapped(&self, _mapping: &DmaMapping, _len: usize) {}

    /// A streaming mapping was released.
    fn unmapped(&self, _mapping: &DmaMapping) {}

    /// A coherent buffer was allocated.
    fn allocated(&self, _mapping: &DmaMapping, _len: usize) {}

    /// A coherent buffer was freed.
    fn freed(&self, _mapping: &DmaMapping, _len: usize) {}
}

/// Counts outstanding mappings and allocations.
///
/// Uses plain cells: a device and its observer belong to one thread of
/// control.
#[derive(Debug, Default)]
pub struct DmaAccounting {
    mapped: Cell<usize>,
    allocated: Cell<usize>,
}

impl DmaAccounting {
    pub const fn new() -> Self {
        Self {
            mapped: Cell::new(0),
            allocated: Cell::new(0),
        }
    }

    /// Streaming mappings not yet unmapped.
    #[inline]
    pub fn mapped_count(&self) -> usize {
        self.mapped.get()
    }

    /// Coherent buffers not yet freed.
    #[inline]
    pub fn allocated_count(&self) -> usize {
        self.allocated.get()
    }

    /// Nothing outstanding.
    pub fn is_idle(&self) -> bool {
        self.mapped_count() == 0 && self.allocated_count() == 0
    }

    fn decrement(counter: &Cell<usize>, what: &str) {
        match counter.get().checked_sub(1) {
            Some(n) => counter.set(n),
            None => warn!("dma accounting: {} count underflow", what),
        }
    }
}

impl DmaObserver for DmaAccounting {
    fn mapped(&self, _mapping: &DmaMapping, _len: usize) {
        self.mapped.set(self.mapped.get() + 1);
    }

    fn unmapped(&self, _mapping: &DmaMapping) {
        Self::decrement(&self.mapped, "mapping");
    }

    fn allocated(&self, _mapping: &DmaMapping, _len: usize) {
        self.allocated.set(self.allocated.get() + 1);
    }

    fn freed(&self, _mapping: &DmaMapping, _len: usize) {
        Self::decrement(&self.allocated, "allocation");
    }
}

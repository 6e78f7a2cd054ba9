//! Externally synchronized regions
//!
//! A [`Region`] has no internal locking. `SharedRegion` puts the whole region
//! behind one mutex so several threads can use it; addresses cross thread
//! boundaries as plain `usize` values.

use std::sync::Arc;
use core::ptr::NonNull;

use parking_lot::Mutex;

use crate::region::{Region, RegionStats};
use crate::error::RegionResult;

/// Thread-safe handle to a region
#[derive(Clone)]
pub struct SharedRegion {
    inner: Arc<Mutex<Region>>,
}

impl SharedRegion {
    pub fn new(region: Region) -> Self {
        Self { inner: Arc::new(Mutex::new(region)) }
    }

    /// Allocate `size` bytes, returning the payload address.
    pub fn allocate(&self, size: usize) -> Option<usize> {
        self.inner.lock().allocate(size).map(|ptr| ptr.as_ptr() as usize)
    }

    /// Resize the allocation at `addr` (or allocate when `None`).
    pub fn reallocate(&self, addr: Option<usize>, size: usize) -> Option<usize> {
        let ptr = addr.and_then(|addr| NonNull::new(addr as *mut u8));
        self.inner.lock().reallocate(ptr, size).map(|ptr| ptr.as_ptr() as usize)
    }

    /// Free the allocation at `addr`. Unknown addresses are logged and ignored.
    pub fn free(&self, addr: usize) {
        self.inner.lock().free(NonNull::new(addr as *mut u8));
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn stats(&self) -> RegionStats {
        self.inner.lock().stats()
    }

    pub fn verify(&self) -> RegionResult<()> {
        self.inner.lock().verify()
    }

    /// Run `f` with exclusive access to the region.
    pub fn with<R>(&self, f: impl FnOnce(&mut Region) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

//! ## vakthund-core::alloc::fault
//! **Fault injection for allocation paths**
//!
//! Wraps a raw allocator or aligned back end and fails requests on demand, so
//! callers can exercise their out-of-memory handling without exhausting memory.

use std::ffi::CStr;
use std::io;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::aligned::AlignedBackend;
use super::raw::RawAllocator;

/// Fails every request of at least `threshold` bytes while armed.
#[derive(Debug, Default)]
pub struct FaultInjector<T> {
    inner: T,
    armed: AtomicBool,
    threshold: AtomicUsize,
    injected: AtomicUsize,
}

impl<T> FaultInjector<T> {
    /// Disarmed injector; behaves exactly like `inner`.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            threshold: AtomicUsize::new(0),
            injected: AtomicUsize::new(0),
        }
    }

    /// Fails every request.
    pub fn failing(inner: T) -> Self {
        let injector = Self::new(inner);
        injector.arm(0);
        injector
    }

    /// Fails requests of at least `threshold` bytes.
    pub fn failing_above(inner: T, threshold: usize) -> Self {
        let injector = Self::new(inner);
        injector.arm(threshold);
        injector
    }

    pub fn arm(&self, threshold: usize) {
        self.threshold.store(threshold, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
    }

    /// The wrapped allocator.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Number of failures injected so far.
    pub fn injected(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    fn gate(&self, size: usize) -> io::Result<()> {
        if self.armed.load(Ordering::SeqCst) && size >= self.threshold.load(Ordering::SeqCst) {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(io::ErrorKind::OutOfMemory.into());
        }
        Ok(())
    }
}

// SAFETY: every successful block comes from `inner`.
unsafe impl<T: RawAllocator> RawAllocator for FaultInjector<T> {
    const NATIVE_BOUNDED_DUP: bool = T::NATIVE_BOUNDED_DUP;

    fn allocate(&self, size: usize) -> io::Result<NonNull<u8>> {
        self.gate(size)?;
        self.inner.allocate(size)
    }

    fn allocate_zeroed(&self, count: usize, size: usize) -> io::Result<NonNull<u8>> {
        self.gate(count.saturating_mul(size))?;
        self.inner.allocate_zeroed(count, size)
    }

    unsafe fn reallocate(&self, block: *mut u8, new_size: usize) -> io::Result<NonNull<u8>> {
        self.gate(new_size)?;
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.reallocate(block, new_size) }
    }

    unsafe fn release(&self, block: *mut u8) {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.release(block) }
    }

    fn duplicate(&self, src: &CStr) -> io::Result<NonNull<u8>> {
        self.gate(src.to_bytes_with_nul().len())?;
        self.inner.duplicate(src)
    }

    fn duplicate_bounded(&self, src: &[u8], max_len: usize) -> io::Result<NonNull<u8>> {
        self.gate(max_len.saturating_add(1))?;
        self.inner.duplicate_bounded(src, max_len)
    }
}

// SAFETY: every successful block comes from `inner`.
unsafe impl<T: AlignedBackend> AlignedBackend for FaultInjector<T> {
    fn allocate_aligned(&self, size: usize, alignment: usize) -> io::Result<NonNull<u8>> {
        self.gate(size)?;
        self.inner.allocate_aligned(size, alignment)
    }

    unsafe fn release_aligned(&self, block: *mut u8) {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.release_aligned(block) }
    }
}

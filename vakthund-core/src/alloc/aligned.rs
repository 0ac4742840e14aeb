//! ## vakthund-core::alloc::aligned
//! **Aligned allocation back ends**
//!
//! One capability, two implementations, picked at build time:
//! - [`PosixMemalign`]: `posix_memalign`, released with plain `free`
//! - [`MmAligned`] (Windows): `_aligned_malloc` / `_aligned_free`
//!
//! [`PlatformAligned`] names the back end for the current target. Because the
//! guarded allocator holds a single back end value, aligned blocks are always
//! released by the allocator that produced them.

use std::io;
use std::ptr::NonNull;

/// Alignment-aware allocate/release pair.
///
/// # Safety
///
/// A successful `allocate_aligned(size, alignment)` must return a block valid
/// for `size` bytes whose address is a multiple of `alignment`.
pub unsafe trait AlignedBackend: Send + Sync {
    fn allocate_aligned(&self, size: usize, alignment: usize) -> io::Result<NonNull<u8>>;

    /// # Safety
    ///
    /// `block` must be null or a live block from this back end's `allocate_aligned`.
    unsafe fn release_aligned(&self, block: *mut u8);
}

/// POSIX back end.
#[cfg(not(windows))]
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixMemalign;

#[cfg(not(windows))]
// SAFETY: posix_memalign honours the alignment on success; failures are filtered by `settle`.
unsafe impl AlignedBackend for PosixMemalign {
    fn allocate_aligned(&self, size: usize, alignment: usize) -> io::Result<NonNull<u8>> {
        let mut block: *mut libc::c_void = std::ptr::null_mut();
        // SAFETY: `block` is a valid out-pointer; bad alignments are reported via the status.
        let status = unsafe { libc::posix_memalign(&mut block, alignment, size) };
        settle(status, block.cast(), |stray| {
            // SAFETY: anything posix_memalign wrote came from the C heap.
            unsafe { libc::free(stray.cast()) }
        })
    }

    unsafe fn release_aligned(&self, block: *mut u8) {
        // SAFETY: posix_memalign blocks are released with plain free.
        unsafe { libc::free(block.cast()) }
    }
}

/// Windows back end.
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct MmAligned;

#[cfg(windows)]
// SAFETY: _aligned_malloc honours the alignment or returns null.
unsafe impl AlignedBackend for MmAligned {
    fn allocate_aligned(&self, size: usize, alignment: usize) -> io::Result<NonNull<u8>> {
        // SAFETY: _aligned_malloc rejects bad alignments by returning null.
        let block = unsafe { libc::aligned_malloc(size, alignment) };
        NonNull::new(block.cast::<u8>()).ok_or_else(super::raw::null_error)
    }

    unsafe fn release_aligned(&self, block: *mut u8) {
        // SAFETY: caller guarantees `block` came from _aligned_malloc; null is a no-op.
        unsafe { libc::aligned_free(block.cast()) }
    }
}

#[cfg(not(windows))]
pub type PlatformAligned = PosixMemalign;

#[cfg(windows)]
pub type PlatformAligned = MmAligned;

/// Interprets a `posix_memalign` style outcome.
///
/// Some allocators report a non-zero status while still writing a pointer.
/// Any such stray block is handed to `release` so it cannot leak, and only a
/// zero status with a non-null block counts as success.
#[cfg_attr(windows, allow(dead_code))]
pub(crate) fn settle(
    status: libc::c_int,
    block: *mut u8,
    release: impl FnOnce(*mut u8),
) -> io::Result<NonNull<u8>> {
    match (status, NonNull::new(block)) {
        (0, Some(block)) => Ok(block),
        (status, stray) => {
            if let Some(stray) = stray {
                release(stray.as_ptr());
            }
            Err(if status != 0 {
                io::Error::from_raw_os_error(status)
            } else {
                io::ErrorKind::OutOfMemory.into()
            })
        }
    }
}

//! ## vakthund-core::alloc::raw
//! **Raw allocator capability**
//!
//! The unguarded allocator the guarded layer wraps. Implementations report
//! failure as an `io::Error` captured at the point of failure, so the platform
//! error string survives until it is logged.

use std::ffi::CStr;
use std::io;
use std::ptr::{self, NonNull};

/// Unguarded `malloc`-family allocator.
///
/// Memory returned by any allocating method is released with
/// [`RawAllocator::release`].
///
/// # Safety
///
/// Implementations must return blocks valid for reads and writes of at least
/// the requested size, aligned at least as `malloc` aligns, and
/// `allocate_zeroed` blocks must be zero-filled.
pub unsafe trait RawAllocator: Send + Sync {
    /// Whether [`RawAllocator::duplicate_bounded`] is backed by a native
    /// implementation. When `false` the guarded layer uses its own fallback.
    const NATIVE_BOUNDED_DUP: bool = false;

    fn allocate(&self, size: usize) -> io::Result<NonNull<u8>>;

    fn allocate_zeroed(&self, count: usize, size: usize) -> io::Result<NonNull<u8>>;

    /// Resizes `block`. On failure `block` is untouched and still owned by the caller.
    ///
    /// # Safety
    ///
    /// `block` must be null or a live block from this allocator.
    unsafe fn reallocate(&self, block: *mut u8, new_size: usize) -> io::Result<NonNull<u8>>;

    /// # Safety
    ///
    /// `block` must be null or a live block from this allocator.
    unsafe fn release(&self, block: *mut u8);

    /// Copies `src` and its terminator into a new block.
    fn duplicate(&self, src: &CStr) -> io::Result<NonNull<u8>> {
        let bytes = src.to_bytes_with_nul();
        let block = self.allocate(bytes.len())?;
        // SAFETY: `block` holds `bytes.len()` bytes and cannot overlap `src`.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), block.as_ptr(), bytes.len()) };
        Ok(block)
    }

    /// Native bounded duplication; only called when `NATIVE_BOUNDED_DUP` is set.
    fn duplicate_bounded(&self, _src: &[u8], _max_len: usize) -> io::Result<NonNull<u8>> {
        Err(io::ErrorKind::Unsupported.into())
    }
}

/// The platform C allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

/// Error for a null result from the C allocator.
///
/// The Windows CRT reports allocation failure through `errno`, which
/// `last_os_error` (`GetLastError`) does not read.
#[inline]
pub(crate) fn null_error() -> io::Error {
    #[cfg(windows)]
    {
        io::ErrorKind::OutOfMemory.into()
    }
    #[cfg(not(windows))]
    {
        io::Error::last_os_error()
    }
}

#[inline]
fn check(block: *mut libc::c_void) -> io::Result<NonNull<u8>> {
    NonNull::new(block.cast::<u8>()).ok_or_else(null_error)
}

// SAFETY: delegates to the C allocator, which upholds the trait contract.
unsafe impl RawAllocator for SystemAllocator {
    const NATIVE_BOUNDED_DUP: bool = cfg!(all(unix, feature = "native-strndup"));

    #[inline]
    fn allocate(&self, size: usize) -> io::Result<NonNull<u8>> {
        // SAFETY: malloc accepts any size.
        check(unsafe { libc::malloc(size) })
    }

    #[inline]
    fn allocate_zeroed(&self, count: usize, size: usize) -> io::Result<NonNull<u8>> {
        // SAFETY: calloc checks `count * size` for overflow itself.
        check(unsafe { libc::calloc(count, size) })
    }

    #[inline]
    unsafe fn reallocate(&self, block: *mut u8, new_size: usize) -> io::Result<NonNull<u8>> {
        // SAFETY: caller guarantees `block` is null or came from this allocator.
        check(unsafe { libc::realloc(block.cast(), new_size) })
    }

    #[inline]
    unsafe fn release(&self, block: *mut u8) {
        // SAFETY: free(NULL) is a no-op; otherwise the caller vouches for `block`.
        unsafe { libc::free(block.cast()) }
    }

    #[cfg(unix)]
    fn duplicate(&self, src: &CStr) -> io::Result<NonNull<u8>> {
        // SAFETY: `src` is terminated.
        check(unsafe { libc::strdup(src.as_ptr()) }.cast())
    }

    #[cfg(all(unix, feature = "native-strndup"))]
    fn duplicate_bounded(&self, src: &[u8], max_len: usize) -> io::Result<NonNull<u8>> {
        // strndup never reads past its bound, so clamping to the slice keeps
        // an unterminated slice in bounds without changing the result.
        let bound = max_len.min(src.len());
        // SAFETY: at most `bound` bytes of `src` are read.
        check(unsafe { libc::strndup(src.as_ptr().cast(), bound) }.cast())
    }
}

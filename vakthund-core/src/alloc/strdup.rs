//! ## vakthund-core::alloc::strdup
//! **Bounded string duplication fallback**
//!
//! Used when the raw allocator has no native bounded duplication.

use std::io;
use std::ptr::NonNull;

use super::raw::RawAllocator;

/// Number of leading bytes of `src` a bounded duplication keeps: stops at
/// `max_len`, at the first NUL, or at the end of the slice.
#[inline]
pub fn bounded_len(src: &[u8], max_len: usize) -> usize {
    let window = &src[..max_len.min(src.len())];
    window.iter().position(|&b| b == 0).unwrap_or(window.len())
}

/// Copies at most `max_len` bytes of `src` into `dst` and terminates it.
///
/// The copy stops early at a NUL in `src`. A terminator is always written at
/// `dst[max_len]` as well, since the copy alone does not terminate a source
/// that runs to the bound.
///
/// # Safety
///
/// `dst` must be valid for writes of `max_len + 1` bytes and must not overlap `src`.
pub unsafe fn copy_bounded(dst: NonNull<u8>, src: &[u8], max_len: usize) {
    let len = bounded_len(src, max_len);
    // SAFETY: `len <= max_len`, and the caller sized `dst` for `max_len + 1`.
    unsafe {
        std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), len);
        dst.as_ptr().add(len).write(0);
        dst.as_ptr().add(max_len).write(0);
    }
}

/// Fallback `strndup`: allocates `max_len + 1` bytes from `raw` and copies into it.
pub fn duplicate_bounded<R: RawAllocator + ?Sized>(
    raw: &R,
    src: &[u8],
    max_len: usize,
) -> io::Result<NonNull<u8>> {
    let size = max_len
        .checked_add(1)
        .ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))?;
    let block = raw.allocate(size)?;
    // SAFETY: `block` was just allocated with `max_len + 1` bytes.
    unsafe { copy_bounded(block, src, max_len) };
    Ok(block)
}

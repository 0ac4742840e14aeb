//! ## vakthund-core::alloc::guard
//! **Guarded allocation primitives**
//!
//! [`GuardedAllocator`] is the only allocator engine code should call. Each
//! primitive forwards to the raw allocator and, on failure only, applies the
//! stage policy from [`super::policy`].

use std::ffi::CStr;
use std::io;
use std::ptr::NonNull;

use vakthund_config::MemoryConfig;

use super::aligned::{AlignedBackend, PlatformAligned};
use super::policy::{enforce, FatalHandler, ProcessExit};
use super::raw::{RawAllocator, SystemAllocator};
use super::strdup;
use crate::error::{AllocOp, AllocRequest, AllocationFailed};
use crate::lifecycle::LifecycleFlag;

const DEFAULT_SIMD_ALIGNMENT: usize = 64;

/// Allocation front end with a stage-dependent failure policy.
///
/// Blocks from `malloc`, `calloc`, `realloc`, `strdup` and `strndup` are
/// released with [`GuardedAllocator::free`]; blocks from `aligned_malloc` and
/// `simd_buffer` with [`GuardedAllocator::aligned_free`]. Mixing the two is
/// undefined behaviour on Windows.
pub struct GuardedAllocator<R = SystemAllocator, A = PlatformAligned, F = ProcessExit> {
    stage: LifecycleFlag,
    raw: R,
    aligned: A,
    fatal: F,
    simd_alignment: usize,
}

impl GuardedAllocator {
    /// Platform allocators, exiting with status 1 on a fatal failure.
    pub fn system(stage: LifecycleFlag) -> Self {
        Self::new(stage, SystemAllocator, PlatformAligned::default(), ProcessExit::default())
    }

    /// Platform allocators with the configured exit status and SIMD alignment.
    pub fn from_config(stage: LifecycleFlag, config: &MemoryConfig) -> Self {
        Self::new(
            stage,
            SystemAllocator,
            PlatformAligned::default(),
            ProcessExit::with_code(config.fatal_exit_code),
        )
        .with_simd_alignment(config.simd_alignment)
    }
}

impl<R, A, F> GuardedAllocator<R, A, F>
where
    R: RawAllocator,
    A: AlignedBackend,
    F: FatalHandler,
{
    pub fn new(stage: LifecycleFlag, raw: R, aligned: A, fatal: F) -> Self {
        Self {
            stage,
            raw,
            aligned,
            fatal,
            simd_alignment: DEFAULT_SIMD_ALIGNMENT,
        }
    }

    pub fn with_simd_alignment(mut self, alignment: usize) -> Self {
        self.simd_alignment = alignment;
        self
    }

    pub fn stage(&self) -> &LifecycleFlag {
        &self.stage
    }

    pub fn raw(&self) -> &R {
        &self.raw
    }

    pub fn aligned_backend(&self) -> &A {
        &self.aligned
    }

    pub fn fatal_handler(&self) -> &F {
        &self.fatal
    }

    pub fn simd_alignment(&self) -> usize {
        self.simd_alignment
    }

    #[inline]
    fn guard<T>(
        &self,
        op: AllocOp,
        request: AllocRequest,
        outcome: io::Result<T>,
    ) -> Result<T, AllocationFailed> {
        outcome.map_err(|source| {
            let failure = AllocationFailed {
                op,
                request,
                source,
            };
            enforce(&self.stage, &self.fatal, failure)
        })
    }

    /// Allocates `size` uninitialized bytes.
    #[inline]
    pub fn malloc(&self, size: usize) -> Result<NonNull<u8>, AllocationFailed> {
        self.guard(AllocOp::Malloc, AllocRequest::bytes(size), self.raw.allocate(size))
    }

    /// Allocates `count * size` zeroed bytes.
    #[inline]
    pub fn calloc(&self, count: usize, size: usize) -> Result<NonNull<u8>, AllocationFailed> {
        self.guard(
            AllocOp::Calloc,
            AllocRequest::array(count, size),
            self.raw.allocate_zeroed(count, size),
        )
    }

    /// Resizes `block` to `new_size` bytes, preserving the common prefix.
    ///
    /// A `new_size` of zero is served as a one-byte block, so success always
    /// yields a live block to release with [`GuardedAllocator::free`] and the
    /// raw allocator never frees `block` behind the caller's back. On failure
    /// `block` is still valid and still owned by the caller.
    ///
    /// # Safety
    ///
    /// `block` must be null or a live block from this allocator's plain primitives.
    #[inline]
    pub unsafe fn realloc(
        &self,
        block: *mut u8,
        new_size: usize,
    ) -> Result<NonNull<u8>, AllocationFailed> {
        // SAFETY: forwarded caller contract.
        let outcome = unsafe { self.raw.reallocate(block, new_size.max(1)) };
        self.guard(AllocOp::Realloc, AllocRequest::bytes(new_size), outcome)
    }

    /// Releases a plain block. Null is a no-op.
    ///
    /// # Safety
    ///
    /// `block` must be null or a live block from this allocator's plain primitives.
    #[inline]
    pub unsafe fn free(&self, block: *mut u8) {
        // SAFETY: forwarded caller contract.
        unsafe { self.raw.release(block) }
    }

    /// Allocates `size` bytes at an address that is a multiple of `alignment`.
    ///
    /// `alignment` must be a power of two (and a multiple of the pointer size
    /// on POSIX); anything else is reported as a failed allocation.
    #[inline]
    pub fn aligned_malloc(
        &self,
        size: usize,
        alignment: usize,
    ) -> Result<NonNull<u8>, AllocationFailed> {
        self.guard(
            AllocOp::AlignedMalloc,
            AllocRequest::aligned(size, alignment),
            self.aligned.allocate_aligned(size, alignment),
        )
    }

    /// [`GuardedAllocator::aligned_malloc`] with the configured SIMD alignment.
    #[inline]
    pub fn simd_buffer(&self, size: usize) -> Result<NonNull<u8>, AllocationFailed> {
        self.aligned_malloc(size, self.simd_alignment)
    }

    /// Releases an aligned block. Null is a no-op.
    ///
    /// # Safety
    ///
    /// `block` must be null or a live block from `aligned_malloc`/`simd_buffer`.
    #[inline]
    pub unsafe fn aligned_free(&self, block: *mut u8) {
        // SAFETY: forwarded caller contract.
        unsafe { self.aligned.release_aligned(block) }
    }

    /// Copies `src` and its terminator into a new plain block.
    pub fn strdup(&self, src: &CStr) -> Result<NonNull<u8>, AllocationFailed> {
        let len = src.to_bytes().len();
        self.guard(AllocOp::Strdup, AllocRequest::bytes(len), self.raw.duplicate(src))
    }

    /// Copies at most `max_len` bytes of `src`, stopping at its first NUL,
    /// into a new terminated plain block.
    ///
    /// Failures report `max_len + 1` bytes, the size the fallback allocates.
    pub fn strndup(&self, src: &[u8], max_len: usize) -> Result<NonNull<u8>, AllocationFailed> {
        let outcome = if R::NATIVE_BOUNDED_DUP {
            self.raw.duplicate_bounded(src, max_len)
        } else {
            strdup::duplicate_bounded(&self.raw, src, max_len)
        };
        self.guard(
            AllocOp::Strndup,
            AllocRequest::bytes(max_len.saturating_add(1)),
            outcome,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::fault::FaultInjector;
    use crate::alloc::policy::PanicOnFatal;
    use crate::lifecycle::LifecycleStage;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use tracing_test::traced_test;

    /// Platform allocator without native bounded duplication; records plain request sizes.
    #[derive(Default)]
    struct FallbackDup {
        requested: Mutex<Vec<usize>>,
    }

    // SAFETY: every block comes from `SystemAllocator`.
    unsafe impl RawAllocator for FallbackDup {
        fn allocate(&self, size: usize) -> io::Result<NonNull<u8>> {
            self.requested.lock().unwrap().push(size);
            SystemAllocator.allocate(size)
        }

        fn allocate_zeroed(&self, count: usize, size: usize) -> io::Result<NonNull<u8>> {
            SystemAllocator.allocate_zeroed(count, size)
        }

        unsafe fn reallocate(&self, block: *mut u8, new_size: usize) -> io::Result<NonNull<u8>> {
            unsafe { SystemAllocator.reallocate(block, new_size) }
        }

        unsafe fn release(&self, block: *mut u8) {
            unsafe { SystemAllocator.release(block) }
        }
    }

    fn fallback(
        stage: LifecycleStage,
    ) -> GuardedAllocator<FaultInjector<FallbackDup>, PlatformAligned, PanicOnFatal> {
        GuardedAllocator::new(
            LifecycleFlag::new(stage),
            FaultInjector::new(FallbackDup::default()),
            PlatformAligned::default(),
            PanicOnFatal::new(),
        )
    }

    type Injected =
        GuardedAllocator<FaultInjector<SystemAllocator>, FaultInjector<PlatformAligned>, PanicOnFatal>;

    fn injected(stage: LifecycleStage) -> Injected {
        GuardedAllocator::new(
            LifecycleFlag::new(stage),
            FaultInjector::new(SystemAllocator),
            FaultInjector::new(PlatformAligned::default()),
            PanicOnFatal::new(),
        )
    }

    fn count(lines: &[&str], needle: &str) -> usize {
        lines.iter().filter(|l| l.contains(needle)).count()
    }

    #[traced_test]
    #[test]
    fn successful_malloc_during_init_is_silent() {
        let guard = injected(LifecycleStage::Initializing);
        let block = guard.malloc(16).unwrap();
        // SAFETY: 16 bytes were requested.
        unsafe {
            block.as_ptr().write_bytes(0x5A, 16);
            guard.free(block.as_ptr());
        }
        assert!(!logs_contain("code=mem_alloc"));
        assert!(!logs_contain("code=fatal"));
        assert_eq!(guard.fatal_handler().hits(), 0);
    }

    #[traced_test]
    #[test]
    fn huge_malloc_while_running_returns_failure() {
        let guard = injected(LifecycleStage::Running);
        guard.raw().arm(1 << 30);

        let err = guard.malloc(1 << 40).unwrap_err();

        assert_eq!(err.op, AllocOp::Malloc);
        assert_eq!(err.request, AllocRequest::bytes(1 << 40));
        assert_eq!(guard.fatal_handler().hits(), 0);
        logs_assert(|lines: &[&str]| {
            match (count(lines, "ERROR"), count(lines, "code=fatal")) {
                (1, 0) => Ok(()),
                other => Err(format!("expected one error entry and no fatal entry, got {other:?}")),
            }
        });
    }

    #[traced_test]
    #[test]
    fn failure_during_init_is_fatal() {
        let guard = injected(LifecycleStage::Initializing);
        guard.raw().arm(0);

        let outcome = catch_unwind(AssertUnwindSafe(|| guard.malloc(64)));

        assert!(outcome.is_err());
        assert_eq!(guard.fatal_handler().hits(), 1);
        logs_assert(|lines: &[&str]| {
            match (count(lines, "code=mem_alloc"), count(lines, "code=fatal")) {
                (1, 1) => Ok(()),
                other => Err(format!("expected one entry of each kind, got {other:?}")),
            }
        });
    }

    #[test]
    fn every_primitive_is_fatal_during_init() {
        let guard = injected(LifecycleStage::Initializing);
        guard.raw().arm(0);
        guard.aligned_backend().arm(0);

        let attempts: Vec<Box<dyn Fn(&Injected)>> = vec![
            Box::new(|g: &Injected| drop(g.malloc(8))),
            Box::new(|g: &Injected| drop(g.calloc(2, 8))),
            Box::new(|g: &Injected| drop(unsafe { g.realloc(std::ptr::null_mut(), 8) })),
            Box::new(|g: &Injected| drop(g.aligned_malloc(8, 64))),
            Box::new(|g: &Injected| drop(g.strdup(c"abc"))),
            Box::new(|g: &Injected| drop(g.strndup(b"abc", 2))),
        ];
        for (i, attempt) in attempts.iter().enumerate() {
            assert!(catch_unwind(AssertUnwindSafe(|| attempt(&guard))).is_err());
            assert_eq!(guard.fatal_handler().hits(), i + 1);
        }
    }

    #[test]
    fn every_primitive_reports_failure_when_running() {
        let guard = injected(LifecycleStage::Running);
        guard.raw().arm(0);
        guard.aligned_backend().arm(0);

        assert_eq!(guard.malloc(8).unwrap_err().op, AllocOp::Malloc);
        assert_eq!(guard.calloc(3, 8).unwrap_err().request, AllocRequest::array(3, 8));
        let err = unsafe { guard.realloc(std::ptr::null_mut(), 8) }.unwrap_err();
        assert_eq!(err.op, AllocOp::Realloc);
        let err = guard.aligned_malloc(128, 64).unwrap_err();
        assert_eq!(err.request, AllocRequest::aligned(128, 64));
        assert_eq!(guard.strdup(c"abcd").unwrap_err().request.size, 4);
        let err = guard.strndup(b"hello", 3).unwrap_err();
        assert_eq!((err.op, err.request.size), (AllocOp::Strndup, 4));
        assert_eq!(guard.fatal_handler().hits(), 0);
    }

    #[test]
    fn shutting_down_is_not_fatal() {
        let guard = injected(LifecycleStage::ShuttingDown);
        guard.raw().arm(0);
        assert!(guard.malloc(8).is_err());
        assert_eq!(guard.fatal_handler().hits(), 0);
    }

    #[test]
    fn realloc_failure_keeps_original_block() {
        let guard = injected(LifecycleStage::Running);
        let block = guard.malloc(4).unwrap();
        // SAFETY: 4 bytes were requested.
        unsafe { block.as_ptr().copy_from_nonoverlapping(b"abcd".as_ptr(), 4) };

        guard.raw().arm(1024);
        assert!(unsafe { guard.realloc(block.as_ptr(), 4096) }.is_err());

        // SAFETY: the failed realloc left `block` untouched.
        let bytes = unsafe { std::slice::from_raw_parts(block.as_ptr(), 4) };
        assert_eq!(bytes, b"abcd");
        unsafe { guard.free(block.as_ptr()) };
    }

    #[test]
    fn realloc_preserves_prefix() {
        let guard = GuardedAllocator::system(LifecycleFlag::new(LifecycleStage::Running));
        let block = guard.malloc(8).unwrap();
        // SAFETY: 8 bytes were requested.
        unsafe { block.as_ptr().copy_from_nonoverlapping(b"vakthund".as_ptr(), 8) };

        let grown = unsafe { guard.realloc(block.as_ptr(), 1 << 16) }.unwrap();

        // SAFETY: realloc preserves the first 8 bytes.
        let bytes = unsafe { std::slice::from_raw_parts(grown.as_ptr(), 8) };
        assert_eq!(bytes, b"vakthund");
        unsafe { guard.free(grown.as_ptr()) };
    }

    #[test]
    fn realloc_to_zero_yields_live_block() {
        for stage in [LifecycleStage::Initializing, LifecycleStage::Running] {
            let guard = injected(stage);
            let block = guard.malloc(32).unwrap();

            let shrunk = unsafe { guard.realloc(block.as_ptr(), 0) }.unwrap();

            // SAFETY: a zero-size resize still hands back one writable byte.
            unsafe {
                shrunk.as_ptr().write(0x7F);
                guard.free(shrunk.as_ptr());
            }
            assert_eq!(guard.fatal_handler().hits(), 0);
        }
    }

    #[test]
    fn realloc_null_to_zero_allocates() {
        let guard = injected(LifecycleStage::Running);
        let block = unsafe { guard.realloc(std::ptr::null_mut(), 0) }.unwrap();
        unsafe { guard.free(block.as_ptr()) };
    }

    #[test]
    fn fallback_strndup_allocates_bound_plus_one() {
        assert!(!<FallbackDup as RawAllocator>::NATIVE_BOUNDED_DUP);
        let guard = fallback(LifecycleStage::Running);

        let block = guard.strndup(b"hello", 3).unwrap();

        // SAFETY: strndup returns a terminated string.
        let copy = unsafe { CStr::from_ptr(block.as_ptr().cast()) };
        assert_eq!(copy, c"hel");
        assert_eq!(*guard.raw().inner().requested.lock().unwrap(), vec![4]);
        unsafe { guard.free(block.as_ptr()) };
    }

    #[traced_test]
    #[test]
    fn fallback_strndup_failure_reports_bound_plus_one() {
        let guard = fallback(LifecycleStage::Running);
        guard.raw().arm(0);

        let err = guard.strndup(b"hello", 3).unwrap_err();

        assert_eq!((err.op, err.request), (AllocOp::Strndup, AllocRequest::bytes(4)));
        assert_eq!(guard.raw().injected(), 1);
        assert!(guard.raw().inner().requested.lock().unwrap().is_empty());
        assert!(logs_contain("size=4"));
        assert!(!logs_contain("code=fatal"));
    }

    #[traced_test]
    #[test]
    fn fallback_strndup_is_fatal_during_init() {
        let guard = fallback(LifecycleStage::Initializing);
        guard.raw().arm(0);

        let outcome = catch_unwind(AssertUnwindSafe(|| guard.strndup(b"hello", 3)));

        assert!(outcome.is_err());
        assert_eq!(guard.fatal_handler().hits(), 1);
        logs_assert(|lines: &[&str]| {
            match (count(lines, "code=mem_alloc"), count(lines, "code=fatal")) {
                (1, 1) => Ok(()),
                other => Err(format!("expected one entry of each kind, got {other:?}")),
            }
        });
    }

    #[test]
    fn calloc_is_zeroed() {
        let guard = GuardedAllocator::system(LifecycleFlag::default());
        let block = guard.calloc(100, 12).unwrap();
        // SAFETY: 1200 zeroed bytes were requested.
        let bytes = unsafe { std::slice::from_raw_parts(block.as_ptr(), 1200) };
        assert!(bytes.iter().all(|&b| b == 0));
        unsafe { guard.free(block.as_ptr()) };
    }

    #[test]
    fn aligned_blocks_honour_alignment() {
        let guard = GuardedAllocator::system(LifecycleFlag::default());
        for alignment in [8usize, 32, 64, 512, 4096] {
            let block = guard.aligned_malloc(300, alignment).unwrap();
            assert_eq!(block.as_ptr() as usize % alignment, 0);
            // SAFETY: 300 bytes were requested.
            unsafe {
                block.as_ptr().write_bytes(0, 300);
                guard.aligned_free(block.as_ptr());
            }
        }
    }

    #[test]
    fn simd_buffer_uses_configured_alignment() {
        let config = MemoryConfig {
            simd_alignment: 256,
            ..MemoryConfig::default()
        };
        let guard = GuardedAllocator::from_config(LifecycleFlag::default(), &config);
        let block = guard.simd_buffer(1000).unwrap();
        assert_eq!(block.as_ptr() as usize % 256, 0);
        unsafe { guard.aligned_free(block.as_ptr()) };
        assert_eq!(guard.fatal_handler().code(), 1);
    }

    #[test]
    fn null_release_is_noop_in_every_stage() {
        for stage in [
            LifecycleStage::Initializing,
            LifecycleStage::Running,
            LifecycleStage::ShuttingDown,
        ] {
            let guard = GuardedAllocator::system(LifecycleFlag::new(stage));
            unsafe {
                guard.free(std::ptr::null_mut());
                guard.aligned_free(std::ptr::null_mut());
            }
        }
    }

    #[test]
    fn strndup_truncates() {
        let guard = GuardedAllocator::system(LifecycleFlag::default());
        let block = guard.strndup(b"hello", 3).unwrap();
        // SAFETY: strndup returns a terminated string.
        let copy = unsafe { CStr::from_ptr(block.as_ptr().cast()) };
        assert_eq!(copy, c"hel");
        unsafe { guard.free(block.as_ptr()) };
    }

    #[test]
    fn strndup_copies_short_source_whole() {
        let guard = GuardedAllocator::system(LifecycleFlag::default());
        let block = guard.strndup(b"hi\0ignored", 16).unwrap();
        // SAFETY: strndup returns a terminated string.
        let copy = unsafe { CStr::from_ptr(block.as_ptr().cast()) };
        assert_eq!(copy, c"hi");
        unsafe { guard.free(block.as_ptr()) };
    }

    #[test]
    fn strdup_copies() {
        let guard = GuardedAllocator::system(LifecycleFlag::default());
        let block = guard.strdup(c"packet").unwrap();
        // SAFETY: strdup returns a terminated string.
        let copy = unsafe { CStr::from_ptr(block.as_ptr().cast()) };
        assert_eq!(copy, c"packet");
        unsafe { guard.free(block.as_ptr()) };
    }

    #[test]
    fn workers_survive_failures_after_startup() {
        let guard = Arc::new(injected(LifecycleStage::Initializing));
        guard.stage().set(LifecycleStage::Running);
        guard.raw().arm(4096);

        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let guard = Arc::clone(&guard);
                thread::spawn(move || {
                    let mut dropped = 0;
                    for i in 0..200usize {
                        let size = if (i + worker) % 4 == 0 { 1 << 20 } else { 256 };
                        match guard.malloc(size) {
                            Ok(block) => unsafe { guard.free(block.as_ptr()) },
                            Err(_) => dropped += 1,
                        }
                    }
                    dropped
                })
            })
            .collect();

        let dropped: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(dropped, 8 * 50);
        assert_eq!(guard.raw().injected(), dropped);
        assert_eq!(guard.fatal_handler().hits(), 0);
    }
}

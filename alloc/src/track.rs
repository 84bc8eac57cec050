//! An allocator that counts what it hands out.
//!
//! [`Tracking`] wraps another [`AlignedAlloc`] and records every allocation
//! and deallocation passing through it. Clones share the same counters, so a
//! test can keep one handle while a data structure owns another, and then
//! check that nothing is left [`outstanding`](Tracking::outstanding) once the
//! structure is gone.
use crate::{AlignedAlloc, AllocError, System};
use core::{
    alloc::Layout,
    fmt,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering::*},
};
use std::sync::Arc;

/// Counts allocations made through an inner allocator.
#[derive(Clone, Default)]
pub struct Tracking<A = System> {
    inner: A,
    counts: Arc<Counts>,
}

#[derive(Default)]
struct Counts {
    allocs: AtomicUsize,
    deallocs: AtomicUsize,
    failures: AtomicUsize,
    bytes: AtomicUsize,
}

impl Tracking {
    /// Returns a new `Tracking` allocator over the [`System`] allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(System)
    }
}

impl<A> Tracking<A> {
    /// Returns a new `Tracking` allocator over `inner`.
    #[must_use]
    pub fn wrap(inner: A) -> Self {
        Self {
            inner,
            counts: Arc::new(Counts::default()),
        }
    }

    /// Number of successful allocations so far.
    pub fn allocations(&self) -> usize {
        self.counts.allocs.load(Acquire)
    }

    /// Number of deallocations so far.
    pub fn deallocations(&self) -> usize {
        self.counts.deallocs.load(Acquire)
    }

    /// Number of requests the inner allocator rejected.
    pub fn failures(&self) -> usize {
        self.counts.failures.load(Acquire)
    }

    /// Number of allocations that have not been released.
    pub fn outstanding(&self) -> usize {
        // deallocations are counted after the memory is returned, so reading
        // them first can only overestimate what's outstanding.
        let deallocs = self.deallocations();
        self.allocations().saturating_sub(deallocs)
    }

    /// Total size, in bytes, of the allocations that have not been released.
    pub fn outstanding_bytes(&self) -> usize {
        self.counts.bytes.load(Acquire)
    }

    /// Returns a reference to the wrapped allocator.
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

unsafe impl<A: AlignedAlloc> AlignedAlloc for Tracking<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        match self.inner.allocate(layout) {
            Ok(ptr) => {
                debug_assert_eq!(
                    ptr.as_ptr() as usize % layout.align(),
                    0,
                    "inner allocator returned a misaligned pointer for {layout:?}"
                );
                self.counts.bytes.fetch_add(layout.size(), AcqRel);
                self.counts.allocs.fetch_add(1, AcqRel);
                Ok(ptr)
            }
            Err(error) => {
                self.counts.failures.fetch_add(1, AcqRel);
                Err(error)
            }
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.inner.deallocate(ptr, layout);
        self.counts.bytes.fetch_sub(layout.size(), AcqRel);
        self.counts.deallocs.fetch_add(1, AcqRel);
    }
}

impl<A: fmt::Debug> fmt::Debug for Tracking<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracking")
            .field("inner", &self.inner)
            .field("allocations", &self.allocations())
            .field("deallocations", &self.deallocations())
            .field("failures", &self.failures())
            .field("outstanding_bytes", &self.outstanding_bytes())
            .finish()
    }
}

//! Deterministic allocation failure.
//!
//! [`FailAfter`] lets a fixed number of allocations through to an inner
//! allocator and rejects every request after that, which makes
//! out-of-memory paths reproducible in tests.
use crate::{AlignedAlloc, AllocError, System};
use core::{
    alloc::Layout,
    fmt,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering::*},
};
use std::sync::Arc;

const UNLIMITED: usize = usize::MAX;

/// Fails every allocation once a budget of successful allocations is spent.
///
/// Clones share the same budget. Rejected requests are never forwarded to
/// the inner allocator; deallocations always are.
#[derive(Clone)]
pub struct FailAfter<A = System> {
    inner: A,
    budget: Arc<AtomicUsize>,
}

impl FailAfter {
    /// Returns a `FailAfter` over the [`System`] allocator that permits
    /// `budget` allocations before failing.
    #[must_use]
    pub fn new(budget: usize) -> Self {
        Self::wrap(System, budget)
    }
}

impl<A> FailAfter<A> {
    /// Sentinel budget meaning "never fail".
    pub const UNLIMITED: usize = UNLIMITED;

    /// Returns a `FailAfter` over `inner` that permits `budget` allocations
    /// before failing.
    #[must_use]
    pub fn wrap(inner: A, budget: usize) -> Self {
        Self {
            inner,
            budget: Arc::new(AtomicUsize::new(budget)),
        }
    }

    /// Permits `budget` more allocations, replacing the current budget.
    pub fn set_budget(&self, budget: usize) {
        self.budget.store(budget, Release);
    }

    /// Fails every allocation from now on.
    pub fn fail_now(&self) {
        self.set_budget(0);
    }

    /// Stops failing allocations.
    pub fn unlimited(&self) {
        self.set_budget(Self::UNLIMITED);
    }

    /// Returns the number of allocations still permitted.
    pub fn remaining(&self) -> usize {
        self.budget.load(Acquire)
    }

    fn take_one(&self) -> bool {
        self.budget
            .fetch_update(AcqRel, Acquire, |budget| match budget {
                0 => None,
                UNLIMITED => Some(budget),
                budget => Some(budget - 1),
            })
            .is_ok()
    }
}

unsafe impl<A: AlignedAlloc> AlignedAlloc for FailAfter<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if !self.take_one() {
            #[cfg(feature = "tracing")]
            tracing::debug!(?layout, "FailAfter: budget exhausted");
            return Err(AllocError::new(layout));
        }

        self.inner.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.inner.deallocate(ptr, layout)
    }
}

impl<A: fmt::Debug> fmt::Debug for FailAfter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailAfter")
            .field("inner", &self.inner)
            .field("remaining", &self.remaining())
            .finish()
    }
}

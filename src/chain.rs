//! The batch of values detached from a queue by a flush.
use crate::node::Node;
use core::{fmt, iter::FusedIterator, marker::PhantomData, ptr::NonNull};
use rhizome_alloc::{AlignedAlloc, System};

/// Every value that was pending in an [`MpscQueue`] when it was flushed, in
/// the order they were pushed.
///
/// A `Chain` owns the detached nodes outright; the queue keeps no reference
/// to them, so a `Chain` may be sent to another thread or outlive the queue
/// it came from. Iterating moves each value out and releases its node as it
/// goes. Dropping a `Chain` drops any values that were not iterated over.
///
/// This type is returned by [`MpscQueue::flush`] and
/// [`MpscQueue::flush_wait`].
///
/// [`MpscQueue`]: crate::MpscQueue
/// [`MpscQueue::flush`]: crate::MpscQueue::flush
/// [`MpscQueue::flush_wait`]: crate::MpscQueue::flush_wait
#[must_use = "dropping a `Chain` drops every value in it"]
pub struct Chain<T, A: AlignedAlloc = System> {
    next: Option<NonNull<Node<T>>>,
    alloc: A,
    _owns: PhantomData<T>,
}

impl<T, A: AlignedAlloc> Chain<T, A> {
    /// # Safety
    ///
    /// `first` must be the head of a chain of nodes, all allocated by `alloc`
    /// and all holding initialized values, which is owned by nothing else.
    pub(crate) unsafe fn from_raw(first: Option<NonNull<Node<T>>>, alloc: A) -> Self {
        Self {
            next: first,
            alloc,
            _owns: PhantomData,
        }
    }

    /// Returns `true` if every value in this chain has been taken.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.next.is_none()
    }
}

impl<T, A: AlignedAlloc> Iterator for Chain<T, A> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let node = self.next?;
        test_trace!(?node, "Chain::next");
        // Safety: we own every node reachable from `self.next`.
        let (value, next) = unsafe { Node::into_value_in(node, &self.alloc) };
        self.next = next;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.is_empty() {
            (0, Some(0))
        } else {
            (1, None)
        }
    }
}

impl<T, A: AlignedAlloc> FusedIterator for Chain<T, A> {}

impl<T, A: AlignedAlloc> Drop for Chain<T, A> {
    fn drop(&mut self) {
        if !self.is_empty() {
            trace!(next = ?self.next, "dropping unconsumed chain");
        }
        self.for_each(drop);
    }
}

impl<T, A: AlignedAlloc> fmt::Debug for Chain<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

// Safety: a `Chain` exclusively owns its nodes and their values, so sending
// it sends the values.
unsafe impl<T: Send, A: AlignedAlloc + Send> Send for Chain<T, A> {}
// Safety: `&Chain` only exposes `is_empty`, which reads the head pointer.
unsafe impl<T: Sync, A: AlignedAlloc + Sync> Sync for Chain<T, A> {}

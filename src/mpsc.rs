//! An unbounded, lock-protected multi-producer, single-consumer queue that
//! is drained in batches.
//!
//! Any number of threads may [`push`] onto an [`MpscQueue`] concurrently.
//! A single consumer takes *everything* pending at once, either with
//! [`flush`], which returns immediately if there is nothing to take, or with
//! [`flush_wait`], which blocks until there is. Because each flush detaches
//! the whole pending chain of nodes in one short critical section, the
//! consumer pays for one lock acquisition per batch rather than one per
//! value.
//!
//! # Implementation
//!
//! The queue is a singly-linked list with a permanently allocated *sentinel*
//! node at its head. The sentinel never carries a value; the values start at
//! the node after it. Because the head always exists, a push never needs to
//! special-case an empty queue: it always links its node after the current
//! tail. A flush severs the link after the sentinel and points the tail back
//! at the sentinel, handing the detached nodes to the caller as a [`Chain`].
//!
//! Producers and the consumer coordinate through a mutex protecting the head
//! and tail, and a condition variable that producers signal after every push.
//! A consumer blocked in [`flush_wait`] re-checks whether the sentinel has a
//! successor each time it wakes, so spurious wakeups and pushes that land
//! between the check and the wait are both handled.
//!
//! # Shutdown
//!
//! There is no built-in way to close a queue or to stop waiting in
//! [`flush_wait`]. A consumer that needs to be stopped should be sent a
//! distinguished value (e.g. an enum variant meaning "shut down") by a
//! producer.
//!
//! [`push`]: MpscQueue::push
//! [`flush`]: MpscQueue::flush
//! [`flush_wait`]: MpscQueue::flush_wait
use crate::{
    error::{AllocError, PushError},
    loom::sync::{Condvar, Mutex},
    node::Node,
    util::CachePadded,
    Chain,
};
use core::{fmt, ptr::NonNull};
use rhizome_alloc::{AlignedAlloc, System};

/// An unbounded, lock-protected MPSC queue that is drained in batches.
///
/// See the [module-level documentation](crate::mpsc) for details.
///
/// # Examples
///
/// ```
/// use rhizome::MpscQueue;
/// use std::thread;
///
/// let q = MpscQueue::new();
///
/// thread::scope(|scope| {
///     for producer in 0..4 {
///         let q = &q;
///         scope.spawn(move || {
///             for i in 0..10 {
///                 q.push((producer, i)).expect("out of memory");
///             }
///         });
///     }
/// });
///
/// let batch: Vec<(u32, u32)> = q.flush().expect("values were pushed").collect();
/// assert_eq!(batch.len(), 40);
/// assert!(q.is_empty());
/// assert!(q.flush().is_none());
/// ```
///
/// # Ownership
///
/// A queue has exactly one owner, and is never copied:
///
/// ```compile_fail
/// let q = rhizome::MpscQueue::<u32>::new();
/// let q2 = q.clone();
/// ```
///
/// Producers and the consumer share the queue by reference (or through an
/// [`Arc`]). While any thread holds a reference, which includes a consumer
/// blocked in [`flush_wait`](Self::flush_wait), the queue cannot be moved or
/// dropped:
///
/// ```compile_fail
/// let q = rhizome::MpscQueue::<u32>::new();
/// std::thread::scope(|scope| {
///     scope.spawn(|| q.flush_wait());
///     let moved = q;
/// });
/// ```
///
/// The sentinel node lives in the allocator's memory rather than inline, so
/// moving a queue that nothing borrows leaves its links intact.
///
/// [`Arc`]: std::sync::Arc
pub struct MpscQueue<T, A: AlignedAlloc = System> {
    /// The sentinel and the tail. Every access to the node chain reachable
    /// from the sentinel happens with this lock held.
    links: CachePadded<Mutex<Links<T>>>,

    /// Notified once after every push.
    not_empty: CachePadded<Condvar>,

    alloc: A,
}

struct Links<T> {
    /// The sentinel node. Always present, never holds a value.
    head: NonNull<Node<T>>,

    /// The last node reachable from `head`, or `head` itself if the queue is
    /// empty. This does not own the node it points to.
    tail: NonNull<Node<T>>,
}

// === impl MpscQueue ===

impl<T> MpscQueue<T> {
    /// Returns a new, empty queue that allocates nodes with the [`System`]
    /// allocator.
    ///
    /// # Panics
    ///
    /// If the sentinel node cannot be allocated, this calls
    /// [`handle_alloc_error`](std::alloc::handle_alloc_error), which aborts
    /// the process by default. Use [`MpscQueue::try_new_in`] to handle the
    /// failure instead.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(System)
    }
}

impl<T, A: AlignedAlloc> MpscQueue<T, A> {
    /// Returns a new, empty queue that allocates nodes with `alloc`.
    ///
    /// # Panics
    ///
    /// If the sentinel node cannot be allocated, this calls
    /// [`handle_alloc_error`](std::alloc::handle_alloc_error), which aborts
    /// the process by default. Use [`MpscQueue::try_new_in`] to handle the
    /// failure instead.
    #[must_use]
    pub fn new_in(alloc: A) -> Self {
        match Self::try_new_in(alloc) {
            Ok(queue) => queue,
            Err(error) => std::alloc::handle_alloc_error(error.layout()),
        }
    }

    /// Returns a new, empty queue that allocates nodes with `alloc`.
    ///
    /// # Errors
    ///
    /// Returns an [`AllocError`] if the sentinel node cannot be allocated. In
    /// that case, no queue is constructed and `alloc` is dropped.
    pub fn try_new_in(alloc: A) -> Result<Self, AllocError> {
        let sentinel = Node::alloc_in(&alloc).map_err(|error| {
            debug!(%error, "MpscQueue: failed to allocate sentinel");
            error
        })?;
        trace!(?sentinel, "MpscQueue::new");

        Ok(Self {
            links: CachePadded::new(Mutex::new(Links {
                head: sentinel,
                tail: sentinel,
            })),
            not_empty: CachePadded::new(Condvar::new()),
            alloc,
        })
    }

    /// Pushes `value` onto the back of the queue.
    ///
    /// This wakes the consumer if it is blocked in
    /// [`flush_wait`](Self::flush_wait). It never blocks, other than
    /// briefly contending with other producers (or the consumer) for the
    /// queue's lock.
    ///
    /// Values pushed by the same thread are flushed in the order they were
    /// pushed. Values pushed concurrently by different threads are ordered by
    /// whichever push took the lock first.
    ///
    /// # Errors
    ///
    /// If a node for `value` cannot be allocated, the queue is left untouched
    /// and a [`PushError`] holding `value` is returned.
    pub fn push(&self, value: T) -> Result<(), PushError<T>> {
        // Allocate outside of the critical section, so that a failure can
        // return before the queue is touched at all.
        let node = match Node::alloc_in(&self.alloc) {
            Ok(node) => node,
            Err(error) => {
                debug!(%error, "MpscQueue::push: failed to allocate node");
                return Err(PushError::new(value, error));
            }
        };
        unsafe {
            // Safety: `node` was just allocated and is not yet shared.
            Node::write_value(node, value);
        }

        {
            let mut links = self.links.lock();
            unsafe {
                // Safety: the tail is only accessed with the lock held, and
                // it never has a successor between pushes.
                Node::set_next(links.tail, node);
            }
            links.tail = node;
        }

        trace!(?node, "MpscQueue::push");
        self.not_empty.notify_one();
        Ok(())
    }

    /// Returns `true` if there are no values waiting to be flushed.
    ///
    /// This is only a snapshot: by the time it returns, another thread may
    /// already have pushed a value. Use [`flush`](Self::flush) to check for
    /// values and take them at once.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.lock().is_empty()
    }

    /// Takes every value currently in the queue, without waiting.
    ///
    /// Returns `None` if the queue is empty. Otherwise, the returned
    /// [`Chain`] owns every value that was pending, and the queue is left
    /// empty.
    ///
    /// The check for emptiness and the detaching of the chain happen in the
    /// same critical section, so a value pushed concurrently is either in
    /// the returned chain or still in the queue afterwards.
    pub fn flush(&self) -> Option<Chain<T, A>>
    where
        A: Clone,
    {
        let first = self.links.lock().detach()?;
        trace!(?first, "MpscQueue::flush");
        // Safety: `detach` transferred ownership of the chain to us.
        Some(unsafe { Chain::from_raw(Some(first), self.alloc.clone()) })
    }

    /// Takes every value in the queue, blocking until there is at least one.
    ///
    /// The returned [`Chain`] is never empty. If the queue already has values
    /// in it, this returns immediately, like [`flush`](Self::flush).
    ///
    /// There is no timeout: if no producer ever pushes again, this blocks
    /// forever.
    ///
    /// Only one thread should consume from a queue. If several threads wait
    /// in `flush_wait` at once, a push only wakes one of them, and the others
    /// keep waiting for later pushes.
    pub fn flush_wait(&self) -> Chain<T, A>
    where
        A: Clone,
    {
        let mut links = self.links.lock();
        let first = loop {
            if let Some(first) = links.detach() {
                break first;
            }

            trace!("MpscQueue::flush_wait: waiting for a push");
            links = self.not_empty.wait(links);
            test_trace!("MpscQueue::flush_wait: woke");
        };
        drop(links);

        trace!(?first, "MpscQueue::flush_wait");
        // Safety: `detach` transferred ownership of the chain to us.
        unsafe { Chain::from_raw(Some(first), self.alloc.clone()) }
    }

    /// Returns a reference to the allocator nodes are allocated with.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }
}

impl<T, A: AlignedAlloc> Drop for MpscQueue<T, A> {
    fn drop(&mut self) {
        let links = self.links.lock();
        let head = links.head;
        drop(links);

        trace!(sentinel = ?head, "MpscQueue::drop");
        unsafe {
            // Safety: `&mut self` means nothing else can reach the chain, and
            // the queue owns the sentinel and everything after it.
            let first = Node::take_next(head);
            Node::dealloc_in(head, &self.alloc);
            // Release the unflushed nodes, in order.
            drop(Chain::from_raw(first, &self.alloc));
        }
    }
}

impl<T> Default for MpscQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: AlignedAlloc + fmt::Debug> fmt::Debug for MpscQueue<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let links = self.links.lock();
        f.debug_struct("MpscQueue")
            .field("head", &links.head)
            .field("tail", &links.tail)
            .field("is_empty", &links.is_empty())
            .field("alloc", &self.alloc)
            .finish()
    }
}

// Safety: the queue owns its values, so it may be sent to another thread if
// they may.
unsafe impl<T: Send, A: AlignedAlloc + Send> Send for MpscQueue<T, A> {}
// Safety: all access to the node chain is serialized by the lock, and a
// shared reference only lets a thread move values in (`push`) or out
// (`flush`), never observe them in place. `T: Sync` is not required, just as
// for `std::sync::mpsc::Sender`.
unsafe impl<T: Send, A: AlignedAlloc + Sync> Sync for MpscQueue<T, A> {}

// === impl Links ===

impl<T> Links<T> {
    #[inline]
    fn is_empty(&self) -> bool {
        // Safety: callers hold the queue's lock.
        !unsafe { Node::has_next(self.head) }
    }

    /// Detaches every node after the sentinel, returning the first one.
    ///
    /// The caller becomes the owner of the whole chain, and the queue is left
    /// empty.
    #[inline]
    fn detach(&mut self) -> Option<NonNull<Node<T>>> {
        // Safety: callers hold the queue's lock.
        let first = unsafe { Node::take_next(self.head) }?;
        self.tail = self.head;
        Some(first)
    }
}


#[cfg(all(loom, test))]
mod loom {
    use super::*;
    use crate::loom::{self, sync::Arc, thread};

    #[test]
    fn concurrent_pushes() {
        const PUSHES: [usize; 2] = [2, 1];

        let mut builder = loom::model::Builder::new();
        // three threads contending on one lock; bound preemptions so the
        // model finishes in a reasonable time.
        builder.preemption_bound = Some(2);
        builder.check(|| {
            let q = Arc::new(MpscQueue::new());
            let producers: Vec<_> = PUSHES
                .iter()
                .enumerate()
                .map(|(producer, &pushes)| {
                    let q = q.clone();
                    thread::spawn(move || {
                        for i in 0..pushes {
                            q.push(producer * 10 + i).unwrap();
                        }
                    })
                })
                .collect();

            let total: usize = PUSHES.iter().sum();
            let mut seen = Vec::new();
            while seen.len() < total {
                seen.extend(q.flush_wait());
            }

            for producer in producers {
                producer.join().unwrap();
            }

            assert!(q.is_empty());
            // each producer's values stay in the order they were pushed.
            for (producer, &pushes) in PUSHES.iter().enumerate() {
                let mine: Vec<_> = seen
                    .iter()
                    .copied()
                    .filter(|value| value / 10 == producer)
                    .collect();
                let expected: Vec<_> = (0..pushes).map(|i| producer * 10 + i).collect();
                assert_eq!(mine, expected);
            }
        })
    }

    #[test]
    fn no_lost_wakeup() {
        loom::model(|| {
            let q = Arc::new(MpscQueue::new());
            let producer = thread::spawn({
                let q = q.clone();
                move || q.push(1).unwrap()
            });

            // if the push's notification were lost, loom would report a
            // deadlock here.
            let batch: Vec<_> = q.flush_wait().collect();
            assert_eq!(batch, vec![1]);
            producer.join().unwrap();
        })
    }

    #[test]
    fn unflushed_values_dropped() {
        loom::model(|| {
            let q = Arc::new(MpscQueue::new());
            let producer = thread::spawn({
                let q = q.clone();
                // loom reports leaked `Arc`s when the model ends.
                move || q.push(Arc::new(())).unwrap()
            });

            drop(q.flush());
            producer.join().unwrap();
        })
    }
}

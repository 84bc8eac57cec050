//! Queue nodes and the ownership of the links between them.
//!
//! A [`Node`] is one element of a queue's chain: an optional payload and a
//! link to the node after it. Nodes are heap-allocated through an
//! [`AlignedAlloc`] and referred to by `NonNull` pointers, but each link
//! *owns* the node it points to: the queue's sentinel owns the first node,
//! every node owns its successor, and whoever detaches a chain owns all of
//! it. No node is ever reachable from two owners.
//!
//! All of the functions here are `unsafe` to call because the pointer
//! passed in must be a live node allocated by this module, and the caller
//! must have exclusive access to it (either by holding the queue's lock or
//! by owning a detached chain).
use crate::util::CACHE_LINE;
use core::{alloc::Layout, mem::MaybeUninit, ptr::NonNull};
use rhizome_alloc::{AlignedAlloc, AllocError};

pub(crate) struct Node<T> {
    /// The next node in the chain, owned by this node.
    next: Option<NonNull<Node<T>>>,

    /// Uninitialized in the sentinel node, and in a node between being
    /// allocated and having its value written.
    value: MaybeUninit<T>,
}

impl<T> Node<T> {
    /// The layout nodes are allocated with.
    ///
    /// Nodes are aligned to (and padded out to a multiple of) [`CACHE_LINE`]
    /// so that two nodes never share a cache line.
    pub(crate) fn layout() -> Layout {
        let layout = Layout::new::<Self>();
        match layout.align_to(CACHE_LINE) {
            Ok(aligned) => aligned.pad_to_align(),
            // `CACHE_LINE` is a power of two, so this is only reachable if
            // padding would overflow `isize`, which a `Node` can't do.
            Err(_) => layout,
        }
    }

    /// Allocates a node with no successor and no value.
    ///
    /// This is how the sentinel node is created; other nodes have their value
    /// written with [`Node::write_value`] afterwards.
    pub(crate) fn alloc_in<A: AlignedAlloc>(alloc: &A) -> Result<NonNull<Self>, AllocError> {
        let ptr = alloc.allocate(Self::layout())?.cast::<Self>();
        unsafe {
            // Safety: `allocate` returned memory that fits `Self::layout()`,
            // and nothing else can see it yet.
            ptr.as_ptr().write(Node {
                next: None,
                value: MaybeUninit::uninit(),
            });
        }
        Ok(ptr)
    }

    /// Initializes the value of a node returned by [`Node::alloc_in`].
    ///
    /// # Safety
    ///
    /// `node` must be exclusively accessible and its value must be
    /// uninitialized.
    #[inline]
    pub(crate) unsafe fn write_value(node: NonNull<Self>, value: T) {
        (*node.as_ptr()).value.write(value);
    }

    /// Links `next` after `node`, transferring ownership of `next` to it.
    ///
    /// # Safety
    ///
    /// `node` must be exclusively accessible and must not already have a
    /// successor; `next` must not be owned by anything else.
    #[inline]
    pub(crate) unsafe fn set_next(node: NonNull<Self>, next: NonNull<Self>) {
        let link = &mut (*node.as_ptr()).next;
        debug_assert!(link.is_none(), "overwrote a node's successor, leaking it");
        *link = Some(next);
    }

    /// Severs the link after `node`, transferring ownership of its successor
    /// (if any) to the caller.
    ///
    /// # Safety
    ///
    /// `node` must be exclusively accessible.
    #[inline]
    pub(crate) unsafe fn take_next(node: NonNull<Self>) -> Option<NonNull<Self>> {
        (*node.as_ptr()).next.take()
    }

    /// Returns whether `node` has a successor.
    ///
    /// # Safety
    ///
    /// `node` must be live and not concurrently mutated.
    #[inline]
    pub(crate) unsafe fn has_next(node: NonNull<Self>) -> bool {
        (*node.as_ptr()).next.is_some()
    }

    /// Moves the value out of `node` and releases the node, returning the
    /// value and ownership of the node that followed it.
    ///
    /// # Safety
    ///
    /// `node` must be owned by the caller, must have been allocated by
    /// `alloc` (or a clone of it), and its value must be initialized.
    pub(crate) unsafe fn into_value_in<A: AlignedAlloc>(
        node: NonNull<Self>,
        alloc: &A,
    ) -> (T, Option<NonNull<Self>>) {
        let Node { next, value } = node.as_ptr().read();
        alloc.deallocate(node.cast(), Self::layout());
        (value.assume_init(), next)
    }

    /// Releases `node` without touching its value.
    ///
    /// # Safety
    ///
    /// `node` must be owned by the caller, must have been allocated by
    /// `alloc` (or a clone of it), and must not have a successor (or the
    /// successor must be owned elsewhere by now). If the value was
    /// initialized, it is leaked.
    pub(crate) unsafe fn dealloc_in<A: AlignedAlloc>(node: NonNull<Self>, alloc: &A) {
        debug_assert!(!Self::has_next(node), "deallocating a node would leak its successor");
        alloc.deallocate(node.cast(), Self::layout());
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use rhizome_alloc::{FailAfter, Tracking};

    #[test]
    fn layout_is_cache_aligned() {
        let layout = Node::<u8>::layout();
        assert_eq!(layout.align() % CACHE_LINE, 0);
        assert_eq!(layout.size() % layout.align(), 0);

        let layout = Node::<[u64; 40]>::layout();
        assert!(layout.size() >= core::mem::size_of::<[u64; 40]>());
        assert_eq!(layout.size() % layout.align(), 0);
    }

    #[test]
    fn alloc_write_take() {
        let alloc = Tracking::new();

        let first = Node::alloc_in(&alloc).unwrap();
        let second = Node::alloc_in(&alloc).unwrap();
        assert_eq!(first.as_ptr() as usize % CACHE_LINE, 0);
        assert_eq!(alloc.outstanding(), 2);

        unsafe {
            Node::write_value(first, String::from("hello"));
            Node::write_value(second, String::from("world"));
            Node::set_next(first, second);
            assert!(Node::has_next(first));

            let (value, next) = Node::into_value_in(first, &alloc);
            assert_eq!(value, "hello");
            assert_eq!(next, Some(second));

            let (value, next) = Node::into_value_in(second, &alloc);
            assert_eq!(value, "world");
            assert_eq!(next, None);
        }

        assert_eq!(alloc.outstanding(), 0);
    }

    #[test]
    fn sentinel_dealloc() {
        let alloc = Tracking::new();
        let sentinel = Node::<Vec<u8>>::alloc_in(&alloc).unwrap();
        unsafe {
            assert_eq!(Node::take_next(sentinel), None);
            Node::dealloc_in(sentinel, &alloc);
        }
        assert_eq!(alloc.outstanding(), 0);
    }

    #[test]
    fn alloc_failure() {
        let alloc = FailAfter::new(0);
        let err = Node::<u32>::alloc_in(&alloc).map(|_| ()).unwrap_err();
        assert_eq!(err.layout(), Node::<u32>::layout());
    }
}

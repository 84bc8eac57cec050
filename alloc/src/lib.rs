//! Aligned allocation for queue nodes.
//!
//! This crate provides the [`AlignedAlloc`] capability that `rhizome`
//! queues allocate their nodes through, along with an implementation backed
//! by the platform allocator ([`System`]). Placing nodes on their own cache
//! lines keeps producers appending at the tail from [false sharing] with the
//! consumer detaching from the head.
//!
//! With the `instrument` feature flag, this crate also provides allocators
//! that wrap another allocator to count outstanding allocations
//! ([`Tracking`]) or to fail on demand ([`FailAfter`]).
//!
//! [false sharing]: https://en.wikipedia.org/wiki/False_sharing
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(docsrs, deny(missing_docs))]
#![cfg_attr(not(any(feature = "std", test)), no_std)]

use core::{alloc::Layout, ptr::NonNull};

#[cfg(feature = "std")]
mod system;
#[cfg(feature = "std")]
pub use self::system::System;

#[cfg(feature = "instrument")]
pub mod fail;
#[cfg(feature = "instrument")]
pub mod track;
#[cfg(feature = "instrument")]
#[doc(inline)]
pub use self::{fail::FailAfter, track::Tracking};

/// An allocator that can satisfy requests at a caller-specified alignment.
///
/// # Safety
///
/// Implementations must ensure that:
///
/// - a successful [`allocate`] returns a pointer to at least
///   `layout.size()` bytes aligned to `layout.align()`, which stays valid
///   until it is passed to [`deallocate`];
/// - memory returned by [`allocate`] does not alias any other live
///   allocation from the same allocator.
///
/// [`allocate`]: AlignedAlloc::allocate
/// [`deallocate`]: AlignedAlloc::deallocate
pub unsafe trait AlignedAlloc {
    /// Allocates a block of memory described by `layout`.
    ///
    /// # Errors
    ///
    /// Returns an [`AllocError`] if the request cannot be satisfied. This
    /// never returns a null pointer on success.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Releases a block of memory previously returned by [`allocate`].
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by a call to [`allocate`] on this
    /// allocator (or a clone of it) with the same `layout`, and must not have
    /// been deallocated already.
    ///
    /// [`allocate`]: AlignedAlloc::allocate
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// An allocation request could not be satisfied.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("failed to allocate {} bytes aligned to {} bytes", .layout.size(), .layout.align())]
pub struct AllocError {
    layout: Layout,
}

// === impl AllocError ===

impl AllocError {
    /// Returns an error reporting that a request for `layout` failed.
    ///
    /// [`AlignedAlloc`] implementations return this when they cannot satisfy
    /// an allocation.
    ///
    /// # Examples
    ///
    /// ```
    /// use core::alloc::Layout;
    /// use rhizome_alloc::AllocError;
    ///
    /// let layout = Layout::from_size_align(64, 128).unwrap();
    /// let error = AllocError::new(layout);
    /// assert_eq!(error.layout(), layout);
    /// assert_eq!(
    ///     error.to_string(),
    ///     "failed to allocate 64 bytes aligned to 128 bytes",
    /// );
    /// ```
    #[must_use]
    pub const fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Returns the layout of the request that failed.
    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }
}

unsafe impl<A: AlignedAlloc + ?Sized> AlignedAlloc for &A {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(ptr, layout)
    }
}

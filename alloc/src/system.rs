use crate::{AlignedAlloc, AllocError};
use core::{alloc::Layout, ptr::NonNull};
use std::alloc::GlobalAlloc;

/// The platform allocator.
///
/// This forwards to [`std::alloc::System`], which selects the platform's
/// aligned allocation routine for the current target (e.g. `posix_memalign`
/// on Unix, `_aligned_malloc` on Windows) whenever the requested alignment
/// exceeds what plain `malloc` guarantees.
///
/// Zero-sized requests are never forwarded to the platform; they are
/// satisfied with a dangling pointer that is correctly aligned.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct System;

unsafe impl AlignedAlloc for System {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }

        // Safety: the layout has a non-zero size.
        let ptr = unsafe { std::alloc::System.alloc(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => {
                debug_assert_eq!(ptr.as_ptr() as usize % layout.align(), 0);
                Ok(ptr)
            }
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    size = layout.size(),
                    align = layout.align(),
                    "platform allocator returned null"
                );
                Err(AllocError::new(layout))
            }
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        std::alloc::System.dealloc(ptr.as_ptr(), layout)
    }
}

/// Returns a dangling pointer aligned to `layout`, for zero-sized requests.
#[inline]
fn dangling(layout: Layout) -> NonNull<u8> {
    // Safety: alignments are never zero.
    unsafe { NonNull::new_unchecked(layout.align() as *mut u8) }
}

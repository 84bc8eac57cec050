//! Errors returned by queue operations.
use core::fmt;
pub use rhizome_alloc::AllocError;

/// A value could not be pushed because its node could not be allocated.
///
/// The queue is left exactly as it was before the push. The rejected value
/// is handed back, and can be recovered with [`PushError::into_inner`].
#[derive(thiserror::Error)]
#[error("failed to push into queue: {source}")]
pub struct PushError<T> {
    value: T,
    source: AllocError,
}

// === impl PushError ===

impl<T> PushError<T> {
    pub(crate) fn new(value: T, source: AllocError) -> Self {
        Self { value, source }
    }

    /// Returns the value that could not be pushed.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Returns the allocation failure that caused the push to fail.
    pub fn alloc_error(&self) -> &AllocError {
        &self.source
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushError")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

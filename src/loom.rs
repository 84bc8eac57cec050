pub(crate) use self::inner::*;

#[cfg(loom)]
mod inner {
    #![allow(unused_imports)]

    pub(crate) mod sync {
        #[cfg(test)]
        pub(crate) use loom::sync::Arc;
        pub(crate) use super::super::blocking::{Condvar, Mutex};
        pub(in crate::loom) use loom::sync as imp;
    }

    #[cfg(test)]
    pub(crate) use loom::{model, thread};
}

#[cfg(not(loom))]
mod inner {
    pub(crate) mod sync {
        pub(crate) use super::super::blocking::{Condvar, Mutex};
        pub(in crate::loom) use std::sync as imp;
    }
}

/// A mutex and condition variable that ignore poisoning.
///
/// None of the queue's critical sections run user code, so a panic while the
/// lock is held cannot leave the node links half-updated. Both `std` and
/// `loom` versions are wrapped so the queue doesn't need to care which one it
/// is built against.
mod blocking {
    use super::inner::sync::imp;
    use core::{
        fmt,
        ops::{Deref, DerefMut},
    };

    pub(crate) struct Mutex<T>(imp::Mutex<T>);

    pub(crate) struct MutexGuard<'a, T>(imp::MutexGuard<'a, T>);

    pub(crate) struct Condvar(imp::Condvar);

    // === impl Mutex ===

    impl<T> Mutex<T> {
        pub(crate) fn new(data: T) -> Self {
            Self(imp::Mutex::new(data))
        }

        #[inline]
        pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
            MutexGuard(self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
        }
    }

    // === impl MutexGuard ===

    impl<T> Deref for MutexGuard<'_, T> {
        type Target = T;

        #[inline]
        fn deref(&self) -> &T {
            &self.0
        }
    }

    impl<T> DerefMut for MutexGuard<'_, T> {
        #[inline]
        fn deref_mut(&mut self) -> &mut T {
            &mut self.0
        }
    }

    // === impl Condvar ===

    impl Condvar {
        pub(crate) fn new() -> Self {
            Self(imp::Condvar::new())
        }

        /// Releases `guard`, blocks until notified, and reacquires the lock.
        ///
        /// This may wake spuriously; callers must re-check their predicate.
        #[inline]
        pub(crate) fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
            MutexGuard(
                self.0
                    .wait(guard.0)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            )
        }

        #[inline]
        pub(crate) fn notify_one(&self) {
            self.0.notify_one()
        }
    }

    impl fmt::Debug for Condvar {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Condvar").finish_non_exhaustive()
        }
    }
}

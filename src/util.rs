//! Reusable utilities for the queue implementation.
//!
//! - [`CachePadded`]: pads and aligns a value to the size of a cache line
//! - [`CACHE_LINE`]: the cache line size assumed for the current target

#[cfg(any(test, feature = "tracing", loom))]
macro_rules! trace {
    ($($t:tt)*) => { tracing::trace!($($t)*) }
}

#[cfg(not(any(test, feature = "tracing", loom)))]
macro_rules! trace {
    ($($t:tt)*) => {};
}

#[cfg(any(test, feature = "tracing", loom))]
macro_rules! debug {
    ($($t:tt)*) => { tracing::debug!($($t)*) }
}

#[cfg(not(any(test, feature = "tracing", loom)))]
macro_rules! debug {
    ($($t:tt)*) => {};
}

#[cfg(test)]
macro_rules! test_trace {
    ($($t:tt)*) => { tracing::trace!($($t)*) }
}

#[cfg(not(test))]
#[allow(unused_macros)]
macro_rules! test_trace {
    ($($t:tt)*) => {};
}

pub use self::cache_pad::{CachePadded, CACHE_LINE};

/// When configured not to pad to cache alignment, just provide a no-op wrapper struct
/// This feature is useful for platforms with no data cache, such as many Cortex-M
/// targets.
#[cfg(feature = "no-cache-pad")]
mod cache_pad {
    /// Aligns the wrapped value to the size of a cache line.
    ///
    /// The `no-cache-pad` feature flag is enabled, so this is a no-op wrapper.
    #[derive(Clone, Copy, Default, Hash, PartialEq, Eq)]
    pub struct CachePadded<T>(pub(crate) T);

    /// The alignment that queue nodes are allocated at.
    ///
    /// With `no-cache-pad`, nodes only get their natural alignment.
    pub const CACHE_LINE: usize = 1;
}

/// When not inhibited, determine cache alignment based on target architecture.
/// Align to 128 bytes on 64-bit x86/ARM targets, otherwise align to 64 bytes.
#[cfg(not(feature = "no-cache-pad"))]
mod cache_pad {
    /// Aligns the wrapped value to the size of a cache line.
    ///
    /// This is used to avoid [false sharing] between the producers pushing
    /// onto a queue and the consumer flushing it.
    ///
    /// On `x86_64`/`aarch64`, a cache line is assumed to be 128 bytes (the
    /// spatial prefetcher pulls in pairs of 64-byte lines). On all other
    /// targets, a cache line is assumed to be 64 bytes long.
    ///
    /// [false sharing]: https://en.wikipedia.org/wiki/False_sharing
    #[cfg_attr(any(target_arch = "x86_64", target_arch = "aarch64"), repr(align(128)))]
    #[cfg_attr(
        not(any(target_arch = "x86_64", target_arch = "aarch64")),
        repr(align(64))
    )]
    #[derive(Clone, Copy, Default, Hash, PartialEq, Eq)]
    pub struct CachePadded<T>(pub(crate) T);

    /// The alignment that queue nodes are allocated at.
    pub const CACHE_LINE: usize = core::mem::align_of::<CachePadded<()>>();
}

mod pad_impls {
    use super::CachePadded;
    use core::{
        fmt,
        ops::{Deref, DerefMut},
    };

    impl<T> CachePadded<T> {
        /// Pads `value` to the length of a cache line.
        pub const fn new(value: T) -> Self {
            Self(value)
        }
    }

    impl<T> Deref for CachePadded<T> {
        type Target = T;

        #[inline]
        fn deref(&self) -> &T {
            &self.0
        }
    }

    impl<T> DerefMut for CachePadded<T> {
        #[inline]
        fn deref_mut(&mut self) -> &mut T {
            &mut self.0
        }
    }

    impl<T: fmt::Debug> fmt::Debug for CachePadded<T> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            self.0.fmt(f)
        }
    }
}

#[cfg(all(test, not(loom)))]
pub(crate) use self::test::trace_init;

#[cfg(test)]
pub(crate) mod test {
    /// Holds the tracing subscriber installed by [`trace_init`] as the
    /// default for the current test thread.
    #[must_use]
    #[cfg(not(loom))]
    pub(crate) struct TestGuard {
        _guard: tracing::subscriber::DefaultGuard,
    }

    /// Initialize tracing for a test, with `RUST_LOG` overriding the default
    /// filter.
    #[cfg(not(loom))]
    pub(crate) fn trace_init() -> TestGuard {
        use tracing_subscriber::{
            filter::{EnvFilter, LevelFilter},
            util::SubscriberInitExt,
        };

        let env = std::env::var("RUST_LOG").unwrap_or_default();
        let builder = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into());
        let filter = if env.is_empty() {
            builder.parse_lossy("rhizome=trace")
        } else {
            builder.parse_lossy(env)
        };
        let collector = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .without_time()
            .with_thread_ids(true)
            .finish();

        TestGuard {
            _guard: collector.set_default(),
        }
    }

    pub(crate) fn assert_send_sync<T: Send + Sync>() {}

    pub(crate) fn assert_send<T: Send>() {}
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn cache_line_is_power_of_two() {
        assert!(CACHE_LINE.is_power_of_two());
        assert_eq!(core::mem::align_of::<CachePadded<u8>>(), CACHE_LINE);
    }
}

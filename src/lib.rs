//! An unbounded, lock-protected multi-producer, single-consumer queue,
//! drained in batches.
//!
//! Many threads [`push`](MpscQueue::push) values onto an [`MpscQueue`]
//! concurrently, while exactly one thread takes them off. Rather than
//! dequeueing one value at a time, the consumer *flushes* the queue,
//! detaching everything pending as a single [`Chain`] in one short critical
//! section, so the cost of taking the lock is amortized over the whole batch.
//!
//! Queue nodes are allocated through an [`AlignedAlloc`], at cache-line
//! alignment unless the `no-cache-pad` feature flag is enabled. By default,
//! the platform allocator ([`System`]) is used.
//!
//! # Feature flags
//!
//! - `tracing`: emit [`tracing`] diagnostics from queue operations. Disabled
//!   by default.
//! - `no-cache-pad`: allocate nodes, and lay out the queue's lock and
//!   condition variable, at their natural alignment rather than padding them
//!   to a cache line. This is useful on targets with no data cache.
//!
//! [`tracing`]: https://docs.rs/tracing
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(docsrs, deny(missing_docs))]

#[macro_use]
pub(crate) mod util;

pub mod chain;
pub mod error;
pub mod mpsc;

pub(crate) mod loom;
mod node;

#[doc(inline)]
pub use self::{
    chain::Chain,
    error::{AllocError, PushError},
    mpsc::MpscQueue,
};
#[doc(inline)]
pub use rhizome_alloc::{AlignedAlloc, System};

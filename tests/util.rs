#![allow(dead_code)]

pub fn trace_init() {
    use tracing_subscriber::filter::{EnvFilter, LevelFilter};
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::TRACE.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_thread_ids(true)
        .try_init();
}

/// Scale iteration counts down under Miri.
pub const fn if_miri(miri: usize, not_miri: usize) -> usize {
    if cfg!(miri) {
        miri
    } else {
        not_miri
    }
}

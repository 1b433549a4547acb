//! Process-wide delay pool.
//!
//! A lazily built, never torn down tokio runtime with exactly one worker
//! thread. Delayed actions sleep here before being handed off to their
//! target dispatch queue; the single thread bounds background growth and
//! serializes delayed hand-offs relative to each other, which is acceptable
//! because delay scheduling is not latency-critical.

use crate::cancel_token::CancelToken;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

const THREAD_PREFIX: &str = "strand-delay-pool";

/// The delay pool could not be started.
///
/// Construction is attempted once; the failure is cached and every
/// subsequent scheduling attempt observes the same error.
#[derive(Debug, Clone, Error)]
#[error("delay pool failed to start: {0}")]
pub struct PoolError(String);

static POOL: OnceLock<Result<tokio::runtime::Runtime, PoolError>> = OnceLock::new();

/// Runs `job` on the pool as soon as its worker thread is free.
///
/// The returned token aborts the queued job, best-effort once it has
/// started.
pub(crate) fn submit(job: impl FnOnce() + Send + 'static) -> Result<CancelToken, PoolError> {
    let abort = runtime()?.spawn(async move { job() }).abort_handle();
    Ok(CancelToken::on_cancel(move || abort.abort()))
}

/// Runs `job` on the pool no earlier than `delay` from now.
pub(crate) fn schedule(
    delay: core::time::Duration,
    job: impl FnOnce() + Send + 'static,
) -> Result<CancelToken, PoolError> {
    let abort = runtime()?
        .spawn(async move {
            tokio::time::sleep(delay).await;
            job()
        })
        .abort_handle();
    Ok(CancelToken::on_cancel(move || abort.abort()))
}

/// The shared pool runtime. The first caller pays construction.
fn runtime() -> Result<&'static tokio::runtime::Runtime, PoolError> {
    POOL.get_or_init(build).as_ref().map_err(Clone::clone)
}

fn build() -> Result<tokio::runtime::Runtime, PoolError> {
    debug!("starting delay pool");

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_time()
        .thread_name_fn(|| {
            static NEXT_THREAD: AtomicUsize = AtomicUsize::new(0);
            let id = NEXT_THREAD.fetch_add(1, Ordering::Relaxed);
            format!("{THREAD_PREFIX}-{id}")
        })
        .build()
        .map_err(|e| PoolError(e.to_string()))
}

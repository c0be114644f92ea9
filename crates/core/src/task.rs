//! Running synchronous filesystem work from async code.

use crate::{CoreError, CoreResult};

/// Runs `f` on tokio's blocking pool so metadata reads, fsyncs and lock waits never stall a
/// runtime worker.
pub(crate) async fn run_blocking<T, F>(f: F) -> CoreResult<T>
where
    F: FnOnce() -> CoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CoreError::BlockingTask(e.to_string()))?
}

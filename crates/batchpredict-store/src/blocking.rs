//! Offload synchronous filesystem work off the async runtime.

use tokio::task::JoinError;

use crate::error::StorageError;
use crate::storage_traits::StorageResult;

pub(crate) fn join_error(e: JoinError) -> StorageError {
    StorageError::Backend(format!("spawn_blocking join error: {e}"))
}

/// Run `op` on the blocking thread pool.
pub(crate) async fn run_blocking<T, F>(op: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op).await.map_err(join_error)?
}

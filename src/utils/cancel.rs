//! Cooperative cancellation for long-running operations

use crate::error::ResolveError;
use crate::Result;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Fail fast if cancellation was already requested
pub fn ensure_active(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        Err(ResolveError::Cancelled)
    } else {
        Ok(())
    }
}

/// Drive `future` unless `token` fires first.
///
/// Work already in flight is dropped when cancellation wins.
pub async fn run_cancellable<F, T>(token: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ResolveError::Cancelled),
        result = future => result,
    }
}

//! Cancellation helpers

use picsort_common::{Error, Result};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Run `fut` unless `cancel` fires first, in which case `Error::Cancelled`
///
/// An already-cancelled token wins over a ready future.
pub async fn until_cancelled<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

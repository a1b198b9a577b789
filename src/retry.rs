//! Retrying of rate limited calls.
//!
//! When a remote says how long to back off, we wait exactly that long and
//! try once more. Anything else is handed back to the caller, who gives up
//! on the current cycle; the next cycle is the retry.

use std::future::Future;

use crate::error::Result;

/// Calls `call`, and once more after the demanded wait if it was rate
/// limited.
///
/// # Errors
///
/// Returns the error of the last attempt. A second rate limit is returned
/// as is, not waited for.
pub async fn rate_limited<T, F, Fut>(mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match call().await {
        Err(e) => match e.retry_after() {
            Some(wait) => {
                warn!("{e}; waiting {}s before retrying", wait.as_secs());
                tokio::time::sleep(wait).await;
                call().await
            }
            None => Err(e),
        },
        ok => ok,
    }
}

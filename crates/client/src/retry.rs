//! Bounded retry around a single transfer attempt.

use std::future::Future;
use std::time::Duration;

use ferry_transfer::TransferError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{ErrorClass, UploadError};

/// Runs `attempt` until it succeeds, fails permanently, or the budget of
/// `retry_attempts` extra attempts is spent.
///
/// `attempt` receives the 1-based attempt number. The delay between
/// attempts (never before the first) is interruptible by `cancel`. The
/// terminal error wraps the last attempt's cause and names how many
/// attempts were actually made; cancellation surfaces as-is.
pub(crate) async fn run_with_retries<F, Fut, T>(
    retry_attempts: u32,
    delay: Duration,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T, UploadError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, UploadError>>,
{
    let mut attempt_no: u32 = 0;
    loop {
        attempt_no += 1;
        let err = match attempt(attempt_no).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        match err.class() {
            ErrorClass::Cancelled => return Err(err),
            ErrorClass::Permanent => {
                return Err(UploadError::Failed {
                    attempts: attempt_no,
                    source: Box::new(err),
                });
            }
            ErrorClass::Transient if attempt_no > retry_attempts => {
                return Err(UploadError::Failed {
                    attempts: attempt_no,
                    source: Box::new(err),
                });
            }
            ErrorClass::Transient => {
                warn!(attempt = attempt_no, error = %err, "attempt failed, will retry");
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled.into()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

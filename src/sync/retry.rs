use std::future::Future;
use std::time::Duration;

use crate::error::AppError;
use crate::zotero::client::ZoteroError;

pub const MAX_RETRIES: u32 = 3;
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Outcome of a retried Zotero write, distinguishing "ran out of retries"
/// from "item no longer exists" so callers can react differently.
pub enum RetryOutcome<T> {
    Success(T),
    NotFound,
    GaveUp,
}

/// Retries `f` up to [`MAX_RETRIES`] times on a Zotero version conflict
/// (412), sleeping `attempt * RETRY_BACKOFF` between attempts via `sleep`.
/// A 404 short-circuits to `NotFound`; any other error (including a
/// non-Zotero error from `f`, such as a database failure) propagates
/// immediately without being retried.
///
/// `sleep` is injected so tests can run the retry loop without waiting.
pub async fn retry_on_conflict<F, Fut, T, S, SFut>(
    mut f: F,
    sleep: S,
) -> Result<RetryOutcome<T>, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
    S: Fn(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    for attempt in 0..MAX_RETRIES {
        match f().await {
            Ok(value) => return Ok(RetryOutcome::Success(value)),
            Err(AppError::Zotero(ZoteroError::Conflict { current_version })) => {
                if attempt + 1 < MAX_RETRIES {
                    let wait = RETRY_BACKOFF * (attempt + 1);
                    tracing::warn!(
                        "version conflict (current={current_version}), retrying in {wait:?} \
                         (attempt {}/{MAX_RETRIES})",
                        attempt + 1
                    );
                    sleep(wait).await;
                } else {
                    tracing::error!("version conflict after {MAX_RETRIES} retries, giving up");
                    return Ok(RetryOutcome::GaveUp);
                }
            }
            Err(AppError::Zotero(ZoteroError::NotFound(_))) => return Ok(RetryOutcome::NotFound),
            Err(other) => return Err(other),
        }
    }
    Ok(RetryOutcome::GaveUp)
}

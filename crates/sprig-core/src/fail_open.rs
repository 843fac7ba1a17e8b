//! Fail-open utilities for graceful degradation
//!
//! Some collaborators are best-effort: a checkpoint commit with nothing to
//! commit, a missing standards library, or a plan archive that cannot be
//! written must never fail the task that triggered them.
//!
//! DO NOT use fail-open for:
//! - Backlog reads/writes (state)
//! - Verification (correctness)
//! - Policy evaluation (safety)

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute an operation that should fail open (infrastructure, not business logic)
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// # Usage
///
/// ```no_run
/// use sprig_core::fail_open::fail_open;
/// use sprig_core::Result;
///
/// async fn checkpoint() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let committed = fail_open("checkpoint_commit", || checkpoint()).await;
///     // committed is None if checkpoint() failed
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

/// Synchronous counterpart of [`fail_open`] for plain filesystem work
pub fn fail_open_sync<F, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Result<T>,
{
    match f() {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SprigError;

    #[tokio::test]
    async fn test_fail_open_success() {
        let result = fail_open("test_op", || async { Ok::<_, SprigError>(42) }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_fail_open_failure() {
        let result = fail_open("test_op", || async {
            Err::<i32, _>(SprigError::Vcs("nothing to commit".to_string()))
        })
        .await;
        assert_eq!(result, None);
    }

    #[test]
    fn test_fail_open_sync() {
        assert_eq!(fail_open_sync("ok", || Ok(1)), Some(1));
        assert_eq!(
            fail_open_sync::<_, i32>("err", || Err(SprigError::Other("x".to_string()))),
            None
        );
    }
}

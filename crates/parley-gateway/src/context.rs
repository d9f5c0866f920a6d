use parley_core::{ParleyError, ParleyResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Execution context of one dispatch.
///
/// Carries the dispatch deadline and a cancellation token. Cancellation is
/// advisory: the dispatcher stops waiting when the deadline passes and
/// cancels the token, but a handler only stops if it checks the context or
/// wraps its blocking calls in [`DispatchContext::run`].
#[derive(Debug, Clone)]
pub struct DispatchContext {
    deadline: Instant,
    cancel: CancellationToken,
}

impl DispatchContext {
    /// Context expiring `timeout` from now.
    pub fn new(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Instant after which the dispatcher discards the result.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the dispatch was cancelled or its deadline passed.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Cancel the dispatch.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token for downstream calls that accept one.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Resolves once the context is cancelled or the deadline passes.
    pub async fn cancelled(&self) {
        tokio::select! {
            () = self.cancel.cancelled() => {}
            () = tokio::time::sleep_until(self.deadline) => {}
        }
    }

    /// Run `fut`, giving up with [`ParleyError::Cancelled`] if the context
    /// ends first.
    pub async fn run<F, T>(&self, fut: F) -> ParleyResult<T>
    where
        F: Future<Output = ParleyResult<T>>,
    {
        tokio::select! {
            biased;
            () = self.cancelled() => Err(ParleyError::Cancelled("dispatch deadline reached".into())),
            result = fut => result,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes_before_deadline() {
        let ctx = DispatchContext::new(Duration::from_secs(5));
        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_gives_up_at_deadline() {
        let ctx = DispatchContext::new(Duration::from_millis(100));
        let result: ParleyResult<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ParleyError::Cancelled(_))));
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_explicit_cancel_is_shared_by_clones() {
        let ctx = DispatchContext::new(Duration::from_secs(5));
        let clone = ctx.clone();
        ctx.cancel();
        assert!(clone.is_cancelled());
        clone.cancelled().await;
    }
}

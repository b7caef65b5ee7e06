//! Process-scoped serve context.
//!
//! A [`ServeContext`] is a cancellation token paired with the reason it was
//! cancelled. One is created per gateway and handed to every component at
//! construction; blocking operations race their own deadlines against
//! [`ServeContext::stopped`] so they all unblock together when serving ends.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why the gateway stopped serving.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StopCause {
    /// The remote account logged out after having been logged in.
    #[error("logout")]
    LoggedOut,

    /// Login checks kept failing at the transport level past the retry budget.
    #[error("remote endpoint unreachable: {0}")]
    RemoteUnreachable(String),

    /// The callback listener could no longer accept pushes.
    #[error("message listener failed: {0}")]
    ListenerFailed(String),

    /// Orderly process shutdown.
    #[error("gateway shut down")]
    Shutdown,
}

/// Cancellation token with a first-writer-wins stop cause.
#[derive(Debug, Clone, Default)]
pub struct ServeContext {
    token: CancellationToken,
    cause: Arc<OnceLock<StopCause>>,
}

impl ServeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the context. Returns `false` if it was already stopped, in which
    /// case the original cause is kept.
    pub fn stop(&self, cause: StopCause) -> bool {
        let first = self.cause.set(cause).is_ok();
        self.token.cancel();
        first
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// The stop cause, or `None` while the context is still active.
    pub fn cause(&self) -> Option<StopCause> {
        if self.is_active() {
            return None;
        }
        Some(self.recorded_cause())
    }

    /// Wait until the context is stopped and return the cause.
    pub async fn stopped(&self) -> StopCause {
        self.token.cancelled().await;
        self.recorded_cause()
    }

    /// A token cancelled together with this context, but which can also be
    /// cancelled on its own (used to scope a single batch of work).
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Run `fut` unless the context stops first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, StopCause>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            cause = self.stopped() => Err(cause),
            output = fut => Ok(output),
        }
    }

    fn recorded_cause(&self) -> StopCause {
        // A token cancelled through a parent never records a cause.
        self.cause.get().cloned().unwrap_or(StopCause::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_cause_wins() {
        let ctx = ServeContext::new();
        assert!(ctx.is_active());
        assert_eq!(ctx.cause(), None);

        assert!(ctx.stop(StopCause::LoggedOut));
        assert!(!ctx.stop(StopCause::Shutdown));

        assert!(!ctx.is_active());
        assert_eq!(ctx.cause(), Some(StopCause::LoggedOut));
    }

    #[test]
    fn clones_share_state() {
        let ctx = ServeContext::new();
        let other = ctx.clone();
        other.stop(StopCause::ListenerFailed("accept".into()));
        assert_eq!(
            ctx.cause(),
            Some(StopCause::ListenerFailed("accept".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_is_interrupted_by_stop() {
        let ctx = ServeContext::new();
        let stopper = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.stop(StopCause::LoggedOut);
        });

        let result = ctx
            .run(tokio::time::sleep(Duration::from_secs(60)))
            .await;
        assert_eq!(result, Err(StopCause::LoggedOut));
    }

    #[tokio::test]
    async fn run_returns_output_while_active() {
        let ctx = ServeContext::new();
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
    }

    #[test]
    fn child_token_follows_parent() {
        let ctx = ServeContext::new();
        let child = ctx.child_token();
        child.cancel();
        assert!(ctx.is_active());

        let child = ctx.child_token();
        ctx.stop(StopCause::Shutdown);
        assert!(child.is_cancelled());
    }
}

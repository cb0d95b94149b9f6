//! Derived context handed to downstream calls.
//!
//! # Responsibilities
//! - Carry the request's cancellation signal into storage, cache and RPC calls
//! - Carry the trace and logger so callers need not thread them manually
//!
//! # Design Decisions
//! - Cancellation fires when the client disconnects or the request completes
//! - No deadline is imposed here; callers add their own timeouts if needed

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::core::trace::Trace;

/// Returned by [`StdContext::run`] when the request went away first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("request context cancelled")]
pub struct Cancelled;

/// Cancellation + trace + logger bundle derived from a request.
#[derive(Debug, Clone)]
pub struct StdContext {
    cancel: CancellationToken,
    trace: Option<Trace>,
    logger: Option<Span>,
}

impl StdContext {
    pub fn new(cancel: CancellationToken, trace: Option<Trace>, logger: Option<Span>) -> Self {
        Self {
            cancel,
            trace,
            logger,
        }
    }

    /// A context that is never cancelled, for background and cron work.
    pub fn background() -> Self {
        Self::new(CancellationToken::new(), None, None)
    }

    pub fn trace(&self) -> Option<&Trace> {
        self.trace.as_ref()
    }

    pub fn logger(&self) -> Option<&Span> {
        self.logger.as_ref()
    }

    /// The logger, or a disabled span when none is bound.
    pub fn span(&self) -> Span {
        self.logger.clone().unwrap_or_else(Span::none)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the originating request is gone.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Token for work that must stop with the request.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive `fut` unless the request is cancelled first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, Cancelled>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Cancelled),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_completes_when_not_cancelled() {
        let ctx = StdContext::background();
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let token = CancellationToken::new();
        let ctx = StdContext::new(token.clone(), Some(Trace::new("t")), None);

        let pending = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.run(tokio::time::sleep(Duration::from_secs(60))).await }
        });
        token.cancel();

        assert_eq!(pending.await.unwrap(), Err(Cancelled));
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.trace().map(Trace::id), Some("t"));
    }
}

//! Cooperative cancellation (spec.md §5: "every operation accepts a
//! cancellation signal").
//!
//! A thin wrapper over `tokio::sync::watch`, matching the teacher's
//! channel-based event plumbing (`src/event.rs`) rather than introducing a
//! `tokio-util` dependency for a single boolean flag.

use std::sync::Arc;
use tokio::sync::watch;

/// The write half: held by the caller who may cancel an in-flight operation.
#[derive(Clone)]
pub struct CancellationSource(watch::Sender<bool>);

/// The read half: passed down into retry loops and session operations.
///
/// Carries an optional paired `Sender`, kept alive only so a closed channel
/// (all senders dropped) never gets confused with "not yet cancelled" —
/// `watch::Receiver::changed()` resolves immediately once its sender is gone,
/// which would otherwise make [`CancellationToken::never`] look cancelled
/// from the first poll.
#[derive(Clone)]
pub struct CancellationToken(watch::Receiver<bool>, Option<Arc<watch::Sender<bool>>>);

pub fn cancellation_pair() -> (CancellationSource, CancellationToken) {
    let (tx, rx) = watch::channel(false);
    (CancellationSource(tx), CancellationToken(rx, None))
}

impl CancellationSource {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the token is cancelled. Safe to race against other
    /// futures in a `tokio::select!` as the next suspension point
    /// (spec.md §5).
    pub async fn cancelled(&mut self) {
        if self.is_cancelled() {
            return;
        }
        let _ = self.0.changed().await;
    }

    /// A token that never cancels, for call sites that don't need one.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        CancellationToken(rx, Some(Arc::new(tx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let (src, mut token) = cancellation_pair();
        assert!(!token.is_cancelled());
        src.cancel();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn never_token_reports_not_cancelled() {
        assert!(!CancellationToken::never().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn never_token_never_resolves_cancelled() {
        let mut token = CancellationToken::never();
        tokio::select! {
            _ = token.cancelled() => panic!("never() token must not resolve as cancelled"),
            _ = tokio::time::sleep(std::time::Duration::from_secs(3600)) => {}
        }
    }
}

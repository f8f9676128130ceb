//! Hierarchical cancellation signal (spec.md §5: "A single hierarchical
//! cancellation signal is threaded through the facade → dispatcher →
//! runner/host").

use tokio::sync::watch;

/// Sender half, held by the facade. Tripping it cancels every [`CancelToken`]
/// derived from it, including ones handed to already-running siblings.
#[derive(Debug, Clone)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    #[must_use]
    pub fn new() -> (Self, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelToken { rx })
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new().0
    }
}

/// Receiver half, threaded down into runners and script hosts.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that never cancels, for call sites that don't need one.
    #[must_use]
    pub fn never() -> Self {
        CancelSource::new().1
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled. Safe to call repeatedly.
    pub async fn cancelled(&mut self) {
        if self.is_cancelled() {
            return;
        }
        let _ = self.rx.changed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_propagates_to_cloned_tokens() {
        let (source, token) = CancelSource::new();
        let mut clone = token.clone();
        assert!(!token.is_cancelled());
        source.cancel();
        clone.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[test]
    fn never_token_is_never_cancelled() {
        assert!(!CancelToken::never().is_cancelled());
    }
}

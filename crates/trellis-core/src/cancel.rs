//! Serial cancellation: one current token at a time

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Slot {
    generation: AtomicU64,
    notify: Notify,
}

/// Hands out [`PassToken`]s; issuing a new one cancels the previous.
#[derive(Debug, Clone, Default)]
pub struct SerialCancellation {
    slot: Arc<Slot>,
}

impl SerialCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the current token and return a fresh one.
    pub fn next(&self) -> PassToken {
        let generation = self.slot.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.slot.notify.notify_waiters();
        PassToken {
            slot: Arc::clone(&self.slot),
            generation,
        }
    }

    /// Cancel the current token without issuing a new one.
    pub fn cancel(&self) {
        self.slot.generation.fetch_add(1, Ordering::AcqRel);
        self.slot.notify.notify_waiters();
    }

    pub fn current_generation(&self) -> u64 {
        self.slot.generation.load(Ordering::Acquire)
    }
}

/// Cancellation signal owned by one pass.
///
/// The token is cancelled as soon as its slot issues a newer generation.
#[derive(Debug, Clone)]
pub struct PassToken {
    slot: Arc<Slot>,
    generation: u64,
}

impl PassToken {
    /// A token that is never cancelled, for standalone use of graph and
    /// subgraph APIs.
    pub fn detached() -> Self {
        PassToken {
            slot: Arc::new(Slot::default()),
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.slot.generation.load(Ordering::Acquire) != self.generation
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.slot.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_next_cancels_previous() {
        let slot = SerialCancellation::new();
        let first = slot.next();
        assert!(!first.is_cancelled());

        let second = slot.next();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(second.generation() > first.generation());

        slot.cancel();
        assert!(second.is_cancelled());
    }

    #[test]
    fn test_detached_token_never_cancels() {
        let token = PassToken::detached();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let slot = SerialCancellation::new();
        let token = slot.next();
        let waiter = tokio::spawn({
            let token = token.clone();
            async move { token.cancelled().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _newer = slot.next();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}

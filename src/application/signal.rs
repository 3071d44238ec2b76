use std::sync::Arc;
use tokio::sync::watch;

/// A value that is set at most once and can be awaited by any number of tasks.
///
/// Clones share the same slot. The first `set` wins; later calls are ignored.
#[derive(Debug)]
pub struct Latch<T> {
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for Latch<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Clone + Send + Sync> Default for Latch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> Latch<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Returns `true` if this call set the value.
    pub fn set(&self, value: T) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(value);
                true
            } else {
                false
            }
        })
    }

    pub fn get(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    pub fn is_set(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Resolves once the value is set.
    pub async fn wait(&self) -> T {
        let mut rx = self.tx.subscribe();
        let value = match rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        match value {
            Some(value) => value,
            // The sender lives as long as `self`, so this is unreachable in practice.
            None => std::future::pending().await,
        }
    }
}

/// Set when the hosting view goes away.
pub type CancelSignal = Latch<()>;

/// How an order left the reconciliation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Activated,
    Rejected,
    /// Paid, but activation could not be completed.
    ActivationFailed,
    /// The poller ran out of attempts without a conclusive answer.
    Exhausted,
}

/// Signals shared by every task working on one order.
#[derive(Debug, Clone, Default)]
pub struct OrderControl {
    pub unmount: CancelSignal,
    pub settled: Latch<Settlement>,
}

impl OrderControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves when either the order settles or the view unmounts.
    pub async fn done(&self) {
        tokio::select! {
            _ = self.unmount.wait() => {}
            _ = self.settled.wait() => {}
        }
    }
}

//! Cooperative cancellation for job polling.
//!
//! Cancelling only abandons local waiting. The remote job keeps running and
//! the next reconciliation rediscovers its outcome through a snapshot read.

use std::future;

use tokio::sync::watch;

/// Owner side of a cancellation pair.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signals every [`CancelSignal`] derived from this handle.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

/// Observer side of a cancellation pair. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    receiver: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires.
    #[must_use]
    pub const fn never() -> Self {
        Self { receiver: None }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.receiver
            .as_ref()
            .is_some_and(|receiver| *receiver.borrow())
    }

    /// Resolves once cancellation is requested. Never resolves when the
    /// handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(receiver) = self.receiver.as_ref() else {
            return future::pending().await;
        };
        let mut receiver = receiver.clone();
        let closed = receiver.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            future::pending::<()>().await;
        }
    }
}

/// Creates a linked handle and signal.
#[must_use]
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (sender, receiver) = watch::channel(false);
    (
        CancelHandle { sender },
        CancelSignal {
            receiver: Some(receiver),
        },
    )
}

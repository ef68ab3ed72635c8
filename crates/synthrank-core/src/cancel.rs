//! External cancellation for in-flight rounds.
//!
//! A [`CancelHandle`] flips a `watch` flag; every [`CancelSignal`] cloned from
//! it observes the flip. The orchestrator races each stage against the signal
//! and drops the stage future (and its in-flight collaborator calls) when the
//! flag is set.

use tokio::sync::watch;

/// Owner side: call [`CancelHandle::cancel`] to abort the round.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Observer side, handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn pair() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelSignal { rx })
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Sender dropped without cancelling: never fires.
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let (handle, mut signal) = CancelHandle::pair();
        assert!(!signal.is_cancelled());

        let waiter = tokio::spawn(async move {
            signal.cancelled().await;
            true
        });
        handle.cancel();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_already_cancelled_returns_immediately() {
        let (handle, _) = CancelHandle::pair();
        handle.cancel();
        let mut signal = handle.signal();
        assert!(signal.is_cancelled());
        tokio::time::timeout(Duration::from_millis(50), signal.cancelled())
            .await
            .expect("should resolve immediately");
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_signal_does_not_fire() {
        let mut signal = CancelSignal::never();
        let res = tokio::time::timeout(Duration::from_secs(5), signal.cancelled()).await;
        assert!(res.is_err());
        assert!(!signal.is_cancelled());
    }
}

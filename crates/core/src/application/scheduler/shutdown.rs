// Scheduler Shutdown Token

use tokio::sync::watch;

/// Cooperative stop signal shared by all scheduler loops
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested (immediately if it already was,
    /// or if the sender is gone)
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to all loops
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_after_signal() {
        let (tx, mut token) = shutdown_channel();
        assert!(!token.is_shutdown());

        tx.shutdown();
        tokio::time::timeout(Duration::from_secs(1), token.wait())
            .await
            .expect("wait should resolve once shutdown is signalled");
        assert!(token.is_shutdown());
    }

    #[test]
    fn test_wait_pending_until_signal() {
        let (tx, mut token) = shutdown_channel();
        let mut wait = tokio_test::task::spawn(token.wait());
        tokio_test::assert_pending!(wait.poll());

        tx.shutdown();

        assert!(wait.is_woken());
        tokio_test::assert_ready!(wait.poll());
    }

    #[test]
    fn test_wait_resolves_when_sender_dropped() {
        let (tx, mut token) = shutdown_channel();
        drop(tx);

        let mut wait = tokio_test::task::spawn(token.wait());
        tokio_test::assert_ready!(wait.poll());
    }
}

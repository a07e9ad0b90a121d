use pin_project_lite::pin_project;
use std::task::{Context, Poll};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// One-shot flag that any number of tasks can await.
///
/// Setting it more than once is a no-op.
#[derive(Clone)]
pub(crate) struct Signal {
    token: CancellationToken,
}

impl Signal {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn set(&self) {
        self.token.cancel();
    }

    pub fn is_set(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn wait(&self) -> WaitForSignalFuture<'_> {
        WaitForSignalFuture {
            inner: self.token.cancelled(),
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("is_set", &self.is_set())
            .finish()
    }
}

pin_project! {
    pub(crate) struct WaitForSignalFuture<'a> {
        #[pin]
        inner: WaitForCancellationFuture<'a>,
    }
}

impl<'a> std::fmt::Debug for WaitForSignalFuture<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitForSignalFuture").finish()
    }
}

impl<'a> std::future::Future for WaitForSignalFuture<'a> {
    type Output = ();

    fn poll(self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project().inner.poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::Signal;
    use std::time::Duration;

    #[tokio::test]
    async fn clones_observe_set() {
        let signal = Signal::new();
        let other = signal.clone();

        let waiter = tokio::spawn(async move {
            other.wait().await;
            other.is_set()
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!signal.is_set());

        signal.set();
        signal.set();

        assert!(waiter.await.unwrap());
        assert!(signal.is_set());
    }

    #[tokio::test]
    async fn wait_completes_immediately_once_set() {
        let signal = Signal::new();
        signal.set();

        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("a set signal must not block");
    }
}

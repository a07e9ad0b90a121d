use crate::signal::{Signal, WaitForSignalFuture};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

type List = Arc<Mutex<Vec<Signal>>>;

/// Registry tracking every connection the listener has handed out a guard for.
///
/// Cloning the registry is cheap, all clones share the same state.
#[derive(Clone, Default)]
pub(crate) struct Registry {
    connections: List,
    shutdown: Signal,
    force: Signal,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection.
    ///
    /// Entries of connections that already finished are pruned here, so the
    /// list only ever holds the connections that are still open.
    pub fn guard(&self) -> ConnectionGuard {
        let done = Signal::new();

        let mut connections = self.lock();
        connections.retain(|signal| !signal.is_set());
        connections.push(done.clone());

        ConnectionGuard {
            shutdown: self.shutdown.clone(),
            force: self.force.clone(),
            done,
        }
    }

    pub fn open(&self) -> usize {
        self.lock().iter().filter(|signal| !signal.is_set()).count()
    }

    pub fn shutdown(&self) {
        self.shutdown.set();
    }

    pub fn wait_for_shutdown(&self) -> WaitForSignalFuture<'_> {
        self.shutdown.wait()
    }

    /// Makes every guard's [`ConnectionGuard::forced`] future resolve.
    pub fn force(&self) {
        self.force.set();
    }

    /// Waits for all open connections to finish.
    ///
    /// Connections still open after `deadline` are told to close immediately,
    /// their guards are awaited and their number is returned as the error.
    pub async fn drain(&self, deadline: Duration) -> Result<(), usize> {
        if tokio::time::timeout(deadline, self.wait_for_idle())
            .await
            .is_ok()
        {
            return Ok(());
        }

        let open = self.open();
        self.force();
        self.wait_for_idle().await;

        Err(open)
    }

    async fn wait_for_idle(&self) {
        let pending: Vec<Signal> = self
            .lock()
            .iter()
            .filter(|signal| !signal.is_set())
            .cloned()
            .collect();

        futures::future::join_all(pending.iter().map(Signal::wait)).await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Signal>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("open", &self.open())
            .field("in_shutdown", &self.shutdown.is_set())
            .field("forced", &self.force.is_set())
            .finish()
    }
}

/// Held by a connection task for as long as the connection is open.
///
/// Dropping the guard marks the connection as finished.
pub(crate) struct ConnectionGuard {
    shutdown: Signal,
    force: Signal,
    done: Signal,
}

impl ConnectionGuard {
    /// Resolves once the listener starts shutting down.
    pub fn wait(&self) -> WaitForSignalFuture<'_> {
        self.shutdown.wait()
    }

    /// Resolves once the drain deadline passed and the connection must be
    /// dropped without further ado.
    pub fn forced(&self) -> WaitForSignalFuture<'_> {
        self.force.wait()
    }
}

impl std::fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGuard")
            .field("in_shutdown", &self.shutdown.is_set())
            .field("forced", &self.force.is_set())
            .finish()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.done.set();
    }
}

#[cfg(test)]
mod tests {
    use super::Registry;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn dropped_guards_are_pruned() {
        let registry = Registry::new();

        let first = registry.guard();
        let second = registry.guard();
        assert_eq!(registry.open(), 2);

        drop(first);
        assert_eq!(registry.open(), 1);

        let _third = registry.guard();
        assert_eq!(registry.open(), 2);
        assert_eq!(registry.connections.lock().unwrap().len(), 2);

        drop(second);
        assert_eq!(registry.open(), 1);
    }

    #[tokio::test]
    async fn drain_without_connections_is_immediate() {
        let registry = Registry::new();
        registry.shutdown();

        let started = Instant::now();
        assert_eq!(registry.drain(Duration::from_secs(2)).await, Ok(()));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn drain_waits_for_connections_that_finish_in_time() {
        let registry = Registry::new();
        let guard = registry.guard();

        let worker = tokio::spawn(async move {
            guard.wait().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });

        registry.shutdown();
        assert_eq!(registry.drain(Duration::from_secs(2)).await, Ok(()));
        assert_eq!(registry.open(), 0);

        worker.await.unwrap();
    }

    #[tokio::test]
    async fn drain_forces_connections_past_the_deadline() {
        let registry = Registry::new();
        let stuck = registry.guard();
        let polite = registry.guard();

        // ignores the shutdown request, only leaves when forced
        let stuck_worker = tokio::spawn(async move {
            stuck.wait().await;
            stuck.forced().await;
        });
        let polite_worker = tokio::spawn(async move {
            polite.wait().await;
        });

        registry.shutdown();
        let started = Instant::now();
        assert_eq!(registry.drain(Duration::from_millis(100)).await, Err(1));
        assert!(started.elapsed() >= Duration::from_millis(100));

        // forced guards are released before drain returns
        assert_eq!(registry.open(), 0);

        stuck_worker.await.unwrap();
        polite_worker.await.unwrap();
    }
}

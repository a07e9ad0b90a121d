//! Shutdown coordination: `Running` → `Draining` → `Terminated`.
//!
//! The coordinator waits for a single trigger, then stops the [`Server`] with
//! a bounded drain. The drain itself cannot be interrupted, triggers firing
//! after the first one are ignored.

use crate::departure::Trigger;
use crate::error::Error;
use crate::server::Server;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// How long in-flight connections get to finish once shutdown started.
pub const DRAIN_DEADLINE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Draining,
    Terminated,
}

/// Drives a started [`Server`] through its shutdown.
pub struct Coordinator<'s> {
    server: &'s mut Server,
    deadline: Duration,
    phase: watch::Sender<Phase>,
}

impl<'s> Coordinator<'s> {
    pub fn new(server: &'s mut Server) -> Self {
        let (phase, _) = watch::channel(Phase::Running);
        Self {
            server,
            deadline: DRAIN_DEADLINE,
            phase,
        }
    }

    /// Overrides [`DRAIN_DEADLINE`].
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Observes the phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Waits for `trigger`, then drains the server.
    ///
    /// Returns the result of [`Server::stop`]. When the trigger fails the server
    /// is drained all the same and the trigger's error is returned.
    pub async fn run<F>(self, trigger: F) -> Result<(), Error>
    where
        F: Future<Output = Result<Trigger, Error>>,
    {
        let triggered = trigger.await;
        match &triggered {
            Ok(trigger) => info!(%trigger, "Shutting down server..."),
            Err(e) => error!(error = %e, "Shutdown trigger failed, shutting down server..."),
        }

        self.phase.send_replace(Phase::Draining);
        let stopped = self.server.stop(self.deadline).await;
        self.phase.send_replace(Phase::Terminated);

        triggered?;
        stopped?;

        info!("Server exited properly");
        Ok(())
    }
}

impl<'s> std::fmt::Debug for Coordinator<'s> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("phase", &self.phase())
            .field("deadline", &self.deadline)
            .field("server", &self.server.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server::State;
    use std::time::Instant;

    async fn started() -> Server {
        let mut server = Server::new(&Config::new("0"));
        server.start().await.unwrap();
        server
    }

    #[tokio::test]
    async fn walks_through_every_phase() {
        let mut server = started().await;
        let addr = server.local_addr().unwrap();

        let coordinator = Coordinator::new(&mut server);
        assert_eq!(coordinator.phase(), Phase::Running);
        let mut phases = coordinator.subscribe();

        let observer = tokio::spawn(async move {
            let mut seen = vec![*phases.borrow_and_update()];
            while phases.changed().await.is_ok() {
                seen.push(*phases.borrow_and_update());
                if seen.last() == Some(&Phase::Terminated) {
                    break;
                }
            }
            seen
        });

        let response = reqwest::get(format!("http://127.0.0.1:{}/health", addr.port()))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        coordinator
            .run(async { Ok(Trigger::Completion) })
            .await
            .unwrap();

        let seen = observer.await.unwrap();
        assert_eq!(seen.first(), Some(&Phase::Running));
        assert_eq!(seen.last(), Some(&Phase::Terminated));
        assert_eq!(server.state(), State::Stopped);
    }

    #[tokio::test]
    async fn shutdown_finishes_within_the_deadline() {
        let mut server = started().await;

        let begun = Instant::now();
        Coordinator::new(&mut server)
            .run(async { Ok(Trigger::Completion) })
            .await
            .unwrap();

        assert!(begun.elapsed() < DRAIN_DEADLINE);
        assert_eq!(server.state(), State::Stopped);
    }

    #[tokio::test]
    async fn failed_trigger_still_stops_the_server() {
        let mut server = started().await;

        let result = Coordinator::new(&mut server)
            .run(crate::depart())
            .await;

        assert!(matches!(result, Err(Error::NoTrigger)));
        assert_eq!(server.state(), State::Stopped);
    }

    #[tokio::test]
    async fn with_deadline_overrides_default() {
        let mut server = started().await;

        let coordinator = Coordinator::new(&mut server).with_deadline(Duration::from_millis(250));
        assert_eq!(coordinator.deadline, Duration::from_millis(250));

        coordinator.run(async { Ok(Trigger::Completion) }).await.unwrap();
    }
}

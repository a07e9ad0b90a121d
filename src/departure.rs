//! Shutdown triggers: OS signals, `Ctrl+C` or any custom future.
//!
//! # Example:
//!
//! ```no_run
//! # use std::time::Duration;
//! # async fn fun() -> Result<(), vigil::Error> {
//! let trigger = vigil::depart()
//!     // Shut down on SIGINT and SIGTERM
//!     .on_termination()
//!     // Or after an hour, whichever comes first
//!     .on_completion(tokio::time::sleep(Duration::from_secs(3600)))
//!     .await?;
//!
//! println!("shutting down: {trigger}");
//! # Ok(())
//! # }
//! ```

use crate::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

#[cfg(unix)]
use tokio::signal::unix::SignalKind;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The condition that initiated the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    CtrlC,
    #[cfg(unix)]
    Signal(SignalKind),
    Completion,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::CtrlC => f.write_str("Ctrl+C"),
            #[cfg(unix)]
            Trigger::Signal(kind) if *kind == SignalKind::interrupt() => f.write_str("SIGINT"),
            #[cfg(unix)]
            Trigger::Signal(kind) if *kind == SignalKind::terminate() => f.write_str("SIGTERM"),
            #[cfg(unix)]
            Trigger::Signal(kind) => write!(f, "{kind:?}"),
            Trigger::Completion => f.write_str("completion"),
        }
    }
}

/// Creates the [`Departure`] future builder to set up the shutdown conditions.
///
/// ```no_run
/// # async fn fun() {
/// let trigger = vigil::depart().on_termination().await;
/// # }
/// ```
pub fn depart<'a>() -> Departure<'a> {
    Departure {
        inner: Inner::default(),
        fut: None,
    }
}

/// Future builder for shutdown conditions, resolves once the first one fires.
///
/// Signal handlers are installed as soon as the builder method is called, not
/// when the future is first polled. From then on the process no longer
/// terminates on that signal, repeated signals are absorbed.
///
/// Awaiting without any condition resolves to [`Error::NoTrigger`].
pub struct Departure<'a> {
    inner: Inner<'a>,
    fut: Option<BoxFuture<'a, Result<Trigger, Error>>>,
}

impl<'a> Departure<'a> {
    /// Initiates a shutdown on `Ctrl+C`.
    pub fn on_ctrl_c(mut self) -> Self {
        self.inner.on_ctrl_c();
        self
    }

    /// Initiates a shutdown on `SIGINT` and `SIGTERM`, `Ctrl+C` on other platforms.
    pub fn on_termination(mut self) -> Self {
        self.inner.on_termination();
        self
    }

    /// Initiates a shutdown on `SIGINT`.
    #[cfg(unix)]
    pub fn on_sigint(self) -> Self {
        self.on_signal(SignalKind::interrupt())
    }

    /// Initiates a shutdown on `SIGTERM`.
    #[cfg(unix)]
    pub fn on_sigterm(self) -> Self {
        self.on_signal(SignalKind::terminate())
    }

    /// Initiates a shutdown on a specific signal.
    ///
    /// ```no_run
    /// # async fn fun() {
    /// vigil::depart()
    ///     .on_signal(tokio::signal::unix::SignalKind::user_defined1())
    ///     .await;
    /// # }
    /// ```
    #[cfg(unix)]
    pub fn on_signal(mut self, kind: SignalKind) -> Self {
        self.inner.on_signal(kind);
        self
    }

    /// Initiates a shutdown when the passed future completes.
    pub fn on_completion(mut self, fut: impl Future<Output = ()> + Send + 'a) -> Self {
        self.inner.on_completion(fut);
        self
    }
}

impl<'a> std::fmt::Debug for Departure<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Departure")
            .field("conditions", &self.inner.futures.len())
            .field("polled", &self.fut.is_some())
            .finish()
    }
}

impl<'a> Future for Departure<'a> {
    type Output = Result<Trigger, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let fut = this
            .fut
            .get_or_insert_with(|| std::mem::take(&mut this.inner).into_future());

        fut.as_mut().poll(cx)
    }
}

#[derive(Default)]
struct Inner<'a> {
    futures: Vec<BoxFuture<'a, Trigger>>,
    error: Option<std::io::Error>,
}

impl<'a> Inner<'a> {
    fn on_termination(&mut self) {
        #[cfg(unix)]
        {
            self.on_signal(SignalKind::interrupt());
            self.on_signal(SignalKind::terminate());
        }
        #[cfg(not(unix))]
        self.on_ctrl_c();
    }

    fn on_ctrl_c(&mut self) {
        self.futures.push(Box::pin(async {
            // a failure here means the handler is gone, no more Ctrl+C will arrive
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            Trigger::CtrlC
        }));
    }

    #[cfg(unix)]
    fn on_signal(&mut self, kind: SignalKind) {
        match tokio::signal::unix::signal(kind) {
            Ok(mut signal) => self.futures.push(Box::pin(async move {
                if signal.recv().await.is_none() {
                    std::future::pending::<()>().await;
                }
                Trigger::Signal(kind)
            })),
            Err(e) => {
                tracing::error!(error = %e, signal = ?kind, "Failed to register signal handler");
                self.error.get_or_insert(e);
            }
        }
    }

    fn on_completion(&mut self, fut: impl Future<Output = ()> + Send + 'a) {
        self.futures.push(Box::pin(async move {
            fut.await;
            Trigger::Completion
        }));
    }

    fn into_future(self) -> BoxFuture<'a, Result<Trigger, Error>> {
        if let Some(e) = self.error {
            return Box::pin(std::future::ready(Err(Error::Signal(e))));
        }
        if self.futures.is_empty() {
            return Box::pin(std::future::ready(Err(Error::NoTrigger)));
        }

        Box::pin(async move {
            let (trigger, _, _) = futures::future::select_all(self.futures).await;
            Ok(trigger)
        })
    }
}

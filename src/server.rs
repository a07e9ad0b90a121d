//! The listener: owns the socket, the accept loop and every connection task.

use crate::config::Config;
use crate::error::Error;
use crate::health;
use crate::registry::{ConnectionGuard, Registry};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pause after a failed `accept`, e.g. when running out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Lifecycle of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Starting,
    Serving,
    ShuttingDown,
    Stopped,
    Failed,
}

/// HTTP listener serving the liveness endpoint.
///
/// ```no_run
/// # async fn fun() -> Result<(), vigil::Error> {
/// use std::time::Duration;
///
/// let mut server = vigil::Server::new(&vigil::Config::from_env());
/// server.start().await?;
/// // ...
/// server.stop(Duration::from_secs(2)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Server {
    config: Config,
    state: State,
    local_addr: Option<SocketAddr>,
    registry: Registry,
    accept_loop: Option<JoinHandle<()>>,
}

impl Server {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            state: State::Starting,
            local_addr: None,
            registry: Registry::new(),
            accept_loop: None,
        }
    }

    /// Address as configured, `":<port>"`.
    pub fn address(&self) -> String {
        self.config.address()
    }

    /// Address actually bound, available once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Binds the socket and starts serving on a background task.
    ///
    /// A bind failure is final, the server moves to [`State::Failed`].
    pub async fn start(&mut self) -> Result<SocketAddr, Error> {
        if self.state != State::Starting {
            return Err(Error::AlreadyStarted);
        }

        let address = self.config.address();
        let bound = match bind(&self.config).await {
            Ok(listener) => listener.local_addr().map(|addr| (listener, addr)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                self.state = State::Failed;
                return Err(Error::bind(address, e));
            }
        };

        info!(%local_addr, "Starting server on {}", address);

        self.accept_loop = Some(tokio::spawn(accept_loop(listener, self.registry.clone())));
        self.local_addr = Some(local_addr);
        self.state = State::Serving;

        Ok(local_addr)
    }

    /// Stops accepting connections and drains the open ones.
    ///
    /// Connections still open after `deadline` are closed forcibly and
    /// [`Error::ShutdownTimeout`] is returned. Either way every connection is
    /// released before this returns.
    pub async fn stop(&mut self, deadline: Duration) -> Result<(), Error> {
        let Some(accept_loop) = self.accept_loop.take() else {
            return match self.state {
                State::Stopped => Ok(()),
                _ => Err(Error::NotServing),
            };
        };

        self.state = State::ShuttingDown;
        self.registry.shutdown();

        // the loop owns the socket, nothing is accepted once it returned
        if let Err(e) = accept_loop.await {
            warn!(error = %e, "Accept loop ended abnormally");
        }

        debug!(open = self.registry.open(), ?deadline, "Draining connections");
        match self.registry.drain(deadline).await {
            Ok(()) => {
                self.state = State::Stopped;
                Ok(())
            }
            Err(open) => {
                warn!(open, "Forcibly closed connections after drain deadline");
                self.state = State::Failed;
                Err(Error::ShutdownTimeout { deadline, open })
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.registry.shutdown();
        self.registry.force();
    }
}

/// Binds dual-stack, falling back to IPv4 only where IPv6 is unavailable.
async fn bind(config: &Config) -> io::Result<TcpListener> {
    match TcpListener::bind(config.bind_address()).await {
        Err(e) if !matches!(e.kind(), io::ErrorKind::AddrInUse | io::ErrorKind::InvalidInput) => {
            debug!(error = %e, "IPv6 bind failed, falling back to IPv4");
            TcpListener::bind(config.ipv4_bind_address()).await
        }
        bound => bound,
    }
}

async fn accept_loop(listener: TcpListener, registry: Registry) {
    loop {
        tokio::select! {
            _ = registry.wait_for_shutdown() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let guard = registry.guard();
                    tokio::spawn(serve_connection(stream, peer, guard));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }

    debug!("Listener closed");
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, guard: ConnectionGuard) {
    let conn = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service_fn(health::respond::<Incoming>));
    let mut conn = std::pin::pin!(conn);
    let mut draining = false;

    let result = loop {
        tokio::select! {
            result = conn.as_mut() => break result,
            _ = guard.wait(), if !draining => {
                conn.as_mut().graceful_shutdown();
                draining = true;
            }
            _ = guard.forced(), if draining => {
                debug!(%peer, "Connection closed forcibly");
                return;
            }
        }
    };

    if let Err(e) = result {
        debug!(%peer, error = %e, "Connection error");
    }
}

use std::io;
use std::time::Duration;

/// Errors surfaced by the listener, the shutdown trigger and the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Another socket already listens on the address.
    #[error("listen tcp {address}: bind: address already in use")]
    PortInUse {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Any other failure to bind, e.g. an invalid port.
    #[error("listen tcp {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("server already started")]
    AlreadyStarted,

    #[error("server is not serving")]
    NotServing,

    /// The drain did not finish in time, `open` connections were closed forcibly.
    #[error("shutdown did not complete within {deadline:?}, forcibly closed {open} connection(s)")]
    ShutdownTimeout { deadline: Duration, open: usize },

    #[error("failed to register signal handler: {0}")]
    Signal(#[source] io::Error),

    #[error("no shutdown condition configured, choose at least one, e.g. `depart().on_termination()`")]
    NoTrigger,
}

impl Error {
    pub(crate) fn bind(address: impl Into<String>, source: io::Error) -> Self {
        let address = address.into();
        match source.kind() {
            io::ErrorKind::AddrInUse => Error::PortInUse { address, source },
            _ => Error::Bind { address, source },
        }
    }
}

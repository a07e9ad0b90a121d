//! A liveness endpoint that shuts down gracefully on termination signals.
//!
//! The [`Server`] answers `GET /health` with `{"alive":true}`. A [`Coordinator`]
//! waits for the first shutdown [`Trigger`], stops accepting connections and
//! gives in-flight ones [`DRAIN_DEADLINE`] to finish before closing them forcibly.
//!
//! # Example:
//!
//! ```no_run
//! #[tokio::main]
//! async fn main() -> Result<(), vigil::Error> {
//!     let config = vigil::Config::from_env();
//!
//!     vigil::run(config, vigil::depart().on_termination()).await
//! }
//! ```

use std::future::Future;

mod config;
mod coordinator;
mod departure;
mod error;
mod health;
mod registry;
mod server;
mod signal;

pub use self::config::{Config, DEFAULT_PORT, PORT_ENV};
pub use self::coordinator::{Coordinator, Phase, DRAIN_DEADLINE};
pub use self::departure::{depart, Departure, Trigger};
pub use self::error::Error;
pub use self::health::{respond, route, HealthResponse, HEALTH_PATH};
pub use self::server::{Server, State};

/// Starts serving, then shuts down once `trigger` resolves.
///
/// A bind failure is returned right away. Otherwise the result is the outcome
/// of the bounded drain, see [`Coordinator::run`].
pub async fn run<F>(config: Config, trigger: F) -> Result<(), Error>
where
    F: Future<Output = Result<Trigger, Error>>,
{
    let mut server = Server::new(&config);
    server.start().await?;

    Coordinator::new(&mut server).run(trigger).await
}

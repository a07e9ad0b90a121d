use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Lifecycle lines are grepped for by external tooling, they stay visible
/// unless `RUST_LOG` names this crate explicitly.
const LIFECYCLE_DIRECTIVE: &str = "vigil=info";

#[tokio::main]
async fn main() -> ExitCode {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder().parse_lossy(format!("{LIFECYCLE_DIRECTIVE},{directives}")),
        )
        .with_writer(std::io::stderr)
        .init();

    // handlers go in before the listener so no early signal is lost
    let trigger = vigil::depart().on_termination();

    match vigil::run(vigil::Config::from_env(), trigger).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

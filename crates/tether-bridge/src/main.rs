use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tether_jdi::VmConnector;

/// Tether JDWP debug bridge.
///
/// Speaks line-delimited JSON-RPC 2.0 on stdin/stdout; logging goes to
/// stderr so the protocol channel stays clean. Attach targets are selected
/// per-session via the `attach` method.
#[derive(Debug, Parser)]
#[command(name = "tether-bridge", version, about)]
struct Cli {
    /// Token budget for inspection responses (characters / 4).
    #[arg(long, default_value_t = tether_bridge::budget::DEFAULT_MAX_TOKENS)]
    max_tokens: u64,

    /// Attach to an in-process fake JVM instead of a real target.
    ///
    /// Only useful for smoke-testing the protocol surface.
    #[cfg(feature = "fake-jvm")]
    #[arg(long)]
    fake_jvm: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    #[cfg(feature = "fake-jvm")]
    if cli.fake_jvm {
        let connector: Arc<dyn VmConnector> =
            Arc::new(tether_jdi::fake::FakeConnector::new(tether_jdi::fake::FakeJvm::new()));
        return tether_bridge::server::run_stdio(connector, cli.max_tokens).await;
    }

    let connector: Arc<dyn VmConnector> = Arc::new(tether_jdi::socket::SocketConnector);
    tether_bridge::server::run_stdio(connector, cli.max_tokens).await
}

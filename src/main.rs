use std::path::PathBuf;
use std::sync::Arc;

use mailrelay::config::Config;
use mailrelay::listener::Listener;
use mailrelay::relay::Relay;
use mailrelay::{Signal, internal, logging};
use tokio::sync::broadcast;

const DEFAULT_CONFIG: &str = "mailrelay.config.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    let config = Config::load(&path)?;

    let relay = Arc::new(Relay::new(config.remote.clone(), config.timeouts));
    let banner = Arc::from(config.local.host.as_str());
    let listener = Listener::bind(&config.local, banner, relay).await?;

    internal!(
        level = INFO,
        "Relaying from {} to {}",
        listener.local_addr(),
        config.remote.address()
    );

    let (shutdown, receiver) = broadcast::channel(16);
    let mut serving = tokio::spawn(listener.serve(receiver));

    tokio::select! {
        served = &mut serving => served??,
        signalled = wait_for_signal() => {
            signalled?;
            shutdown
                .send(Signal::Shutdown)
                .map_err(|err| anyhow::anyhow!("Failed to signal shutdown: {err}"))?;
            serving.await??;
        }
    }

    internal!(level = INFO, "Shutting down...");

    Ok(())
}

async fn wait_for_signal() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C received, shutting down");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate signal received, shutting down");
        }
    }

    Ok(())
}

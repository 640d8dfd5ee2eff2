//! swarmq-directory entry point

use clap::Parser;

use swarmq_common::init_logging;
use swarmq_directory::config::Args;
use swarmq_directory::directory::Directory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.resolve()?;

    init_logging(&config.base)?;

    let directory = Directory::new(config).await?;

    // SIGINT/SIGTERM start the graceful drain; further signals are ignored
    // and the drain runs to completion
    let handle = directory.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_signal().await {
            tracing::error!("signal handler failed - {}", e);
            return;
        }
        tracing::info!("signal received - shutting down");
        handle.exit();
    });

    directory.main().await?;
    Ok(())
}

async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use epfl_ws_sync::{config, plugin};

#[derive(Debug, Parser)]
#[command(author, version, about = "Mirror the configured news and event channels into the local store")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Run a single sync pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let plugin = plugin::register(&cfg).await?;

    if args.once {
        let outcome = plugin.sync_all().await?;
        info!(
            synced = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "single sync pass finished"
        );
        return Ok(());
    }

    let interval = Duration::from_secs(cfg.app.sync_interval_secs);
    info!(interval_secs = interval.as_secs(), "starting sync loop");
    loop {
        if let Err(err) = plugin.sync_all().await {
            error!(?err, "sync pass failed");
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

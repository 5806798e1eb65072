use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use epfl_ws_sync::channels::{self, ChannelEdit};
use epfl_ws_sync::config;
use epfl_ws_sync::db;
use epfl_ws_sync::model::ChannelKind;
use epfl_ws_sync::plugin;

#[derive(Debug, Parser)]
#[command(author, version, about = "Manage the channels records are synced from")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register a new channel
    Add {
        /// `memento` or `actu`
        #[arg(long)]
        kind: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
    },
    /// Change a channel's name and/or API URL
    Edit {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
    },
    /// Remove a channel (synced records are kept)
    Remove { id: i64 },
    /// List channels, optionally of one kind
    List {
        #[arg(long)]
        kind: Option<String>,
    },
    /// Show a channel, its last sync run and its stored events
    Show { id: i64 },
    /// Sync one channel now
    Sync { id: i64 },
}

fn parse_kind(raw: &str) -> Result<ChannelKind> {
    ChannelKind::parse_kind(raw).ok_or_else(|| anyhow!("unknown channel kind '{}'", raw))
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
    let pool = &plugin.pool;
    let hosts = &plugin.allowed_hosts;

    match args.command {
        Command::Add { kind, name, url } => {
            let channel = channels::add_channel(pool, hosts, parse_kind(&kind)?, &name, &url).await?;
            println!("added channel {} ({})", channel.id, channel.name);
        }
        Command::Edit { id, name, url } => {
            let channel = channels::edit_channel(
                pool,
                hosts,
                id,
                ChannelEdit { name, api_url: url },
            )
            .await?;
            println!("updated channel {}: {} {}", channel.id, channel.name, channel.api_url);
        }
        Command::Remove { id } => {
            channels::remove_channel(pool, id).await?;
            println!("removed channel {}", id);
        }
        Command::List { kind } => {
            let kind = kind.as_deref().map(parse_kind).transpose()?;
            for ch in channels::list_channels(pool, kind).await? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    ch.id,
                    ch.kind.as_str(),
                    ch.lang.as_deref().unwrap_or("-"),
                    ch.name,
                    ch.api_url
                );
            }
        }
        Command::Show { id } => {
            let ch = channels::get_channel(pool, id).await?;
            println!("{} [{}] {}", ch.name, ch.kind.as_str(), ch.api_url);
            match db::last_sync_run(pool, id).await? {
                Some(run) if run.succeeded() => println!(
                    "last sync {}: fetched {}, created {}, updated {}, skipped {}, removed {}",
                    run.id, run.fetched, run.created, run.updated, run.skipped, run.removed
                ),
                Some(run) => println!(
                    "last sync {} failed: {}",
                    run.id,
                    run.error.as_deref().unwrap_or("unfinished")
                ),
                None => println!("never synced"),
            }
            if ch.kind == ChannelKind::Memento {
                println!("{}", plugin.render_memento_channel(id).await?);
            }
        }
        Command::Sync { id } => {
            let report = plugin.sync_channel(id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use epfl_ws_sync::actu::ActuQuery;
use epfl_ws_sync::config;
use epfl_ws_sync::plugin;
use epfl_ws_sync::shortcode;

#[derive(Debug, Parser)]
#[command(
    about = "Render an [actu ...] shortcode to HTML on stdout, e.g. '[actu channel=10 lang=en limit=3]'"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// The shortcode text
    shortcode: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let args = Args::parse();
    let Some(sc) = shortcode::parse(&args.shortcode) else {
        bail!("not a shortcode: {}", args.shortcode);
    };
    if sc.tag != "actu" {
        bail!("unsupported shortcode [{}]", sc.tag);
    }

    let cfg = config::load(Some(&args.config))?;
    let plugin = plugin::register(&cfg).await?;
    let html = plugin.render_actu(&ActuQuery::from_attrs(&sc.attrs)).await;
    println!("{}", html);
    Ok(())
}

mod config;
mod replay;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Replays a recorded gaze session through the scroll controller.
#[derive(Parser, Debug)]
#[command(name = "gazectl")]
struct Args {
    /// JSON list of replay steps.
    #[arg(long)]
    script: PathBuf,
    /// Settings file; defaults to ./gazectl.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = config::load_settings(args.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let script = replay::load_script(&args.script)?;
    let stats = replay::run(&settings, script).await?;
    println!("{}", serde_json::to_string(&stats)?);

    Ok(())
}

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use wam_engine::config::EngineFlags;
use wam_engine::Engine;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML file overriding the default engine flags.
    #[arg(short, long)]
    flags: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let flags = match args.flags {
        Some(path) => EngineFlags::from_file(&path)?,
        None => EngineFlags::default(),
    };

    let engine = Engine::new(flags);
    tracing::info!(
        gcmode = ?engine.flags.gcmode,
        radix = engine.flags.current_radix,
        "engine started"
    );

    println!("wam-engine running. Press Ctrl+C to exit.");
    tokio::signal::ctrl_c().await?;
    println!("shutting down...");

    Ok(())
}

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use crosspostd::config;
use crosspostd::db;
use crosspostd::schedule;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Disconnect from the remote blog, clearing the stored code, token, and blog id"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Also cancel the sync schedule and delete all stored settings
    #[arg(long)]
    uninstall: bool,
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
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/crosspost.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    if args.uninstall {
        schedule::uninstall(&pool).await?;
        info!("uninstalled: schedule cancelled and settings cleared");
    } else {
        db::disconnect(&pool).await?;
        info!("disconnected from remote blog");
    }
    Ok(())
}

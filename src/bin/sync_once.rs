use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use crosspostd::config;
use crosspostd::db;
use crosspostd::model::SyncOutcome;
use crosspostd::sync::{self, SyncHooks};
use crosspostd::wpcom::WpcomClient;

#[derive(Debug, Parser)]
#[command(author, version, about = "Run one sync pass and exit")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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

    let client = WpcomClient::from_config(&cfg)?;
    let hooks = SyncHooks::default();

    sync::maybe_exchange(&pool, &client).await?;
    match sync::run_locked(&pool, &client, &cfg, &hooks).await? {
        SyncOutcome::Created { post_id } => info!(post_id, "created cross-post"),
        SyncOutcome::NothingToSync => info!("nothing to sync"),
    }
    Ok(())
}

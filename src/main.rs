use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use crosspostd::config;
use crosspostd::db;
use crosspostd::schedule;
use crosspostd::sync::{self, SyncHooks};
use crosspostd::wpcom::WpcomClient;

#[derive(Debug, Parser)]
#[command(author, version, about = "Cross-post daemon: republishes recent remote blog posts locally")]
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

    if !schedule::is_available(&cfg) {
        warn!("scheduling is disabled in config; cross-posts will not sync until it is re-enabled");
    }

    let hooks = SyncHooks::default();
    schedule::install(&pool, &cfg, &hooks).await?;

    let client = WpcomClient::from_config(&cfg)?;
    let poll_sleep = Duration::from_millis(cfg.app.poll_interval_ms);

    info!("starting cross-post daemon");
    loop {
        if !schedule::is_available(&cfg) {
            tokio::time::sleep(poll_sleep).await;
            continue;
        }
        match schedule::next_due(&pool, chrono::Utc::now()).await {
            Ok(Some(job)) => {
                if let Err(err) = sync::maybe_exchange(&pool, &client).await {
                    error!(?err, "token exchange check failed");
                }
                match sync::run_locked(&pool, &client, &cfg, &hooks).await {
                    Ok(outcome) => info!(?outcome, "sync run finished"),
                    Err(err) => error!(?err, "sync run failed"),
                }
                if let Err(err) = schedule::mark_ran(&pool, &job, chrono::Utc::now()).await {
                    error!(?err, "failed to advance schedule");
                }
            }
            Ok(None) => {}
            Err(err) => error!(?err, "schedule poll failed"),
        }
        tokio::time::sleep(poll_sleep).await;
    }
}

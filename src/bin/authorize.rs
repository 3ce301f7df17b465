use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use crosspostd::config;
use crosspostd::db;
use crosspostd::sync;
use crosspostd::wpcom::WpcomClient;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Store client credentials and exchange the authorization code for an access token"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Remote app client id
    #[arg(long)]
    client_id: Option<String>,

    /// Remote app client secret
    #[arg(long)]
    client_secret: Option<String>,

    /// Authorization code received on the redirect URI
    #[arg(long)]
    code: Option<String>,

    /// Print the URL to visit to obtain an authorization code, then exit
    #[arg(long)]
    print_url: bool,
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
    let settings = db::load_settings(&pool).await?;

    if args.print_url {
        let client_id = args
            .client_id
            .clone()
            .unwrap_or_else(|| settings.client_id.clone());
        if client_id.is_empty() {
            bail!("no client id given or stored; pass --client-id");
        }
        println!("{}", client.authorize_url(&client_id));
        return Ok(());
    }

    let client_id = args.client_id.unwrap_or_else(|| settings.client_id.clone());
    let client_secret = args
        .client_secret
        .unwrap_or_else(|| settings.client_secret.clone());
    let code = args.code.unwrap_or_else(|| settings.auth_code.clone());
    if client_id.is_empty() || client_secret.is_empty() || code.is_empty() {
        bail!("client id, client secret, and code are all required (flags or stored settings)");
    }

    db::store_client(&pool, &client_id, &client_secret, &code).await?;

    if sync::maybe_exchange(&pool, &client).await? {
        info!("connected to remote blog");
    } else {
        bail!("token exchange failed; check the credentials and code");
    }
    Ok(())
}

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use feedsync::config::Config;
use feedsync::storage::Database;
use feedsync::sync::run_sync;
use feedsync::util::validate_endpoint;

/// Default config location (~/.config/feedsync/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("feedsync")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(
    name = "feedsync",
    about = "Polls Atom feeds and posts new entries to subscription webhooks"
)]
struct Args {
    /// Config file (defaults to ~/.config/feedsync/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the database path from the config file
    #[arg(long, value_name = "PATH")]
    database: Option<String>,

    /// Register a subscription for this feed URL instead of syncing
    #[arg(long, value_name = "FEED_URL", requires = "callback")]
    subscribe: Option<String>,

    /// Callback URL notified for each new entry (with --subscribe)
    #[arg(long, value_name = "URL", requires = "subscribe")]
    callback: Option<String>,

    /// Deactivate a subscription by id instead of syncing
    #[arg(long, value_name = "ID", conflicts_with = "subscribe")]
    deactivate: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let db = Database::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database_path))?;

    if let (Some(feed_url), Some(callback)) = (&args.subscribe, &args.callback) {
        validate_endpoint(feed_url).context("Invalid feed URL")?;
        validate_endpoint(callback).context("Invalid callback URL")?;
        let id = db
            .insert_subscription(feed_url, callback)
            .await
            .context("Failed to register subscription")?;
        println!("Subscribed {} (id {})", feed_url, id);
        return Ok(());
    }

    if let Some(id) = args.deactivate {
        let changed = db
            .set_subscription_active(id, false)
            .await
            .context("Failed to deactivate subscription")?;
        if !changed {
            anyhow::bail!("No subscription with id {}", id);
        }
        println!("Deactivated subscription {}", id);
        return Ok(());
    }

    let client = config.http_client().context("Failed to build HTTP client")?;
    let summary = run_sync(&db, &client).await.context("Sync run failed")?;

    println!("{}", summary);
    Ok(())
}

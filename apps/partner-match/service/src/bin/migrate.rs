#![allow(clippy::print_stdout)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use partner_match_service::config::Config;
use partner_match_service::schema::{
    apply_all, ensure_service_account, migration_status, revert_all,
};
use partner_match_store::Store;

#[derive(Parser)]
#[command(name = "partner-match-migrate")]
#[command(about = "Apply, revert or inspect partner match schema migrations")]
struct Cli {
    /// Store snapshot path. Defaults to PM_STORE_PATH.
    #[arg(long, global = true)]
    store_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the service account (when a password is configured) and apply all migrations.
    Up,
    /// Revert all migrations in reverse order.
    Down,
    /// Print which migrations are applied.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("load configuration")?;
    let store_path = cli
        .store_path
        .or(config.store_path.clone())
        .context("a store path is required: pass --store-path or set PM_STORE_PATH")?;
    let store = Store::open(&store_path)
        .with_context(|| format!("open store {}", store_path.display()))?;

    match cli.command {
        Commands::Up => {
            if let Some(password) = config.service_password.as_deref() {
                ensure_service_account(&store, &config.service_user, password).await?;
            }
            apply_all(&store, &config.service_user).await?;
        }
        Commands::Down => revert_all(&store).await?,
        Commands::Status => {}
    }

    let statuses = migration_status(&store).await;
    println!("{}", serde_json::to_string_pretty(&statuses)?);
    Ok(())
}

use anyhow::{Context, Result, bail};
use partner_match_service::build_router;
use partner_match_service::config::{Config, LogFormat};
use partner_match_service::schema::{apply_all, ensure_service_account};
use partner_match_store::Store;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("load configuration")?;
    init_tracing(&config);

    let store = Store::from_path(config.store_path.as_deref()).context("open store")?;
    if config.store_path.is_none() {
        tracing::warn!("PM_STORE_PATH is not set; data will not survive a restart");
    }

    match config.service_password.as_deref() {
        Some(password) => {
            ensure_service_account(&store, &config.service_user, password)
                .await
                .context("provision service account")?;
        }
        None if store.user(&config.service_user).await.is_some() => {}
        None => bail!(
            "PM_SERVICE_PASSWORD is required to create service account '{}'",
            config.service_user
        ),
    }

    apply_all(&store, &config.service_user)
        .await
        .context("apply schema migrations")?;

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("bind {}", config.bind_addr))?;
    tracing::info!(
        bind_addr = %config.bind_addr,
        store_path = ?config.store_path,
        "partner match service listening",
    );

    axum::serve(listener, build_router(config, store))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve http")?;

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}

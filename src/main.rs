use anyhow::{Context, Result};
use qctoken::api::{create_router, ApiState};
use qctoken::config::Config;
use qctoken::credentials::CredentialStore;
use qctoken::oauth::OAuthClient;
use qctoken::service::{run_refresh_sweep, TokenService};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qctoken=info".into()),
        )
        .init();

    info!("qctoken starting...");

    let config = Config::from_env().context("Failed to load configuration")?;

    info!(
        listen_addr = %config.listen_addr,
        db_path = %config.db_path,
        api_base_url = %config.provider.api_base_url,
        auth_enabled = config.auth_enabled,
        sweep_interval_secs = config.sweep_interval_secs,
        "Configuration loaded"
    );

    let store = Arc::new(
        CredentialStore::new(&config.db_path, &config.encryption_key)
            .context("Failed to initialize credential store")?,
    );
    info!("Credential store initialized");

    let oauth = Arc::new(
        OAuthClient::new(config.provider.clone(), config.http_timeout)
            .context("Failed to build OAuth client")?,
    );

    let service = Arc::new(TokenService::new(store, oauth));

    // Periodic best-effort sweep over credentials nearing expiry
    if config.sweep_interval_secs > 0 {
        tokio::spawn(run_refresh_sweep(
            Arc::clone(&service),
            config.sweep_interval_secs,
        ));
        info!(
            interval_secs = config.sweep_interval_secs,
            "Refresh sweep task started"
        );
    } else {
        info!("Refresh sweep disabled");
    }

    let app = create_router(ApiState {
        service,
        auth_enabled: config.auth_enabled,
    });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "HTTP API listening");

    axum::serve(listener, app)
        .await
        .context("HTTP server error")?;

    Ok(())
}

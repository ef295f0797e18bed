use anyhow::{Context, Result};
use drop_service::config::{Config, ServiceConfig};
use drop_service::{start_api_server, AddressDiscovery, AppState, StorageDirectory};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service);

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting drop service"
    );

    if let Some(port) = config.service.metrics_port {
        init_metrics(port)?;
    }

    // The storage root is resolved once and injected; failing to create it is fatal
    // only here, before any request is accepted.
    let storage = StorageDirectory::new(
        config
            .storage_root()
            .context("Failed to resolve storage root")?,
    )
    .with_dir_mode(config.storage.dir_mode);
    storage
        .ensure_root()
        .await
        .context("Failed to create storage root")?;

    info!(root = %storage.root().display(), "Storage root ready");

    let state = AppState::new(storage, &config).context("Invalid configuration")?;

    log_share_urls(&state.discovery, &config);

    start_api_server(state, &config, shutdown_signal()).await?;

    info!("Drop service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(config: &ServiceConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.log_format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Print the URLs other devices can use to reach this host (the web UI when mounted)
fn log_share_urls(discovery: &AddressDiscovery, config: &Config) {
    match discovery.share_urls(config.api.port) {
        Ok(urls) if urls.is_empty() => {
            warn!("No LAN address found; only local clients can connect")
        }
        Ok(urls) => {
            let ui_path = if config.static_assets.dir.is_some() {
                "/static/"
            } else {
                ""
            };
            for url in urls {
                info!(url = %format!("{}{}", url, ui_path), "Reachable at");
            }
        }
        Err(e) => warn!(error = %e, "Failed to enumerate LAN addresses"),
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use coffee_monitor::api::{self, AppState};
use coffee_monitor::cloud::TpLinkCloud;
use coffee_monitor::notify::HttpNotifier;
use coffee_monitor::repositories::{PgDeviceStore, PgEventLog, PgSubscriptionStore};
use coffee_monitor::{db, Config, MonitorRegistry, MonitorSettings, Services};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("Starting coffee-monitor");

    let cfg_path =
        std::env::var("APP_CONFIG").unwrap_or_else(|_| "config/config.example.yaml".into());
    let cfg = Config::load(&cfg_path)?;
    info!("Configuration loaded from {}", cfg_path);

    let pool = db::connect(&cfg.database.url, cfg.database.max_connections).await?;
    db::ensure_schema(&pool).await?;
    info!("Connected to database");

    let services = Services {
        cloud: Arc::new(TpLinkCloud::new(
            cfg.cloud.app_server_url.clone(),
            Duration::from_secs(cfg.cloud.request_timeout_secs),
        )?),
        devices: Arc::new(PgDeviceStore::new(
            pool.clone(),
            cfg.monitor.calibration.clone(),
        )),
        event_log: Arc::new(PgEventLog::new(pool.clone())),
        subscriptions: Arc::new(PgSubscriptionStore::new(pool.clone())),
        notifier: Arc::new(HttpNotifier::new(Duration::from_secs(
            cfg.notify.request_timeout_secs,
        ))?),
    };
    let settings = MonitorSettings {
        intervals: cfg.monitor.poll_intervals,
        cancel_stale_finished: cfg.monitor.cancel_stale_finished,
    };
    let registry = Arc::new(MonitorRegistry::new(services, settings));

    if cfg.monitor.autostart {
        registry.start_all().await?;
    } else {
        info!("Autostart disabled; monitors start on request");
    }

    let router = api::create_router(AppState::new(Arc::clone(&registry)));
    let addr = format!("{}:{}", cfg.api.host, cfg.api.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    info!("API server listening on {}", addr);

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "API server error");
    }

    registry.stop_all().await;
    pool.close().await;
    info!("Application shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

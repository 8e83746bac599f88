//! Cricket aggregation service: binary entrypoint.
//! Boots the scheduler and the Axum admin/health surface.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cricket_aggregator::api;
use cricket_aggregator::ingest::{build_scheduler, config::load_config_default};
use cricket_aggregator::metrics::Metrics;
use cricket_aggregator::store::{DocumentStore, SqliteStore};
use cricket_aggregator::Scheduler;

/// Compact logs by default; `LOG_FORMAT=json` switches to structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("cricket_aggregator=info,aggregate=info,scheduler=info,warn")
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // try_init: the platform runtime may already have installed a subscriber.
    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = ?e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = ?e, "SIGTERM handler unavailable");
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
}

/// Closes the store once shutdown is signalled. Timers stop first; runs
/// still in flight see store errors after the close.
fn close_on_shutdown(scheduler: Arc<Scheduler>, store: SqliteStore) {
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown requested");
        scheduler.stop();
        match store.close().await {
            Ok(()) => tracing::info!("store closed"),
            Err(e) => tracing::error!(error = ?e, "closing store"),
        }
    });
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = load_config_default().context("loading aggregator config")?;
    tracing::info!(
        db_path = %cfg.db_path,
        scheduler = cfg.scheduler_enabled,
        feeds = cfg.news_feeds.len(),
        "configuration loaded"
    );

    let sqlite = SqliteStore::open(&cfg.db_path)
        .await
        .with_context(|| format!("opening store at {}", cfg.db_path))?;
    let store: Arc<dyn DocumentStore> = Arc::new(sqlite.clone());

    let metrics = Metrics::init()?;

    let scheduler = build_scheduler(&cfg, store)?;
    if cfg.scheduler_enabled {
        scheduler.start();
    } else {
        tracing::info!("scheduler disabled by config; manual triggers only");
    }
    close_on_shutdown(scheduler.clone(), sqlite);

    let router = api::router(api::AppState::new(scheduler)).merge(metrics.router());
    Ok(router.into())
}

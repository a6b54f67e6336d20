use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;
use wxserver::*;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let specs = app_config.subsampling_specs()?;

    let store = Arc::new(store::SqliteStore::connect(&app_config.database.path).await?);
    store.init().await?;

    let notifier = Arc::new(notifier::BroadcastNotifier::new(
        app_config.publishing.broadcast_capacity,
    ));
    let records_tx = notifier.sender();

    let scheduler = Arc::new(subsample::Scheduler::new(
        store.clone(),
        notifier,
        app_config.subsampling.max_concurrent_windows,
    ));

    let (run_tx, run_rx) = tokio::sync::mpsc::channel(4);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let worker_handle = subsample_worker::spawn(
        subsample_worker::WorkerDeps {
            store: store.clone(),
            scheduler,
            specs,
            run_rx,
            shutdown_rx,
        },
        subsample_worker::SubsampleWorkerConfig {
            trigger_interval_secs: app_config.subsampling.trigger_interval_secs,
            raw_retention_hours: app_config.database.raw_retention_hours,
            retention_days: app_config.database.retention_days,
            vacuum_schedule: app_config.subsampling.vacuum_schedule.clone(),
            vacuum_interval_secs: app_config.subsampling.vacuum_interval_secs,
        },
    );

    let app = routes::app(store, records_tx, run_tx);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let in_container = std::path::Path::new("/.dockerenv").exists()
        || std::env::var("CONTAINER").as_deref() == Ok("1");

    if in_container {
        // In Docker: run server until error or SIGTERM (no signal handler; avoids immediate exit)
        axum::serve(listener, app).await?;
    } else {
        tokio::select! {
            result = axum::serve(listener, app) => {
                result?;
            }
            _ = async {
                #[cfg(unix)]
                {
                    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                        Ok(s) => s,
                        Err(_) => {
                            let _ = tokio::signal::ctrl_c().await;
                            return;
                        }
                    };
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                #[cfg(not(unix))]
                {
                    tokio::signal::ctrl_c().await
                }
            } => {
                tracing::info!("Received shutdown signal");
                let _ = shutdown_tx.send(());
                let _ = worker_handle.await;
            }
        }
    }

    Ok(())
}

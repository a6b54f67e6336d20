// Background worker: run every subsampling spec on a periodic trigger,
// then prune raw packets and old records. All specs run sequentially on
// this one loop, so at most one run per source/destination pair is ever
// in flight. VACUUM runs on a configurable schedule (cron expression or
// fixed interval).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::store::SqliteStore;
use crate::subsample::{RunReport, Scheduler, SubsamplingSpec};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, instrument, warn};

/// Config for the subsampling worker.
#[derive(Debug, Clone)]
pub struct SubsampleWorkerConfig {
    pub trigger_interval_secs: u64,
    pub raw_retention_hours: u32,
    pub retention_days: u32,
    /// Optional cron expression for VACUUM (e.g. "0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
}

/// A manual run request (POST /api/subsample/run). The worker answers with
/// the per-spec summaries, sharing the loop's one-run-at-a-time exclusion.
pub struct RunRequest {
    pub reply: oneshot::Sender<Vec<SpecRunSummary>>,
}

/// Outcome of one spec's run, in reportable form.
#[derive(Debug, Clone, Serialize)]
pub struct SpecRunSummary {
    pub source: String,
    pub destination: String,
    /// Per-series outcome, keyed by canonical tag JSON.
    pub series: std::collections::BTreeMap<String, SeriesSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_created: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SpecRunSummary {
    fn from_report(spec: &SubsamplingSpec, report: &RunReport) -> Self {
        let series = report
            .iter()
            .map(|(key, result)| {
                let summary = match result {
                    Ok(n) => SeriesSummary {
                        records_created: Some(*n),
                        error: None,
                    },
                    Err(e) => SeriesSummary {
                        records_created: None,
                        error: Some(e.to_string()),
                    },
                };
                (key.clone(), summary)
            })
            .collect();
        Self {
            source: spec.source.clone(),
            destination: spec.destination.clone(),
            series,
        }
    }
}

/// Store, engine, specs, and channels for the worker.
pub struct WorkerDeps {
    pub store: Arc<SqliteStore>,
    pub scheduler: Arc<Scheduler>,
    pub specs: Vec<SubsamplingSpec>,
    pub run_rx: mpsc::Receiver<RunRequest>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

/// Spawns the subsampling worker. Returns a join handle. The first tick
/// fires immediately, which backfills any data already in the store.
pub fn spawn(deps: WorkerDeps, config: SubsampleWorkerConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(deps, config).await;
    })
}

#[instrument(skip(deps, config), fields(trigger_interval_secs = config.trigger_interval_secs))]
async fn run(deps: WorkerDeps, config: SubsampleWorkerConfig) {
    let WorkerDeps {
        store,
        scheduler,
        specs,
        mut run_rx,
        mut shutdown_rx,
    } = deps;

    let mut trigger =
        tokio::time::interval(Duration::from_secs(config.trigger_interval_secs));
    trigger.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (vacuum_tx, mut vacuum_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(vacuum_scheduler(config.clone(), vacuum_tx));

    let mut run_closed = false;
    loop {
        tokio::select! {
            _ = trigger.tick() => {
                run_all_specs(&scheduler, &specs).await;
                prune(&store, &specs, &config).await;
            }
            request = run_rx.recv(), if !run_closed => {
                match request {
                    Some(request) => {
                        let summaries = run_all_specs(&scheduler, &specs).await;
                        let _ = request.reply.send(summaries);
                    }
                    None => run_closed = true,
                }
            }
            _ = vacuum_rx.recv() => {
                if let Err(e) = store.vacuum().await {
                    warn!(error = %e, "vacuum failed");
                } else {
                    info!("vacuum complete");
                }
            }
            _ = &mut shutdown_rx => {
                tracing::debug!("subsample worker shutting down");
                break;
            }
        }
    }
}

/// One pass over every configured spec, sequentially.
pub async fn run_all_specs(
    scheduler: &Scheduler,
    specs: &[SubsamplingSpec],
) -> Vec<SpecRunSummary> {
    let mut summaries = Vec::with_capacity(specs.len());
    for spec in specs {
        match scheduler.run(spec).await {
            Ok(report) => {
                let created: u64 = report.values().filter_map(|r| r.as_ref().ok()).sum();
                let failed = report.values().filter(|r| r.is_err()).count();
                if created > 0 || failed > 0 {
                    info!(
                        source = %spec.source,
                        destination = %spec.destination,
                        records_created = created,
                        series_failed = failed,
                        "subsampling pass"
                    );
                }
                summaries.push(SpecRunSummary::from_report(spec, &report));
            }
            Err(e) => {
                warn!(
                    source = %spec.source,
                    destination = %spec.destination,
                    error = %e,
                    "subsampling run failed"
                );
                summaries.push(SpecRunSummary {
                    source: spec.source.clone(),
                    destination: spec.destination.clone(),
                    series: [(
                        "*".to_string(),
                        SeriesSummary {
                            records_created: None,
                            error: Some(e.to_string()),
                        },
                    )]
                    .into(),
                });
            }
        }
    }
    summaries
}

/// Prune raw packets past raw_retention_hours and records past
/// retention_days. Prune failures never fail the pass.
async fn prune(store: &SqliteStore, specs: &[SubsamplingSpec], config: &SubsampleWorkerConfig) {
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    let raw_cutoff = now_ms - (config.raw_retention_hours as i64) * 3600 * 1000;
    let record_cutoff = now_ms - (config.retention_days as i64) * 24 * 3600 * 1000;

    for spec in specs {
        if let Err(e) = store.delete_before(&spec.source, raw_cutoff).await {
            warn!(measurement = %spec.source, error = %e, "raw packet prune failed");
        }
        if let Err(e) = store.delete_before(&spec.destination, record_cutoff).await {
            warn!(measurement = %spec.destination, error = %e, "record prune failed");
        }
    }
}

/// Sends a message on `tx` at each VACUUM time (cron or fixed interval). Uses local time for cron.
async fn vacuum_scheduler(config: SubsampleWorkerConfig, tx: tokio::sync::mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.vacuum_schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid vacuum_schedule; VACUUM will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            let next = schedule.after(&now).next();
            if let Some(next) = next {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        let interval = Duration::from_secs(config.vacuum_interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}

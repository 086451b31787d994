//! Periodic passes driven by independent interval loops.
//!
//! # Design
//! - Each pass runs in its own task so a slow pass never delays another.
//! - A pass that fails is logged and retried on its next tick.
//! - The status pass also runs whenever the engine nudges it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use mooring_config::ScheduleSettings;
use mooring_core::{TaskResult, error_chain_message};
use mooring_telemetry::Metrics;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::bootstrap::Services;

/// Running pass loops and their shutdown signal.
pub(crate) struct Scheduler {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Start one loop per pass at the configured cadences.
    pub(crate) fn spawn(services: &Services, schedule: &ScheduleSettings) -> Self {
        let (shutdown, _) = watch::channel(false);
        let secs = Duration::from_secs;
        let metrics = &services.metrics;
        let mut tasks = Vec::with_capacity(7);

        let reconciler = Arc::clone(&services.reconciler);
        tasks.push(spawn_pass(
            "status",
            secs(schedule.status_interval_secs),
            Some(services.engine.reconcile_nudge()),
            metrics.clone(),
            shutdown.subscribe(),
            move || {
                let reconciler = Arc::clone(&reconciler);
                async move { reconciler.run_status_pass().await.map(drop) }
            },
        ));

        let statistics = Arc::clone(&services.statistics);
        tasks.push(spawn_pass(
            "statistics",
            secs(schedule.statistics_interval_secs),
            None,
            metrics.clone(),
            shutdown.subscribe(),
            move || {
                let statistics = Arc::clone(&statistics);
                async move { statistics.run_pass().await.map(drop) }
            },
        ));

        let reconciler = Arc::clone(&services.reconciler);
        tasks.push(spawn_pass(
            "session_sync",
            secs(schedule.session_sync_interval_secs),
            None,
            metrics.clone(),
            shutdown.subscribe(),
            move || {
                let reconciler = Arc::clone(&reconciler);
                async move { reconciler.sync_session().await.map(drop) }
            },
        ));

        let reconciler = Arc::clone(&services.reconciler);
        tasks.push(spawn_pass(
            "stall_sweep",
            secs(schedule.stall_check_interval_secs),
            None,
            metrics.clone(),
            shutdown.subscribe(),
            move || {
                let reconciler = Arc::clone(&reconciler);
                async move { reconciler.sweep_stalled().await.map(drop) }
            },
        ));

        let statistics = Arc::clone(&services.statistics);
        tasks.push(spawn_pass(
            "statistics_cleanup",
            secs(schedule.cleanup_interval_secs),
            None,
            metrics.clone(),
            shutdown.subscribe(),
            move || {
                let statistics = Arc::clone(&statistics);
                async move { statistics.cleanup_orphans().await.map(drop) }
            },
        ));

        let broadcaster = Arc::clone(&services.broadcaster);
        tasks.push(spawn_pass(
            "task_broadcast",
            secs(schedule.task_broadcast_interval_secs),
            None,
            metrics.clone(),
            shutdown.subscribe(),
            move || {
                let broadcaster = Arc::clone(&broadcaster);
                async move { broadcaster.publish_tasks().await.map(drop) }
            },
        ));

        let broadcaster = Arc::clone(&services.broadcaster);
        tasks.push(spawn_pass(
            "stats_broadcast",
            secs(schedule.stats_broadcast_interval_secs),
            None,
            metrics.clone(),
            shutdown.subscribe(),
            move || {
                let broadcaster = Arc::clone(&broadcaster);
                async move { broadcaster.publish_statistics().await }
            },
        ));

        info!(passes = tasks.len(), "periodic passes scheduled");
        Self { shutdown, tasks }
    }

    /// Signal every loop and wait for it to finish its current pass.
    pub(crate) async fn shutdown(self) {
        let _ = self.shutdown.send_replace(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "periodic pass join failed");
            }
        }
        debug!("periodic passes stopped");
    }
}

fn spawn_pass<F, Fut>(
    name: &'static str,
    period: Duration,
    nudge: Option<Arc<Notify>>,
    metrics: Metrics,
    mut shutdown: watch::Receiver<bool>,
    pass: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = TaskResult<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
                () = nudged(nudge.as_deref()) => {}
            }

            let started = Instant::now();
            let outcome = pass().await;
            metrics.observe_pass(name, started.elapsed(), outcome.is_ok());
            if let Err(err) = outcome {
                warn!(pass = name, error = %error_chain_message(&err), "periodic pass failed");
            }
        }
        debug!(pass = name, "periodic pass stopped");
    })
}

async fn nudged(nudge: Option<&Notify>) {
    match nudge {
        Some(nudge) => nudge.notified().await,
        None => std::future::pending().await,
    }
}

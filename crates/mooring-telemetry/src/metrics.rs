//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Collector registration stays private; callers use typed helpers.
//! - Periodic passes report runs and failures by pass name.
//! - Control commands report outcomes by command name.

use std::convert::TryFrom;
use std::sync::Arc;
use std::time::Duration;

use prometheus::core::Collector;
use prometheus::{IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

use crate::error::{Result, TelemetryError};

/// Outcome label recorded for a control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command completed.
    Succeeded,
    /// The command was rejected before touching the engine.
    Rejected,
    /// The command failed.
    Failed,
}

impl CommandOutcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

/// Prometheus registry shared by the orchestrator.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    #[allow(dead_code)]
    registry: Registry,
    pass_runs_total: IntCounterVec,
    pass_failures_total: IntCounterVec,
    pass_duration_ms: IntGaugeVec,
    commands_total: IntCounterVec,
    events_published_total: IntCounterVec,
    live_handles: IntGauge,
    active_tasks: IntGauge,
}

/// Point-in-time view of the gauges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Engine handles currently cached.
    pub live_handles: i64,
    /// Tasks downloading or checking.
    pub active_tasks: i64,
}

impl Metrics {
    /// Build a registry with every collector registered.
    ///
    /// # Errors
    ///
    /// Returns an error if a collector cannot be built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let pass_runs_total = register(
            &registry,
            "pass_runs_total",
            IntCounterVec::new(
                Opts::new("pass_runs_total", "Periodic passes executed"),
                &["pass"],
            ),
        )?;
        let pass_failures_total = register(
            &registry,
            "pass_failures_total",
            IntCounterVec::new(
                Opts::new("pass_failures_total", "Periodic passes that failed"),
                &["pass"],
            ),
        )?;
        let pass_duration_ms = register(
            &registry,
            "pass_duration_ms",
            IntGaugeVec::new(
                Opts::new("pass_duration_ms", "Duration of the latest pass (ms)"),
                &["pass"],
            ),
        )?;
        let commands_total = register(
            &registry,
            "commands_total",
            IntCounterVec::new(
                Opts::new("commands_total", "Control commands by outcome"),
                &["command", "outcome"],
            ),
        )?;
        let events_published_total = register(
            &registry,
            "events_published_total",
            IntCounterVec::new(
                Opts::new("events_published_total", "Events published by kind"),
                &["kind"],
            ),
        )?;
        let live_handles = register(
            &registry,
            "live_handles",
            IntGauge::with_opts(Opts::new("live_handles", "Engine handles cached")),
        )?;
        let active_tasks = register(
            &registry,
            "active_tasks",
            IntGauge::with_opts(Opts::new("active_tasks", "Tasks downloading or checking")),
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                pass_runs_total,
                pass_failures_total,
                pass_duration_ms,
                commands_total,
                events_published_total,
                live_handles,
                active_tasks,
            }),
        })
    }

    /// Record a completed pass and how long it took.
    pub fn observe_pass(&self, pass: &str, elapsed: Duration, succeeded: bool) {
        self.inner.pass_runs_total.with_label_values(&[pass]).inc();
        if !succeeded {
            self.inner
                .pass_failures_total
                .with_label_values(&[pass])
                .inc();
        }
        self.inner
            .pass_duration_ms
            .with_label_values(&[pass])
            .set(duration_to_ms(elapsed));
    }

    /// Record the outcome of a control command.
    pub fn inc_command(&self, command: &str, outcome: CommandOutcome) {
        self.inner
            .commands_total
            .with_label_values(&[command, outcome.label()])
            .inc();
    }

    /// Count a published event.
    pub fn inc_published(&self, kind: &str) {
        self.inner
            .events_published_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Set the cached handle gauge.
    pub fn set_live_handles(&self, count: usize) {
        self.inner.live_handles.set(to_gauge(count));
    }

    /// Set the active task gauge.
    pub fn set_active_tasks(&self, count: u64) {
        self.inner.active_tasks.set(to_gauge(count));
    }

    /// Runs recorded for `pass`.
    #[must_use]
    pub fn pass_runs(&self, pass: &str) -> u64 {
        self.inner.pass_runs_total.with_label_values(&[pass]).get()
    }

    /// Failures recorded for `pass`.
    #[must_use]
    pub fn pass_failures(&self, pass: &str) -> u64 {
        self.inner
            .pass_failures_total
            .with_label_values(&[pass])
            .get()
    }

    /// Outcomes recorded for `command`.
    #[must_use]
    pub fn commands(&self, command: &str, outcome: CommandOutcome) -> u64 {
        self.inner
            .commands_total
            .with_label_values(&[command, outcome.label()])
            .get()
    }

    /// Current gauge values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            live_handles: self.inner.live_handles.get(),
            active_tasks: self.inner.active_tasks.get(),
        }
    }
}

fn register<C>(
    registry: &Registry,
    name: &'static str,
    built: std::result::Result<C, prometheus::Error>,
) -> Result<C>
where
    C: Collector + Clone + 'static,
{
    let collector = built.map_err(|source| TelemetryError::MetricsCollector { name, source })?;
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })?;
    Ok(collector)
}

fn duration_to_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn to_gauge(count: impl TryInto<i64>) -> i64 {
    count.try_into().unwrap_or(i64::MAX)
}

//! Publication of reconciled state onto the event bus.

use std::sync::Arc;

use mooring_core::{Task, TaskError, TaskResult, TaskStatus, TaskStore};
use mooring_events::{Event, EventBus, NotificationKind};
use mooring_telemetry::Metrics;
use tracing::trace;

use crate::statistics::StatisticsAggregator;

/// Publishes events and counts them per kind.
#[derive(Clone)]
pub(crate) struct Notifier {
    events: EventBus,
    metrics: Metrics,
}

impl Notifier {
    pub(crate) const fn new(events: EventBus, metrics: Metrics) -> Self {
        Self { events, metrics }
    }

    pub(crate) fn publish(&self, event: Event) {
        let kind = event.kind();
        let id = self.events.publish(event);
        self.metrics.inc_published(kind);
        trace!(event_id = id, kind, "event published");
    }

    /// Lifecycle notification about `task`.
    pub(crate) fn notify(&self, kind: NotificationKind, task: &Task, message: &str) {
        self.publish(Event::Notification {
            event: kind,
            task_id: task.id,
            message: message.to_string(),
            task_name: task.name.clone(),
        });
    }
}

/// Periodic snapshot publisher.
pub struct Broadcaster {
    store: Arc<dyn TaskStore>,
    statistics: Arc<StatisticsAggregator>,
    notifier: Notifier,
}

impl Broadcaster {
    pub(crate) fn new(
        store: Arc<dyn TaskStore>,
        statistics: Arc<StatisticsAggregator>,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            statistics,
            notifier,
        }
    }

    /// Publish every active task on its own topic, then the full list.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be read.
    pub async fn publish_tasks(&self) -> TaskResult<usize> {
        let active = self
            .store
            .tasks_with_status(&TaskStatus::ACTIVE)
            .await
            .map_err(|err| TaskError::store("tasks_with_status", err))?;
        let published = active.len();
        for task in active {
            self.notifier.publish(Event::TaskSnapshot { task });
        }

        let tasks = self
            .store
            .tasks()
            .await
            .map_err(|err| TaskError::store("tasks", err))?;
        self.notifier.publish(Event::TaskList { tasks });
        Ok(published)
    }

    /// Publish the overall statistics.
    ///
    /// # Errors
    ///
    /// Returns an error when the figures cannot be computed.
    pub async fn publish_statistics(&self) -> TaskResult<()> {
        let overall = self.statistics.overall().await?;
        self.notifier.publish(Event::Statistics { overall });
        Ok(())
    }
}

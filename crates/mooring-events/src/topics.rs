//! Topic names events are published under.

use uuid::Uuid;

/// Full task list snapshots.
pub const TASKS_TOPIC: &str = "/topic/torrents";
/// Aggregate statistics snapshots.
pub const STATS_TOPIC: &str = "/topic/stats";
/// Lifecycle notifications.
pub const NOTIFICATIONS_TOPIC: &str = "/topic/notifications";

/// Per-task snapshot topic.
#[must_use]
pub fn task_topic(task_id: Uuid) -> String {
    format!("{TASKS_TOPIC}/{task_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_topic_nests_under_task_list() {
        let id = Uuid::from_u128(7);
        assert_eq!(
            task_topic(id),
            "/topic/torrents/00000000-0000-0000-0000-000000000007"
        );
    }
}

mod common;

use std::time::Duration;

use chrono::Utc;
use common::{Harness, PACK};
use mooring_app::format_bytes;
use mooring_core::{Statistics, TaskError, TaskStatus, TaskStore};
use mooring_events::Event;
use mooring_test_support::samples;
use uuid::Uuid;

#[tokio::test]
async fn pass_folds_live_counters_monotonically() -> anyhow::Result<()> {
    let harness = Harness::new().await?;
    let running = harness.add_magnet('a', "Running", PACK, true).await?;
    let held = harness.add_magnet('b', "Held", PACK, false).await?;
    harness.session.update_status(&running.info_hash, |live| {
        live.all_time_download = 400;
        live.all_time_upload = 200;
        live.download_rate = 50;
        live.peers = 3;
    });

    let statistics = &harness.services.statistics;
    let summary = statistics.run_pass().await?;
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.updated, 1);

    harness.session.update_status(&running.info_hash, |live| {
        live.all_time_download = 100;
        live.download_rate = 10;
        live.peers = 1;
    });
    statistics.run_pass().await?;

    let row = statistics
        .statistics(running.task_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("statistics row recorded"))?;
    assert_eq!(row.total_downloaded, 400);
    assert_eq!(row.total_uploaded, 200);
    assert_eq!(row.max_download_rate, 50);
    assert_eq!(row.peak_peers, 3);
    assert!((statistics.share_ratio(running.task_id).await? - 0.5).abs() < 1e-9);

    assert!(statistics.statistics(held.task_id).await?.is_none());
    assert!(statistics.share_ratio(held.task_id).await?.abs() < f64::EPSILON);
    assert!(matches!(
        statistics.share_ratio(Uuid::new_v4()).await,
        Err(TaskError::NotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn eta_uses_the_current_download_rate() -> anyhow::Result<()> {
    let harness = Harness::new().await?;
    let outcome = harness.add_magnet('a', "Pack", PACK, true).await?;
    let statistics = &harness.services.statistics;

    harness.session.update_status(&outcome.info_hash, |live| {
        live.total_done = 20;
        live.download_rate = 25;
    });
    assert_eq!(
        statistics.eta(outcome.task_id).await?,
        Some(Duration::from_secs(4))
    );

    harness
        .session
        .update_status(&outcome.info_hash, |live| live.download_rate = 0);
    assert_eq!(statistics.eta(outcome.task_id).await?, None);

    harness.session.drop_silently(&outcome.info_hash);
    assert_eq!(statistics.eta(outcome.task_id).await?, None);
    assert!(matches!(
        statistics.eta(Uuid::new_v4()).await,
        Err(TaskError::NotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn overall_figures_combine_rows_and_live_rates() -> anyhow::Result<()> {
    let harness = Harness::new().await?;
    let running = harness.add_magnet('a', "Running", PACK, true).await?;
    harness.add_magnet('b', "Held", PACK, false).await?;
    let mut done = samples::task('c', "Done", TaskStatus::Completed);
    done.total_size = Some(1_000);
    harness.seed(&done, &[]).await?;
    harness
        .seed(&samples::task('d', "Broken", TaskStatus::Error), &[])
        .await?;

    let mut archived = Statistics::new(done.id, Utc::now());
    archived.total_downloaded = 1_000;
    archived.total_uploaded = 1_500;
    harness.store.save_statistics(&archived).await?;

    harness.session.update_status(&running.info_hash, |live| {
        live.all_time_download = 400;
        live.all_time_upload = 200;
        live.download_rate = 50;
        live.upload_rate = 20;
        live.peers = 3;
        live.seeds = 1;
    });
    harness.services.statistics.run_pass().await?;

    let overall = harness.services.statistics.overall().await?;
    assert_eq!(overall.total_tasks, 4);
    assert_eq!(overall.downloading, 1);
    assert_eq!(overall.seeding, 0);
    assert_eq!(overall.active, 1);
    assert_eq!(overall.paused, 1);
    assert_eq!(overall.completed, 1);
    assert_eq!(overall.errored, 1);
    assert_eq!(overall.total_completed_size, 1_000);
    assert_eq!(overall.total_downloaded, 1_400);
    assert_eq!(overall.total_uploaded, 1_700);
    assert!((overall.overall_ratio - 1_700.0 / 1_400.0).abs() < 1e-9);
    assert_eq!(overall.download_rate, 50);
    assert_eq!(overall.upload_rate, 20);
    assert_eq!(overall.peers, 3);
    assert_eq!(overall.seeds, 1);

    let summary = harness.services.statistics.export_summary().await?;
    assert!(summary.starts_with("=== Mooring Statistics Summary ==="));
    assert!(summary.contains(&format!("Total Downloaded: {}", format_bytes(1_400))));
    assert!(summary.contains("Completed: 1, Paused: 1, Errors: 1"));
    Ok(())
}

#[tokio::test]
async fn orphaned_rows_are_cleaned_and_rows_can_be_reset() -> anyhow::Result<()> {
    let harness = Harness::new().await?;
    let outcome = harness.add_magnet('a', "Pack", PACK, true).await?;
    let statistics = &harness.services.statistics;
    statistics.run_pass().await?;
    harness
        .store
        .save_statistics(&Statistics::new(Uuid::new_v4(), Utc::now()))
        .await?;

    assert_eq!(statistics.cleanup_orphans().await?, 1);
    assert_eq!(statistics.cleanup_orphans().await?, 0);
    assert!(statistics.statistics(outcome.task_id).await?.is_some());

    assert!(statistics.reset(outcome.task_id).await?);
    assert!(statistics.statistics(outcome.task_id).await?.is_none());
    assert!(!statistics.reset(outcome.task_id).await?);
    Ok(())
}

#[tokio::test]
async fn broadcaster_publishes_snapshots_then_the_list() -> anyhow::Result<()> {
    let harness = Harness::new().await?;
    let running = harness.add_magnet('a', "Running", PACK, true).await?;
    harness.add_magnet('b', "Held", PACK, false).await?;
    let mut stream = harness.services.events.subscribe(None);

    assert_eq!(harness.services.broadcaster.publish_tasks().await?, 1);
    harness.services.broadcaster.publish_statistics().await?;

    let mut kinds = Vec::new();
    while let Ok(Some(envelope)) =
        tokio::time::timeout(Duration::from_millis(50), stream.next()).await
    {
        match &envelope.event {
            Event::TaskSnapshot { task } => assert_eq!(task.id, running.task_id),
            Event::TaskList { tasks } => assert_eq!(tasks.len(), 2),
            Event::Statistics { overall } => assert_eq!(overall.total_tasks, 2),
            Event::Notification { .. } => {}
        }
        kinds.push(envelope.event.kind());
    }
    assert_eq!(kinds, vec!["task_snapshot", "task_list", "statistics"]);
    Ok(())
}

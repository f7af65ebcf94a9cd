//! Graph status integration tests.
//!
//! Tests that verify graph statuses follow their jobs and that the host
//! is told to terminate once per completed graph.

use jobexec::testing::{RecordingHost, RecordingStatusHandler, eventually};
use jobexec::{
    ExecutionStorage, GraphExecutionId, GraphStatus, GraphStatusTracker, JobExecutionEntity,
    JobExecutionRequest, JobExecutionScheduler,
};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{fast_config, wait_for_terminal_count};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn tracked_scheduler(
    jobs: Vec<JobExecutionEntity>,
) -> (
    JobExecutionScheduler<jobexec::InMemoryExecutionStorage>,
    Arc<RecordingStatusHandler>,
    Arc<RecordingHost>,
) {
    let storage = jobexec::testing::storage_with(jobs).await.unwrap();
    let host = RecordingHost::new();
    let scheduler = JobExecutionScheduler::with_storage(storage)
        .with_config(&fast_config())
        .with_host(host.clone());

    let handler = RecordingStatusHandler::new();
    let tracker = GraphStatusTracker::new(scheduler.observer()).with_forward(handler.clone());
    scheduler.subscribe(Arc::new(tracker));
    (scheduler, handler, host)
}

#[tokio::test]
async fn test_completed_graph_signals_host_once() {
    let (scheduler, handler, host) = tracked_scheduler(vec![
        JobExecutionEntity::container(1, "nightly", "lint"),
        JobExecutionEntity::container(2, "nightly", "test"),
    ])
    .await;

    scheduler.schedule_execution(vec![
        JobExecutionRequest::new(1, "lint"),
        JobExecutionRequest::new(2, "test"),
    ]);
    wait_for_terminal_count(&handler, 2, TIMEOUT).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(host.exit_codes(), vec![0]);
    assert_eq!(
        scheduler
            .storage()
            .graph_status(&GraphExecutionId::new("nightly"))
            .await
            .unwrap(),
        Some(GraphStatus::Finished)
    );
}

#[tokio::test]
async fn test_failed_graph_also_signals_host() {
    let (scheduler, handler, host) = tracked_scheduler(vec![
        JobExecutionEntity::container(1, "release", "build"),
        JobExecutionEntity::container(2, "release", "publish_toFail"),
    ])
    .await;

    scheduler.schedule_execution(vec![
        JobExecutionRequest::new(1, "build"),
        JobExecutionRequest::new(2, "publish_toFail"),
    ]);
    wait_for_terminal_count(&handler, 2, TIMEOUT).await;

    assert!(eventually(TIMEOUT, || host.exit_codes() == vec![0]).await);
    assert_eq!(
        scheduler
            .storage()
            .graph_status(&GraphExecutionId::new("release"))
            .await
            .unwrap(),
        Some(GraphStatus::Failed)
    );
}

#[tokio::test]
async fn test_each_graph_signals_separately() {
    let (scheduler, handler, host) = tracked_scheduler(vec![
        JobExecutionEntity::container(1, "a", "alpine"),
        JobExecutionEntity::container(2, "b", "alpine"),
    ])
    .await;

    scheduler.schedule_execution(vec![
        JobExecutionRequest::new(1, "alpine"),
        JobExecutionRequest::new(2, "alpine"),
    ]);
    wait_for_terminal_count(&handler, 2, TIMEOUT).await;

    assert!(eventually(TIMEOUT, || host.exit_codes().len() == 2).await);
    assert_eq!(host.exit_codes(), vec![0, 0]);
}

#[tokio::test]
async fn test_graph_with_unrunnable_job_never_completes() {
    let (scheduler, handler, host) = tracked_scheduler(vec![
        JobExecutionEntity::container(1, "mixed", "alpine"),
        JobExecutionEntity::external(2, "mixed", "remote"),
    ])
    .await;

    scheduler.schedule_execution(vec![
        JobExecutionRequest::new(1, "alpine"),
        JobExecutionRequest::new(2, "remote"),
    ]);
    wait_for_terminal_count(&handler, 1, TIMEOUT).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(host.exit_codes().is_empty());
    assert_eq!(
        scheduler
            .storage()
            .graph_status(&GraphExecutionId::new("mixed"))
            .await
            .unwrap(),
        Some(GraphStatus::Running)
    );
}

//! Termination integration tests.
//!
//! Tests that verify termination requests cancel running jobs, that a job
//! racing its own completion still reaches exactly one terminal state, and
//! that shutdown finalises everything in flight.

use jobexec::{
    JobExecutionEntity, JobExecutionId, JobExecutionRequest, JobState, SchedulerConfig,
    SchedulerError,
};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{fast_config, scheduler_with, wait_for_terminal_count};

const TIMEOUT: Duration = Duration::from_secs(5);

fn idle_config() -> SchedulerConfig {
    SchedulerConfig {
        tick_interval_ms: 60_000,
        ..fast_config()
    }
}

#[tokio::test]
async fn test_termination_finalises_running_job() {
    let (scheduler, handler) =
        scheduler_with(vec![JobExecutionEntity::container(1, "g", "alpine")], &idle_config()).await;
    let request = JobExecutionRequest::new(1, "alpine");

    scheduler.start_execution(&request).await.unwrap();
    scheduler.start_termination(&request).await.unwrap();

    // Deregistration happens before the terminal state is published.
    assert!(scheduler.running_jobs().is_empty());

    wait_for_terminal_count(&handler, 1, TIMEOUT).await;
    assert_eq!(
        handler.states_for(JobExecutionId::new(1)),
        vec![JobState::Running, JobState::finished(0)]
    );
}

#[tokio::test]
async fn test_terminated_failing_image_still_fails() {
    let (scheduler, handler) = scheduler_with(
        vec![JobExecutionEntity::container(1, "g", "deploy_toFail")],
        &idle_config(),
    )
    .await;
    let request = JobExecutionRequest::new(1, "deploy_toFail");

    scheduler.start_execution(&request).await.unwrap();
    scheduler.schedule_termination(vec![request]);

    wait_for_terminal_count(&handler, 1, TIMEOUT).await;
    assert!(matches!(
        &handler.states_for(JobExecutionId::new(1))[1],
        JobState::Failed { reason } if reason.contains("deploy_toFail")
    ));
}

#[tokio::test]
async fn test_termination_of_unknown_job_fails() {
    let (scheduler, handler) = scheduler_with(vec![], &fast_config()).await;

    let result = scheduler
        .start_termination(&JobExecutionRequest::new(42, "alpine"))
        .await;
    assert!(matches!(result, Err(SchedulerError::NotRunning(_))));

    // The batch form only logs the failure.
    assert_eq!(
        scheduler.schedule_termination(vec![JobExecutionRequest::new(42, "alpine")]),
        1
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(handler.events().is_empty());
}

#[tokio::test]
async fn test_second_termination_fails_once_job_is_gone() {
    let (scheduler, handler) =
        scheduler_with(vec![JobExecutionEntity::container(1, "g", "alpine")], &idle_config()).await;
    let request = JobExecutionRequest::new(1, "alpine");

    scheduler.start_execution(&request).await.unwrap();
    scheduler.start_termination(&request).await.unwrap();
    let second = scheduler.start_termination(&request).await;

    assert!(matches!(second, Err(SchedulerError::NotRunning(_))));
    wait_for_terminal_count(&handler, 1, TIMEOUT).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handler.terminal_count(), 1);
}

#[tokio::test]
async fn test_disabled_termination_is_reported_not_ignored() {
    let config = SchedulerConfig {
        allow_termination: false,
        ..fast_config()
    };
    let (scheduler, handler) =
        scheduler_with(vec![JobExecutionEntity::container(1, "g", "alpine")], &config).await;
    let request = JobExecutionRequest::new(1, "alpine");

    scheduler.start_execution(&request).await.unwrap();
    let result = scheduler.start_termination(&request).await;
    assert!(matches!(result, Err(SchedulerError::Unsupported(_))));

    // The job still completes on its own.
    wait_for_terminal_count(&handler, 1, TIMEOUT).await;
    assert_eq!(
        handler.states_for(JobExecutionId::new(1)),
        vec![JobState::Running, JobState::finished(0)]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_termination_racing_completion_yields_one_terminal_state() {
    let config = SchedulerConfig {
        tick_interval_ms: 5,
        ticks_to_complete: 1,
        ..fast_config()
    };
    let jobs = (1..=10u64)
        .map(|id| JobExecutionEntity::container(id, "g", "alpine"))
        .collect();
    let (scheduler, handler) = scheduler_with(jobs, &config).await;
    let scheduler = Arc::new(scheduler);

    for id in 1..=10u64 {
        let request = JobExecutionRequest::new(id, "alpine");
        scheduler.start_execution(&request).await.unwrap();

        // Fire terminations around the moment the single tick completes.
        tokio::time::sleep(Duration::from_millis(id % 6)).await;
        let mut racers = Vec::new();
        for _ in 0..4 {
            let scheduler = Arc::clone(&scheduler);
            let request = request.clone();
            racers.push(tokio::spawn(async move {
                let _ = scheduler.start_termination(&request).await;
            }));
        }
        for racer in racers {
            racer.await.unwrap();
        }
    }

    wait_for_terminal_count(&handler, 10, TIMEOUT).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    for id in 1..=10u64 {
        let states = handler.states_for(JobExecutionId::new(id));
        assert_eq!(states.len(), 2, "job {} got {:?}", id, states);
        assert_eq!(states[0], JobState::Running);
        assert!(states[1].is_terminal());
    }
    assert!(scheduler.running_jobs().is_empty());
}

#[tokio::test]
async fn test_shutdown_finalises_every_running_job() {
    let jobs = (1..=5u64)
        .map(|id| JobExecutionEntity::container(id, "g", "alpine"))
        .collect();
    let (scheduler, handler) = scheduler_with(jobs, &idle_config()).await;

    for id in 1..=5u64 {
        scheduler
            .start_execution(&JobExecutionRequest::new(id, "alpine"))
            .await
            .unwrap();
    }
    assert_eq!(scheduler.running_jobs().len(), 5);

    let remaining = scheduler.shutdown().await;

    assert_eq!(remaining, 0);
    assert_eq!(handler.terminal_count(), 5);
    assert!(scheduler.running_jobs().is_empty());
    assert!(scheduler.root_lifetime().is_terminated());
}

#[tokio::test]
async fn test_jobs_terminate_with_host_root_lifetime() {
    let root = jobexec::Lifetime::root("host-plugin");
    let (scheduler, handler) =
        scheduler_with(vec![JobExecutionEntity::container(1, "g", "alpine")], &idle_config()).await;
    let scheduler = scheduler.with_root_lifetime(root.clone());

    scheduler
        .start_execution(&JobExecutionRequest::new(1, "alpine"))
        .await
        .unwrap();
    root.terminate().unwrap();

    wait_for_terminal_count(&handler, 1, TIMEOUT).await;
    assert!(scheduler.running_jobs().is_empty());
}

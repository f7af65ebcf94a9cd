//! Run file integration tests.
//!
//! Tests that verify a run file loaded from disk drives the scheduler the
//! same way the `jx run` command does.

use jobexec::testing::{RecordingHost, RecordingStatusHandler};
use jobexec::{
    ConfigError, GraphStatusTracker, InMemoryExecutionStorage, JobExecutionId,
    JobExecutionKind, JobExecutionRequest, JobExecutionScheduler, JobState, RegistryPolicy,
    YamlLoader,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::common::wait_for_terminal_count;

const RUN_FILE: &str = r#"
scheduler:
  tick_interval_ms: 10
  registry_policy: strict
jobs:
  - id: 1
    graph: pipeline
    kind: container
    image: compile
  - id: 2
    graph: pipeline
    kind: container
    image: integration_toFail
"#;

fn write_run_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_run_file_drives_jobs_to_completion() {
    let file = write_run_file(RUN_FILE);
    let run = YamlLoader::load_run_file(file.path()).unwrap();
    assert_eq!(run.scheduler.registry_policy, RegistryPolicy::Strict);

    let storage = InMemoryExecutionStorage::new();
    for job in &run.jobs {
        storage.save_job_execution(job.to_entity()).await.unwrap();
    }

    let host = RecordingHost::new();
    let scheduler = JobExecutionScheduler::new(storage)
        .with_config(&run.scheduler)
        .with_host(host.clone());
    let handler = RecordingStatusHandler::new();
    scheduler.subscribe(Arc::new(
        GraphStatusTracker::new(scheduler.observer()).with_forward(handler.clone()),
    ));

    let requests = run.jobs.iter().map(|job| match &job.kind {
        JobExecutionKind::Container(meta) => JobExecutionRequest::new(job.id, meta.image.clone()),
        JobExecutionKind::External { provider } => {
            JobExecutionRequest::new(job.id, provider.clone())
        }
    });
    assert_eq!(scheduler.schedule_execution(requests), 2);

    wait_for_terminal_count(&handler, 2, Duration::from_secs(5)).await;

    assert_eq!(
        handler.states_for(JobExecutionId::new(1))[1],
        JobState::finished(0)
    );
    assert!(matches!(
        handler.states_for(JobExecutionId::new(2))[1],
        JobState::Failed { .. }
    ));
    assert_eq!(host.exit_codes(), vec![0]);
    assert_eq!(scheduler.shutdown().await, 0);
}

#[test]
fn test_missing_run_file_reports_path() {
    let result = YamlLoader::load_run_file("/definitely/not/here.yaml");
    match result {
        Err(ConfigError::FileReadError { path, .. }) => {
            assert!(path.ends_with("here.yaml"));
        }
        other => panic!("expected FileReadError, got {:?}", other),
    }
}

#[test]
fn test_malformed_run_file_reports_path() {
    let file = write_run_file("jobs: [this is: not valid");
    let result = YamlLoader::load_run_file(file.path());
    assert!(matches!(result, Err(ConfigError::YamlFileError { .. })));
}

#[test]
fn test_zero_tick_interval_rejected() {
    let file = write_run_file(
        "scheduler:\n  tick_interval_ms: 0\njobs:\n  - id: 1\n    kind: container\n    image: a\n",
    );
    let result = YamlLoader::load_run_file(file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

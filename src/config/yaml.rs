//! YAML configuration parsing.
//!
//! Parses scheduler settings and run files (settings plus the job
//! executions to start) from YAML.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use super::error::ConfigError;
use crate::core::job::{JobExecutionEntity, JobExecutionKind};
use crate::core::state::{DEFAULT_FAILURE_MARKER, TerminalPolicy};
use crate::core::types::{GraphExecutionId, JobExecutionId};
use crate::registry::RegistryPolicy;

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between workload ticks, in milliseconds.
    pub tick_interval_ms: u64,
    /// Number of ticks after which a simulated container exits.
    pub ticks_to_complete: u32,
    /// Image-name suffix that makes a workload fail.
    pub failure_marker: String,
    /// How long shutdown waits for in-flight work, in seconds.
    pub shutdown_timeout_secs: u64,
    /// Whether termination requests cancel running jobs.
    pub allow_termination: bool,
    /// What to do when a job id is registered twice.
    pub registry_policy: RegistryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            ticks_to_complete: 3,
            failure_marker: DEFAULT_FAILURE_MARKER.to_string(),
            shutdown_timeout_secs: 30,
            allow_termination: true,
            registry_policy: RegistryPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    /// Interval between workload ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Graceful shutdown timeout.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Terminal-state policy built from the failure marker.
    pub fn terminal_policy(&self) -> TerminalPolicy {
        TerminalPolicy::new(self.failure_marker.clone())
    }

    /// Check the settings for values that would stall every job.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "tick_interval_ms cannot be zero".into(),
            ));
        }
        if self.ticks_to_complete == 0 {
            return Err(ConfigError::InvalidConfig(
                "ticks_to_complete cannot be zero".into(),
            ));
        }
        Ok(())
    }
}

fn default_graph() -> String {
    "default".to_string()
}

/// A job execution declared in a run file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExecutionConfig {
    /// Execution identifier.
    pub id: u64,
    /// Graph the execution belongs to.
    #[serde(default = "default_graph")]
    pub graph: String,
    /// Kind-specific data.
    #[serde(flatten)]
    pub kind: JobExecutionKind,
}

impl JobExecutionConfig {
    /// Build the storage record for this execution.
    pub fn to_entity(&self) -> JobExecutionEntity {
        JobExecutionEntity {
            id: JobExecutionId::new(self.id),
            graph_id: GraphExecutionId::new(self.graph.clone()),
            kind: self.kind.clone(),
        }
    }
}

/// A run file: scheduler settings plus the job executions to start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFile {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub jobs: Vec<JobExecutionConfig>,
}

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load scheduler settings from a file.
    pub fn load_scheduler_config(path: impl AsRef<Path>) -> Result<SchedulerConfig, ConfigError> {
        let path = path.as_ref();
        let content = Self::read(path)?;
        let config: SchedulerConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse scheduler settings from a YAML string.
    pub fn parse_scheduler_config(yaml: &str) -> Result<SchedulerConfig, ConfigError> {
        let config: SchedulerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a run file.
    pub fn load_run_file(path: impl AsRef<Path>) -> Result<RunFile, ConfigError> {
        let path = path.as_ref();
        let content = Self::read(path)?;
        let run: RunFile =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate_run_file(&run)?;
        Ok(run)
    }

    /// Parse a run file from a YAML string.
    pub fn parse_run_file(yaml: &str) -> Result<RunFile, ConfigError> {
        let run: RunFile = serde_yaml::from_str(yaml)?;
        Self::validate_run_file(&run)?;
        Ok(run)
    }

    fn read(path: &Path) -> Result<String, ConfigError> {
        std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
            path: path.to_path_buf(),
            source,
        })
    }

    fn validate_run_file(run: &RunFile) -> Result<(), ConfigError> {
        run.scheduler.validate()?;

        if run.jobs.is_empty() {
            return Err(ConfigError::NoJobs);
        }

        let mut ids = HashSet::new();
        for job in &run.jobs {
            if !ids.insert(job.id) {
                return Err(ConfigError::DuplicateJobId(job.id));
            }
            if job.graph.is_empty() {
                return Err(ConfigError::MissingField(format!("jobs[{}].graph", job.id)));
            }
            match &job.kind {
                JobExecutionKind::Container(meta) if meta.image.is_empty() => {
                    return Err(ConfigError::MissingField(format!("jobs[{}].image", job.id)));
                }
                JobExecutionKind::External { provider } if provider.is_empty() => {
                    return Err(ConfigError::MissingField(format!(
                        "jobs[{}].provider",
                        job.id
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

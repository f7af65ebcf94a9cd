//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading settings or run files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML given as a string did not parse.
    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// YAML read from a file did not parse.
    #[error("YAML parse error in '{path}': {source}")]
    YamlFileError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A scheduler setting has a value that would stall every job.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A run file declares no job executions.
    #[error("run file declares no job executions")]
    NoJobs,

    /// Two job executions in one run file share an id.
    #[error("duplicate job execution id: {0}")]
    DuplicateJobId(u64),

    /// A required job field is empty.
    #[error("missing required field: {0}")]
    MissingField(String),
}

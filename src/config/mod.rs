//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for scheduler settings and
//! run files.

mod error;
mod yaml;

pub use error::ConfigError;
pub use yaml::{JobExecutionConfig, RunFile, SchedulerConfig, YamlLoader};

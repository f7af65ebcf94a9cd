//! Core identifier types for the scheduler.
//!
//! These types provide type-safe identifiers for job executions, graph
//! executions, and storage transactions.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a single job execution (one run attempt of a job).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobExecutionId(u64);

/// Identifier for a graph execution, the group a job execution belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphExecutionId(String);

/// Unique identifier for a storage transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl JobExecutionId {
    /// Create a new JobExecutionId from a raw value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for JobExecutionId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl GraphExecutionId {
    /// Create a new GraphExecutionId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GraphExecutionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for GraphExecutionId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl TransactionId {
    /// Generate a new random TransactionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GraphExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

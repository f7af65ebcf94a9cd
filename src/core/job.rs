//! Job execution records and requests.
//!
//! A [`JobExecutionEntity`] is the persisted record owned by storage; a
//! [`JobExecutionRequest`] is the immutable message asking the scheduler to
//! start or terminate one.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::{GraphExecutionId, JobExecutionId};

/// Metadata of a containerized job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerJobMeta {
    /// Image (or name tag) the container runs.
    pub image: String,
}

impl ContainerJobMeta {
    /// Create container metadata for an image.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
        }
    }
}

/// Kind-specific data of a job execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobExecutionKind {
    /// A container workload this scheduler can run.
    Container(ContainerJobMeta),
    /// A job handled by some other execution provider.
    External {
        /// Name of the provider that owns the job.
        provider: String,
    },
}

impl JobExecutionKind {
    /// Short name of the kind, used in log and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            JobExecutionKind::Container(_) => "container",
            JobExecutionKind::External { .. } => "external",
        }
    }
}

/// Persisted record of a job execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExecutionEntity {
    /// Execution identifier.
    pub id: JobExecutionId,
    /// Graph execution this job belongs to.
    pub graph_id: GraphExecutionId,
    /// Kind-specific data.
    pub kind: JobExecutionKind,
}

impl JobExecutionEntity {
    /// Create a container job execution.
    pub fn container(
        id: impl Into<JobExecutionId>,
        graph_id: impl Into<GraphExecutionId>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            graph_id: graph_id.into(),
            kind: JobExecutionKind::Container(ContainerJobMeta::new(image)),
        }
    }

    /// Create a job execution owned by another provider.
    pub fn external(
        id: impl Into<JobExecutionId>,
        graph_id: impl Into<GraphExecutionId>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            graph_id: graph_id.into(),
            kind: JobExecutionKind::External {
                provider: provider.into(),
            },
        }
    }

    /// Container metadata, if this is a container job.
    pub fn container_meta(&self) -> Option<&ContainerJobMeta> {
        match &self.kind {
            JobExecutionKind::Container(meta) => Some(meta),
            JobExecutionKind::External { .. } => None,
        }
    }
}

/// A request to start or terminate a job execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExecutionRequest {
    id: JobExecutionId,
    image: String,
}

impl JobExecutionRequest {
    /// Create a request for the given execution.
    pub fn new(id: impl Into<JobExecutionId>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image: image.into(),
        }
    }

    /// The execution identifier.
    pub fn id(&self) -> JobExecutionId {
        self.id
    }

    /// The image tag the requester expects to run.
    pub fn image(&self) -> &str {
        &self.image
    }
}

impl From<&JobExecutionEntity> for JobExecutionRequest {
    fn from(entity: &JobExecutionEntity) -> Self {
        let image = match &entity.kind {
            JobExecutionKind::Container(meta) => meta.image.clone(),
            JobExecutionKind::External { provider } => provider.clone(),
        };
        Self::new(entity.id, image)
    }
}

impl fmt::Display for JobExecutionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.image)
    }
}

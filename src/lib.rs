pub mod config;
pub mod core;
pub mod events;
pub mod graph;
pub mod host;
pub mod lifetime;
pub mod registry;
pub mod scheduler;
pub mod storage;
pub mod testing;

pub use config::{ConfigError, JobExecutionConfig, RunFile, SchedulerConfig, YamlLoader};
pub use core::job::{ContainerJobMeta, JobExecutionEntity, JobExecutionKind, JobExecutionRequest};
pub use core::state::{GraphStatus, JobState, TerminalPolicy};
pub use core::types::{GraphExecutionId, JobExecutionId, TransactionId};
pub use events::{
    ExecutionObserver, GraphStatusChangedEvent, JobExecutionStatusUpdateHandler,
    JobStatusChangedEvent, StatusUpdateEvent,
};
pub use graph::GraphStatusTracker;
pub use host::{
    ChannelHost, ChannelProgressLog, HostProcess, LoggingHost, ProgressLog, TracingProgressLog,
};
pub use lifetime::{Lifetime, LifetimeError, LifetimeId};
pub use registry::{JobRegistry, RegistryError, RegistryPolicy, RunningJobHandle};
pub use scheduler::{HostNotifier, JobExecutionScheduler, SchedulerError, StatusNotifier};
pub use storage::{
    ExecutionStorage, InMemoryExecutionStorage, StorageError, StorageTransaction,
    TransactionalGateway,
};

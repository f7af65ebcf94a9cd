//! Scheduler for container job executions.
//!
//! This module turns execution and termination requests into running
//! tasks, drives each job through its state machine and publishes every
//! transition to the subscribed handler.

mod dispatch;
mod engine;
mod execution;
mod hooks;
mod notifier;
mod types;

pub use dispatch::Dispatcher;
pub use engine::JobExecutionScheduler;
pub use hooks::{GRAPH_COMPLETED_EXIT_CODE, HostNotifier};
pub use notifier::StatusNotifier;
pub use types::SchedulerError;

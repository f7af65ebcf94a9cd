//! Collaborators provided by the host that embeds the scheduler.
//!
//! - [`ProgressLog`]: sink for human-readable progress lines of workloads
//! - [`HostProcess`]: receives the process-termination signal

use tokio::sync::mpsc;

/// Sink for human-readable progress lines.
///
/// Implementations must not block the caller and must swallow their own
/// failures.
pub trait ProgressLog: Send + Sync {
    /// Record one progress line.
    fn log(&self, line: String);
}

/// Progress log that forwards lines to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgressLog;

impl ProgressLog for TracingProgressLog {
    fn log(&self, line: String) {
        tracing::info!(target: "jobexec::progress", "{}", line);
    }
}

/// Progress log that forwards lines to a bounded channel.
///
/// Lines are dropped when the channel is full or closed.
#[derive(Debug, Clone)]
pub struct ChannelProgressLog {
    tx: mpsc::Sender<String>,
}

impl ChannelProgressLog {
    /// Create a progress log and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ProgressLog for ChannelProgressLog {
    fn log(&self, line: String) {
        if let Err(e) = self.tx.try_send(line) {
            tracing::trace!(error = %e, "Dropping progress line");
        }
    }
}

/// The process hosting the scheduler.
pub trait HostProcess: Send + Sync {
    /// Tell the host the work it was started for is over.
    fn notify_process_terminated(&self, exit_code: i32);
}

/// Host that only records the signal in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHost;

impl HostProcess for LoggingHost {
    fn notify_process_terminated(&self, exit_code: i32) {
        tracing::info!(exit_code, "Host process termination requested");
    }
}

/// Host that forwards the exit code to a channel.
#[derive(Debug, Clone)]
pub struct ChannelHost {
    tx: mpsc::UnboundedSender<i32>,
}

impl ChannelHost {
    /// Create a host and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<i32>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl HostProcess for ChannelHost {
    fn notify_process_terminated(&self, exit_code: i32) {
        if self.tx.send(exit_code).is_err() {
            tracing::debug!(exit_code, "Host channel closed, termination signal dropped");
        }
    }
}

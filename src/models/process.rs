use std::sync::Arc;
use tokio::process::Child;

use crate::models::ProcessSpec;
use crate::services::log_files::LogSink;

/// Runtime status of one managed process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessStatus {
    /// PID of the latest launch, unset before the first successful start
    pub pid: Option<u32>,
    /// The OS process is running as far as the supervisor last observed
    pub active: bool,
    pub has_error: bool,
    /// A run-and-wait process was killed at its deadline
    pub timed_out: bool,
    /// A run-and-wait launch has returned, never reset
    pub done: bool,
    /// A run-and-wait process exited on its own before the deadline
    pub ran_to_completion: bool,
    pub exit_code: Option<i32>,
    /// Automatic relaunches performed, bounded by `max_restarts`
    pub restart_count: u32,
    /// Launch attempts, successful or not
    pub launches: u32,
}

/// State kept per configured process. Records are created once and reused by every
/// relaunch.
#[derive(Debug)]
pub struct ProcessRecord {
    pub spec: Arc<ProcessSpec>,
    /// Launch handle of a running fire-and-forget process
    pub handle: Option<Child>,
    pub log_sink: Option<LogSink>,
    pub status: ProcessStatus,
}

impl ProcessRecord {
    pub fn new(spec: Arc<ProcessSpec>) -> Self {
        Self {
            spec,
            handle: None,
            log_sink: None,
            status: ProcessStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Whether the monitor loop should probe this record.
    pub fn is_monitored(&self) -> bool {
        !self.spec.is_run_and_wait() && self.handle.is_some() && self.status.active
    }

    /// Installs the sink of a new launch, closing the previous one first.
    pub fn replace_log_sink(&mut self, sink: Option<LogSink>) {
        self.close_log_sink();
        self.log_sink = sink;
    }

    /// Closes the open sink, if any. Returns whether a sink was closed.
    pub fn close_log_sink(&mut self) -> bool {
        match self.log_sink.take() {
            Some(sink) => {
                sink.close();
                true
            }
            None => false,
        }
    }
}

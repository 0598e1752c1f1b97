use std::sync::Arc;

use crate::error::TerminateError;
use crate::models::{ProcessSpec, ProcessStatus};
use crate::services::launcher::{launch_and_wait, launch_no_wait, report_launch_error};
use crate::services::log_files::LogFiles;
use crate::services::monitor::run_monitor;
use crate::services::process_checker::probe_child;
use crate::services::terminator::terminate;
use crate::state::{new_state, SharedState, SupervisorSettings};

/// Result of one shutdown pass.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Processes found alive and killed
    pub terminated: usize,
    /// Processes found alive whose forced kill did not take
    pub failures: Vec<(String, TerminateError)>,
}

/// One supervisor instance: registry, stop signal and task tracking.
#[derive(Clone)]
pub struct Supervisor {
    state: SharedState,
}

impl Supervisor {
    pub fn new(log_files: LogFiles, settings: SupervisorSettings) -> Self {
        Self {
            state: new_state(log_files, settings),
        }
    }

    /// Populates the registry, starts the monitor loop and dispatches every spec to its own
    /// launch task. Returns without waiting for any launch.
    pub async fn start(&self, specs: Vec<ProcessSpec>) {
        log::debug!("Launching {} configured processes", specs.len());

        for spec in &specs {
            match self.state.log_files.purge_old(&spec.name) {
                Ok(0) => {}
                Ok(n) => log::debug!("Removed {} old log files of process <{}>", n, spec.name),
                Err(e) => log::warn!("Could not purge old log files of process <{}>: {}", spec.name, e),
            }
        }

        let specs: Vec<Arc<ProcessSpec>> = specs.into_iter().map(Arc::new).collect();
        self.state.registry.initialize(specs.iter().cloned()).await;

        self.state.tasks.spawn(run_monitor(self.state.clone()));

        for spec in specs {
            self.state.tasks.spawn(dispatch(self.state.clone(), spec));
        }
    }

    /// Stops the monitor loop and kills every process still alive, in a single pass under the
    /// registry lock. Safe to call more than once.
    ///
    /// A run-and-wait process that is mid-run is not held by the registry: its launch task
    /// kills it once it sees the stop signal, so it is not counted in the report. Only
    /// [`Supervisor::wait`] guarantees that such a process has ended.
    pub async fn shutdown(&self) -> ShutdownReport {
        log::debug!("Entering shutdown");
        self.state.stop.cancel();

        let mut report = ShutdownReport::default();
        let mut records = self.state.registry.lock().await;

        for (name, record) in records.iter_mut() {
            if let Some(child) = record.handle.as_mut() {
                if probe_child(child).is_running() {
                    log::info!(
                        "Will now try to kill process <{}>, PID=<{:?}>.",
                        name,
                        record.status.pid
                    );
                    match terminate(child, self.state.settings.reap_timeout).await {
                        Ok(()) => report.terminated += 1,
                        Err(e) => {
                            log::error!(
                                "Process <{}>, PID=<{:?}> could not be killed!! <{}>",
                                name,
                                record.status.pid,
                                e
                            );
                            report.failures.push((name.clone(), e));
                        }
                    }
                } else {
                    log::debug!(
                        "Process <{}>, PID=<{:?}> has exited. Nothing to do.",
                        name,
                        record.status.pid
                    );
                }
                record.handle = None;
            }

            record.status.active = false;
            record.close_log_sink();
        }

        log::debug!("Leaving shutdown");
        report
    }

    /// Waits for the monitor loop and every launch and restart task to finish.
    pub async fn wait(&self) {
        self.state.tasks.close();
        self.state.tasks.wait().await;
    }

    pub async fn status(&self, name: &str) -> Option<ProcessStatus> {
        self.state.registry.get(name).await
    }

    pub async fn statuses(&self) -> Vec<(String, ProcessStatus)> {
        self.state.registry.snapshot().await
    }
}

/// Initial launch task of one process: honours the start delay, then picks the variant.
async fn dispatch(state: SharedState, spec: Arc<ProcessSpec>) {
    let delay = spec.start_delay();
    if !delay.is_zero() {
        log::debug!(
            "Process <{}> is configured with start delay <{}>s.",
            spec.name,
            spec.start_delay_s
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = state.stop.cancelled() => {
                log::debug!("Start of process <{}> cancelled by shutdown.", spec.name);
                return;
            }
        }
    }

    let result = if spec.is_run_and_wait() {
        launch_and_wait(&state, &spec.name).await.map(|_| ())
    } else {
        launch_no_wait(&state, &spec.name).await
    };

    if let Err(e) = result {
        report_launch_error(&spec.name, &e);
    }
}

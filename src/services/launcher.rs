use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::error::LaunchError;
use crate::models::{ProcessRecord, ProcessSpec};
use crate::services::log_files::LogFiles;
use crate::services::terminator::terminate;
use crate::state::SharedState;

/// How a run-and-wait launch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Exited on its own before the deadline
    Completed { exit_code: Option<i32> },
    /// Killed when the deadline expired
    TimedOut,
    /// Killed because the supervisor is shutting down
    Stopped,
    /// Started, but waiting for its exit failed
    WaitFailed,
}

enum RunEnd {
    Exited(std::io::Result<std::process::ExitStatus>),
    Deadline,
    Stopped,
}

/// Starts a fire-and-forget process and returns once the OS has created it.
///
/// The launch handle and the output sink stay on the record; whoever observes the exit
/// (monitor loop or shutdown) closes the sink.
pub async fn launch_no_wait(state: &SharedState, name: &str) -> Result<(), LaunchError> {
    let mut records = state.registry.lock().await;
    if state.stop.is_cancelled() {
        return Err(LaunchError::ShuttingDown(name.to_string()));
    }
    let record = records
        .get_mut(name)
        .ok_or_else(|| LaunchError::UnknownProcess(name.to_string()))?;

    log::info!("Will now try to launch process <{}>.", name);
    record.status.launches += 1;

    let mut command = prepare_command(&state.log_files, record);
    match command.spawn() {
        Ok(child) => {
            record.status.pid = child.id();
            record.status.active = true;
            record.status.has_error = false;
            record.handle = Some(child);
            log::info!("Starting process <{}> OK! PID=<{:?}>", name, record.status.pid);
            Ok(())
        }
        Err(source) => Err(record_start_failure(record, source)),
    }
}

/// Starts a run-and-wait process and blocks until it exits, its deadline expires or the
/// supervisor shuts down. The latter two end the process through the terminator.
///
/// The registry lock is released while the process runs; the calling task owns the child
/// for that window.
pub async fn launch_and_wait(state: &SharedState, name: &str) -> Result<WaitOutcome, LaunchError> {
    let (mut child, timeout) = {
        let mut records = state.registry.lock().await;
        if state.stop.is_cancelled() {
            return Err(LaunchError::ShuttingDown(name.to_string()));
        }
        let record = records
            .get_mut(name)
            .ok_or_else(|| LaunchError::UnknownProcess(name.to_string()))?;

        let timeout = record.spec.wait_timeout();
        log::info!(
            "Will now try to launch process <{}> with wait option, timeout is <{}>s.",
            name,
            record.spec.wait_for_exit_timeout_s
        );
        record.status.launches += 1;

        let mut command = prepare_command(&state.log_files, record);
        match command.spawn() {
            Ok(child) => {
                record.status.pid = child.id();
                record.status.active = true;
                record.status.has_error = false;
                (child, timeout)
            }
            Err(source) => return Err(record_start_failure(record, source)),
        }
    };

    let started = Instant::now();
    let end = tokio::select! {
        result = child.wait() => RunEnd::Exited(result),
        _ = deadline(timeout) => RunEnd::Deadline,
        _ = state.stop.cancelled() => RunEnd::Stopped,
    };

    if matches!(end, RunEnd::Deadline | RunEnd::Stopped) {
        if let Err(e) = terminate(&mut child, state.settings.reap_timeout).await {
            log::error!("Process <{}> could not be killed!! <{}>", name, e);
        }
    }
    let elapsed = started.elapsed();

    let mut records = state.registry.lock().await;
    let record = records
        .get_mut(name)
        .ok_or_else(|| LaunchError::UnknownProcess(name.to_string()))?;
    record.status.active = false;
    record.status.done = true;

    let outcome = match end {
        RunEnd::Exited(Ok(status)) => {
            record.status.ran_to_completion = true;
            record.status.exit_code = status.code();
            if status.success() {
                log::info!("Running process <{}> OK! Exit code was <{:?}>", name, status.code());
            } else {
                log::warn!(
                    "Running process <{}> ended with failure after {:?}. Exit code was <{:?}>",
                    name,
                    elapsed,
                    status.code()
                );
            }
            WaitOutcome::Completed {
                exit_code: status.code(),
            }
        }
        RunEnd::Exited(Err(e)) => {
            record.status.has_error = true;
            log::error!("Could not wait for process <{}>: {}", name, e);
            WaitOutcome::WaitFailed
        }
        RunEnd::Deadline => {
            record.status.timed_out = true;
            log::warn!(
                "Process <{}> was terminated after its configured timeout of <{}>s (ran {:?})",
                name,
                record.spec.wait_for_exit_timeout_s,
                elapsed
            );
            WaitOutcome::TimedOut
        }
        RunEnd::Stopped => {
            log::info!("Process <{}> was stopped by shutdown after {:?}", name, elapsed);
            WaitOutcome::Stopped
        }
    };

    record.close_log_sink();
    Ok(outcome)
}

/// Body of a restart task spawned by the monitor loop.
pub async fn relaunch(state: SharedState, name: String) {
    if let Err(e) = launch_no_wait(&state, &name).await {
        report_launch_error(&name, &e);
    }
}

pub fn report_launch_error(name: &str, error: &LaunchError) {
    match error {
        LaunchError::ShuttingDown(_) => log::debug!("{}", error),
        _ => log::error!("Could not start process <{}>, error: {}", name, error),
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

fn record_start_failure(record: &mut ProcessRecord, source: std::io::Error) -> LaunchError {
    record.status.has_error = true;
    record.status.active = false;
    record.status.pid = None;
    record.close_log_sink();
    LaunchError::Spawn {
        path: record.spec.start_path.clone(),
        source,
    }
}

/// Builds the OS launch request and opens a fresh output sink for it.
fn prepare_command(log_files: &LogFiles, record: &mut ProcessRecord) -> Command {
    let spec = Arc::clone(&record.spec);

    let mut command = Command::new(&spec.start_path);
    command.args(&spec.start_args).stdin(Stdio::null());

    let sink = match log_files.open_sink(&spec.name) {
        Ok(sink) => {
            log::debug!("Process <{}> writes its output to <{}>", spec.name, sink.path().display());
            Some(sink)
        }
        Err(e) => {
            log::error!("Could not open log file for process <{}> with error <{}>", spec.name, e);
            None
        }
    };

    match sink.as_ref().map(|s| s.stdio()) {
        Some(Ok((out, err))) => {
            command.stdout(out).stderr(err);
        }
        Some(Err(e)) => {
            log::error!("Could not redirect output of process <{}>: {}", spec.name, e);
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        None => {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
    }

    apply_window_settings(&mut command, &spec);
    record.replace_log_sink(sink);
    command
}

#[cfg(windows)]
fn apply_window_settings(command: &mut Command, spec: &ProcessSpec) {
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;

    if spec.hide_window {
        log::debug!("Process <{}>, HideWindow enabled.", spec.name);
        command.creation_flags(CREATE_NO_WINDOW);
    }
}

#[cfg(not(windows))]
fn apply_window_settings(_command: &mut Command, spec: &ProcessSpec) {
    if spec.hide_window {
        log::debug!("Process <{}>, HideWindow has no effect on this platform.", spec.name);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::state::{new_state, SupervisorSettings};

    async fn state_with(dir: &std::path::Path, specs: Vec<ProcessSpec>) -> SharedState {
        let state = new_state(LogFiles::new(dir, 10), SupervisorSettings::default());
        state.registry.initialize(specs.into_iter().map(Arc::new)).await;
        state
    }

    #[tokio::test]
    async fn test_no_wait_launch_records_pid_and_sink() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(
            dir.path(),
            vec![ProcessSpec::new("sleeper", "/bin/sh").with_args(["-c", "sleep 30"])],
        )
        .await;

        launch_no_wait(&state, "sleeper").await.unwrap();

        let mut records = state.registry.lock().await;
        let record = records.get_mut("sleeper").unwrap();
        assert!(record.status.active);
        assert!(record.status.pid.is_some());
        assert!(record.log_sink.is_some());
        assert_eq!(record.status.launches, 1);

        let child = record.handle.as_mut().unwrap();
        terminate(child, Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_failure_sets_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(dir.path(), vec![ProcessSpec::new("ghost", "/nonexistent/ghost-binary")]).await;

        let err = launch_no_wait(&state, "ghost").await.unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));

        let records = state.registry.lock().await;
        let record = &records["ghost"];
        assert!(record.status.has_error);
        assert!(!record.status.active);
        assert_eq!(record.status.pid, None);
        assert!(record.log_sink.is_none());
        assert!(record.handle.is_none());
    }

    #[tokio::test]
    async fn test_unknown_process() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(dir.path(), Vec::new()).await;
        assert!(matches!(
            launch_no_wait(&state, "nobody").await,
            Err(LaunchError::UnknownProcess(_))
        ));
    }

    #[tokio::test]
    async fn test_no_launch_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(dir.path(), vec![ProcessSpec::new("late", "/bin/true")]).await;
        state.stop.cancel();

        assert!(matches!(
            launch_no_wait(&state, "late").await,
            Err(LaunchError::ShuttingDown(_))
        ));
        assert_eq!(state.registry.get("late").await.unwrap().launches, 0);
    }

    #[tokio::test]
    async fn test_wait_launch_completes() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(
            dir.path(),
            vec![ProcessSpec::new("quick", "/bin/sh")
                .with_args(["-c", "echo hello; exit 4"])
                .with_wait_timeout(5)],
        )
        .await;

        let outcome = launch_and_wait(&state, "quick").await.unwrap();
        assert_eq!(outcome, WaitOutcome::Completed { exit_code: Some(4) });

        let status = state.registry.get("quick").await.unwrap();
        assert!(status.done);
        assert!(status.ran_to_completion);
        assert!(!status.timed_out);
        assert!(!status.active);
        assert_eq!(status.exit_code, Some(4));
        assert!(state.registry.lock().await["quick"].log_sink.is_none());
    }

    #[tokio::test]
    async fn test_wait_launch_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(
            dir.path(),
            vec![ProcessSpec::new("slow", "/bin/sh")
                .with_args(["-c", "sleep 10"])
                .with_wait_timeout(1)],
        )
        .await;

        let started = Instant::now();
        let outcome = launch_and_wait(&state, "slow").await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(8));

        let status = state.registry.get("slow").await.unwrap();
        assert!(status.done);
        assert!(status.timed_out);
        assert!(!status.ran_to_completion);
        assert_eq!(status.restart_count, 0);
    }

    #[tokio::test]
    async fn test_wait_launch_start_failure_leaves_done_unset() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(
            dir.path(),
            vec![ProcessSpec::new("ghost", "/nonexistent/ghost-binary").with_wait_timeout(3)],
        )
        .await;

        assert!(launch_and_wait(&state, "ghost").await.is_err());
        let status = state.registry.get("ghost").await.unwrap();
        assert!(status.has_error);
        assert!(!status.done);
    }
}

use tokio::time::MissedTickBehavior;

use crate::services::launcher::relaunch;
use crate::services::process_checker::{probe_child, Liveness};
use crate::services::restart::{evaluate_restart, RestartAction};
use crate::state::SharedState;

/// Scans fire-and-forget processes every `monitor_interval` until the stop signal fires.
pub async fn run_monitor(state: SharedState) {
    log::debug!(
        "Process monitor started, interval {:?}",
        state.settings.monitor_interval
    );

    let mut ticker = tokio::time::interval(state.settings.monitor_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = state.stop.cancelled() => break,
            _ = ticker.tick() => {
                scan_once(&state).await;
            }
        }
    }

    log::debug!("Process monitor stopped");
}

/// One pass over the registry. Returns the number of exits detected.
///
/// Restarts are handed to their own tasks so a slow launch never stalls the scan.
pub async fn scan_once(state: &SharedState) -> usize {
    let mut records = state.registry.lock().await;
    if state.stop.is_cancelled() {
        return 0;
    }

    let mut exits = 0;
    for (name, record) in records.iter_mut() {
        if !record.is_monitored() {
            continue;
        }
        let Some(child) = record.handle.as_mut() else {
            continue;
        };

        match probe_child(child) {
            Liveness::Running => continue,
            Liveness::Exited(code) => {
                log::warn!(
                    "Process <{}>, PID=<{:?}> has exited with code <{:?}>.",
                    name,
                    record.status.pid,
                    code
                );
                record.status.exit_code = code;
            }
            Liveness::Unknown(e) => {
                log::warn!(
                    "Process <{}>, PID=<{:?}> could not be probed ({}), treating it as exited.",
                    name,
                    record.status.pid,
                    e
                );
            }
        }

        exits += 1;
        record.status.active = false;
        record.handle = None;
        record.close_log_sink();

        match evaluate_restart(&mut record.status, record.spec.max_restarts) {
            RestartAction::NotConfigured => {
                log::debug!("Process <{}> is not configured for automatic restart.", name);
            }
            RestartAction::Restart { attempt } => {
                log::info!(
                    "Will now try to restart no-wait process <{}>. This is attempt No <{}>.",
                    name,
                    attempt
                );
                state.tasks.spawn(relaunch(state.clone(), name.clone()));
            }
            RestartAction::Exhausted => {
                log::error!(
                    "Process <{}> has reached the max restart count of <{}>. WILL NOT RESTART THE PROCESS.",
                    name,
                    record.spec.max_restarts
                );
            }
        }
    }

    exits
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::ProcessSpec;
    use crate::services::launcher::launch_no_wait;
    use crate::services::log_files::LogFiles;
    use crate::state::{new_state, SupervisorSettings};
    use std::sync::Arc;
    use std::time::Duration;

    async fn wait_for_exit_detection(state: &SharedState) -> usize {
        for _ in 0..200 {
            let exits = scan_once(state).await;
            if exits > 0 {
                return exits;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        0
    }

    #[tokio::test]
    async fn test_exit_without_budget_is_left_down() {
        let dir = tempfile::tempdir().unwrap();
        let state = new_state(LogFiles::new(dir.path(), 10), SupervisorSettings::default());
        state
            .registry
            .initialize([Arc::new(ProcessSpec::new("once", "/bin/sh").with_args(["-c", "exit 0"]))])
            .await;

        launch_no_wait(&state, "once").await.unwrap();
        assert_eq!(wait_for_exit_detection(&state).await, 1);

        let records = state.registry.lock().await;
        let record = &records["once"];
        assert!(!record.status.active);
        assert!(record.handle.is_none());
        assert!(record.log_sink.is_none());
        assert_eq!(record.status.restart_count, 0);
        assert!(!record.status.has_error);
        assert_eq!(record.status.exit_code, Some(0));
        assert!(state.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_exit_with_budget_spawns_restart() {
        let dir = tempfile::tempdir().unwrap();
        let state = new_state(LogFiles::new(dir.path(), 10), SupervisorSettings::default());
        state
            .registry
            .initialize([Arc::new(
                ProcessSpec::new("flaky", "/bin/sh")
                    .with_args(["-c", "exit 1"])
                    .with_max_restarts(1),
            )])
            .await;

        launch_no_wait(&state, "flaky").await.unwrap();
        assert_eq!(wait_for_exit_detection(&state).await, 1);
        assert_eq!(state.registry.get("flaky").await.unwrap().restart_count, 1);

        state.tasks.close();
        state.tasks.wait().await;
        assert_eq!(state.registry.get("flaky").await.unwrap().launches, 2);

        assert_eq!(wait_for_exit_detection(&state).await, 1);
        let status = state.registry.get("flaky").await.unwrap();
        assert_eq!(status.restart_count, 1);
        assert!(status.has_error);
        assert_eq!(status.launches, 2);
    }

    #[tokio::test]
    async fn test_scan_is_noop_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let state = new_state(LogFiles::new(dir.path(), 10), SupervisorSettings::default());
        state
            .registry
            .initialize([Arc::new(ProcessSpec::new("once", "/bin/sh").with_args(["-c", "exit 0"]))])
            .await;
        launch_no_wait(&state, "once").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        state.stop.cancel();
        assert_eq!(scan_once(&state).await, 0);
        assert!(state.registry.get("once").await.unwrap().active);
    }
}

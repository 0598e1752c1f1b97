use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};
use tokio::process::Child;

use crate::error::TerminateError;
use crate::services::process_checker::{descendant_pids, pid_is_running};

/// Stops a launched process and everything it spawned.
///
/// Escalates in three steps: a termination request, a kill through the launch handle,
/// then a forced kill by PID of the whole process tree. Failures of the first two steps
/// are only logged. The result reflects whether the process was reaped within
/// `reap_timeout` after the last step.
pub async fn terminate(child: &mut Child, reap_timeout: Duration) -> Result<(), TerminateError> {
    let Some(pid) = child.id() else {
        log::debug!("Process already reaped, nothing to terminate");
        return Ok(());
    };

    // Collect the tree first; descendants get reparented once the root dies.
    let tree = descendant_pids(pid);

    match signal_pid(pid, Signal::Term) {
        Some(true) => log::debug!("Sent termination request to PID {}", pid),
        Some(false) => log::debug!("Termination request to PID {} failed", pid),
        None => log::debug!("Termination requests unsupported on this platform"),
    }

    if let Err(e) = child.start_kill() {
        log::debug!("Kill through launch handle of PID {} failed: {}", pid, e);
    }

    kill_tree(pid, &tree);

    let started = Instant::now();
    match tokio::time::timeout(reap_timeout, child.wait()).await {
        Ok(Ok(status)) => {
            log::debug!("PID {} ended with {}", pid, status);
            let survivors: Vec<u32> = tree.into_iter().filter(|p| pid_is_running(*p)).collect();
            if !survivors.is_empty() {
                log::warn!("Descendants of PID {} still running after forced kill: {:?}", pid, survivors);
            }
            Ok(())
        }
        Ok(Err(source)) => Err(TerminateError::Wait { pid, source }),
        Err(_) => Err(TerminateError::StillRunning {
            pid,
            waited_ms: started.elapsed().as_millis(),
        }),
    }
}

fn signal_pid(pid: u32, signal: Signal) -> Option<bool> {
    let sys_pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
    sys.process(sys_pid)?.kill_with(signal)
}

/// Forced kill by PID of `root` and its descendants.
fn kill_tree(root: u32, descendants: &[u32]) {
    let pids: Vec<Pid> = std::iter::once(root)
        .chain(descendants.iter().copied())
        .map(Pid::from_u32)
        .collect();

    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&pids), true);

    for pid in &pids {
        match sys.process(*pid) {
            Some(process) => {
                if !process.kill() {
                    log::warn!("Forced kill of PID {} was refused", pid);
                }
            }
            None => log::debug!("PID {} already gone", pid),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::services::process_checker::{pid_is_running, probe_child};
    use tokio::process::Command;

    #[tokio::test]
    async fn test_terminate_kills_process_tree() {
        let mut child = Command::new("/bin/sh")
            .args(["-c", "sleep 30 & sleep 30; wait"])
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        let mut tree = Vec::new();
        for _ in 0..50 {
            tree = descendant_pids(pid);
            if tree.len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!tree.is_empty());

        terminate(&mut child, Duration::from_secs(5)).await.unwrap();

        assert!(!probe_child(&mut child).is_running());
        for _ in 0..50 {
            if tree.iter().all(|p| !pid_is_running(*p)) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(tree.iter().all(|p| !pid_is_running(*p)));
    }

    #[tokio::test]
    async fn test_terminate_after_exit_is_ok() {
        let mut child = Command::new("/bin/sh").args(["-c", "exit 0"]).spawn().unwrap();
        child.wait().await.unwrap();

        assert!(terminate(&mut child, Duration::from_secs(1)).await.is_ok());
    }
}

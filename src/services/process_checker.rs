use std::collections::HashMap;
use std::io;
use sysinfo::{Pid, ProcessStatus as OsProcessStatus, ProcessesToUpdate, System};
use tokio::process::Child;

/// Outcome of a liveness probe on a launched process.
#[derive(Debug)]
pub enum Liveness {
    Running,
    /// Exited and reaped; carries the exit code when there is one
    Exited(Option<i32>),
    /// The probe itself failed. Callers treat this like an exit.
    Unknown(io::Error),
}

impl Liveness {
    pub fn is_running(&self) -> bool {
        matches!(self, Liveness::Running)
    }
}

/// Checks whether a child launched by the supervisor is still running.
///
/// Uses a non-blocking wait, which also reaps the child if it has exited so it does not
/// linger as a zombie.
pub fn probe_child(child: &mut Child) -> Liveness {
    match child.try_wait() {
        Ok(None) => Liveness::Running,
        Ok(Some(status)) => Liveness::Exited(status.code()),
        Err(e) => Liveness::Unknown(e),
    }
}

/// Checks whether any process with this PID is running. Zombies count as dead.
pub fn pid_is_running(pid: u32) -> bool {
    let sys_pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);

    match sys.process(sys_pid) {
        Some(process) => !matches!(process.status(), OsProcessStatus::Zombie | OsProcessStatus::Dead),
        None => false,
    }
}

/// PIDs of every process below `root` in the process tree.
pub fn descendant_pids(root: u32) -> Vec<u32> {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (pid, process) in sys.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent.as_u32()).or_default().push(pid.as_u32());
        }
    }

    let mut out = Vec::new();
    let mut frontier = vec![root];
    while let Some(current) = frontier.pop() {
        if let Some(kids) = children.get(&current) {
            for &kid in kids {
                if kid != root && !out.contains(&kid) {
                    out.push(kid);
                    frontier.push(kid);
                }
            }
        }
    }

    log::debug!("Process {} has {} descendants", root, out.len());
    out
}

use crate::models::ProcessStatus;

/// What the monitor does about a fire-and-forget process it found exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartAction {
    /// `max_restarts` is zero, the process stays down.
    NotConfigured,

    /// Relaunch the process. `attempt` is the new restart count.
    Restart { attempt: u32 },

    /// The restart budget is used up; the process is marked errored for good.
    Exhausted,
}

/// Decides on and books a restart for an exited process.
///
/// The counter tracks attempts rather than successes, so a relaunch that fails to start
/// still consumes budget. It is never reset while the supervisor runs.
pub fn evaluate_restart(status: &mut ProcessStatus, max_restarts: u32) -> RestartAction {
    if max_restarts == 0 {
        return RestartAction::NotConfigured;
    }

    if status.restart_count < max_restarts {
        status.restart_count += 1;
        RestartAction::Restart {
            attempt: status.restart_count,
        }
    } else {
        status.has_error = true;
        RestartAction::Exhausted
    }
}

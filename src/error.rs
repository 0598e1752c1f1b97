use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to get a configured process running.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("process <{0}> is not registered")]
    UnknownProcess(String),

    #[error("supervisor is shutting down, launch of <{0}> skipped")]
    ShuttingDown(String),

    #[error("could not start <{}>: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The final forced kill of a process did not take.
#[derive(Debug, Error)]
pub enum TerminateError {
    #[error("process {pid} did not exit within {waited_ms} ms of the forced kill")]
    StillRunning { pid: u32, waited_ms: u128 },

    #[error("could not confirm exit of process {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

/// Configuration problems. These are the only fatal errors of the supervisor.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't open config file <{}>: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't decode config file <{}>: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("can't write config file <{}>: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config file <{}> already exists", .0.display())]
    AlreadyExists(PathBuf),

    #[error("task at index {0} has an empty name")]
    EmptyName(usize),

    #[error("task <{0}> has an empty start path")]
    EmptyPath(String),

    #[error("task name <{0}> is used more than once")]
    DuplicateName(String),
}

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// One managed process as declared in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessSpec {
    /// Unique key of the process
    pub name: String,
    /// Executable to launch
    pub start_path: PathBuf,
    /// Arguments passed as argv[1..]
    #[serde(default)]
    pub start_args: Vec<String>,
    /// Zero launches immediately
    #[serde(default)]
    pub start_delay_s: u32,
    /// Zero never restarts automatically
    #[serde(default)]
    pub max_restarts: u32,
    /// Zero runs fire-and-forget, otherwise run-and-wait with this deadline
    #[serde(default)]
    pub wait_for_exit_timeout_s: u32,
    #[serde(default)]
    pub hide_window: bool,
    /// Reserved for a custom stop command, not issued by the supervisor
    #[serde(default)]
    pub stop_path: PathBuf,
    #[serde(default)]
    pub stop_args: Vec<String>,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, start_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            start_path: start_path.into(),
            start_args: Vec::new(),
            start_delay_s: 0,
            max_restarts: 0,
            wait_for_exit_timeout_s: 0,
            hide_window: false,
            stop_path: PathBuf::new(),
            stop_args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_start_delay(mut self, seconds: u32) -> Self {
        self.start_delay_s = seconds;
        self
    }

    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    pub fn with_wait_timeout(mut self, seconds: u32) -> Self {
        self.wait_for_exit_timeout_s = seconds;
        self
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.start_delay_s))
    }

    /// Deadline of a run-and-wait process, `None` for fire-and-forget ones.
    pub fn wait_timeout(&self) -> Option<Duration> {
        match self.wait_for_exit_timeout_s {
            0 => None,
            s => Some(Duration::from_secs(u64::from(s))),
        }
    }

    pub fn is_run_and_wait(&self) -> bool {
        self.wait_for_exit_timeout_s > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoggingConfig {
    #[serde(default = "default_logs_folder")]
    pub logs_folder: PathBuf,
    /// Rotation size of the supervisor log in MB, zero means unlimited
    #[serde(rename = "LogFileSizeMB", default = "default_log_file_size_mb")]
    pub log_file_size_mb: u32,
    #[serde(default)]
    pub log_debug_enabled: bool,
    /// Output files kept per process when old ones are purged at startup
    #[serde(default = "default_process_logs_kept")]
    pub process_logs_kept: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            logs_folder: default_logs_folder(),
            log_file_size_mb: default_log_file_size_mb(),
            log_debug_enabled: false,
            process_logs_kept: default_process_logs_kept(),
        }
    }
}

fn default_logs_folder() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_log_file_size_mb() -> u32 {
    20
}

fn default_process_logs_kept() -> usize {
    10
}

/// In-memory form of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigData {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub tasks: Vec<ProcessSpec>,
}

impl ConfigData {
    /// Reads, decodes and validates a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (index, task) in self.tasks.iter().enumerate() {
            if task.name.trim().is_empty() {
                return Err(ConfigError::EmptyName(index));
            }
            if task.start_path.as_os_str().is_empty() {
                return Err(ConfigError::EmptyPath(task.name.clone()));
            }
            if !seen.insert(task.name.as_str()) {
                return Err(ConfigError::DuplicateName(task.name.clone()));
            }
        }
        Ok(())
    }

    /// Sample configuration written by `--default-config`.
    pub fn sample() -> Self {
        let heartbeat = ProcessSpec::new("Heartbeat", "/bin/sh")
            .with_args(["-c", "while true; do date; sleep 5; done"])
            .with_max_restarts(3);

        let mut reporter = ProcessSpec::new("Reporter", "/bin/sh")
            .with_args(["-c", "uptime; sleep 60"])
            .with_start_delay(5);
        reporter.hide_window = true;

        Self {
            logging: LoggingConfig {
                log_debug_enabled: true,
                ..LoggingConfig::default()
            },
            tasks: vec![heartbeat, reporter],
        }
    }
}

/// Writes the sample configuration to `path`, refusing to overwrite an existing file.
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()))
        }
        Err(e) => return Err(write_err(e)),
    };

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    ConfigData::sample()
        .serialize(&mut serializer)
        .map_err(|e| write_err(e.into()))?;
    out.push(b'\n');

    file.write_all(&out).map_err(write_err)
}

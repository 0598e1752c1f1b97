use crate::models::{ProcessRecord, ProcessSpec, ProcessStatus};
use crate::services::log_files::LogFiles;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub type RecordMap = HashMap<String, ProcessRecord>;

/// Name to record map behind one exclusive lock.
///
/// Every read or write of a record goes through [`Registry::lock`]: launches, the monitor
/// scan and the shutdown pass alike. The lock is never held across a timer wait.
#[derive(Debug, Default)]
pub struct Registry {
    records: Mutex<RecordMap>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole map with one fresh record per spec.
    pub async fn initialize(&self, specs: impl IntoIterator<Item = Arc<ProcessSpec>>) {
        let mut records = self.records.lock().await;
        *records = specs
            .into_iter()
            .map(|spec| (spec.name.clone(), ProcessRecord::new(spec)))
            .collect();
        log::debug!("Registry initialized with {} processes", records.len());
    }

    pub async fn lock(&self) -> MutexGuard<'_, RecordMap> {
        self.records.lock().await
    }

    /// Copy of the status of one process.
    pub async fn get(&self, name: &str) -> Option<ProcessStatus> {
        self.records.lock().await.get(name).map(|r| r.status.clone())
    }

    /// Runs `visitor` on every record while holding the lock.
    pub async fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &mut ProcessRecord),
    {
        let mut records = self.records.lock().await;
        for (name, record) in records.iter_mut() {
            visitor(name, record);
        }
    }

    /// Status copies of all processes, sorted by name.
    pub async fn snapshot(&self) -> Vec<(String, ProcessStatus)> {
        let mut out = Vec::new();
        self.for_each(|name, record| out.push((name.to_string(), record.status.clone())))
            .await;
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Period of the monitor loop's liveness scan
    pub monitor_interval: Duration,
    /// How long the terminator waits for a killed process to be reaped
    pub reap_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_millis(100),
            reap_timeout: Duration::from_secs(5),
        }
    }
}

/// Everything one supervisor instance owns, shared by all of its tasks.
pub struct SupervisorState {
    pub registry: Registry,
    pub log_files: LogFiles,
    /// Set once by the shutdown coordinator
    pub stop: CancellationToken,
    /// Monitor loop, launch and restart tasks
    pub tasks: TaskTracker,
    pub settings: SupervisorSettings,
}

pub type SharedState = Arc<SupervisorState>;

pub fn new_state(log_files: LogFiles, settings: SupervisorSettings) -> SharedState {
    Arc::new(SupervisorState {
        registry: Registry::new(),
        log_files,
        stop: CancellationToken::new(),
        tasks: TaskTracker::new(),
        settings,
    })
}

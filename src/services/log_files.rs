use chrono::Local;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

lazy_static! {
    static ref UNSAFE_FILENAME_CHARS: Regex = Regex::new(r"[^A-Za-z0-9._-]").expect("valid regex");
}

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Open output file of one launch of a managed process.
///
/// The child gets duplicated handles for stdout and stderr, so closing the sink only
/// releases the supervisor's own handle.
#[derive(Debug)]
pub struct LogSink {
    file: File,
    path: PathBuf,
}

impl LogSink {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Handles for the child's stdout and stderr.
    pub fn stdio(&self) -> io::Result<(Stdio, Stdio)> {
        let out = self.file.try_clone()?;
        let err = self.file.try_clone()?;
        Ok((Stdio::from(out), Stdio::from(err)))
    }

    pub fn close(self) {
        log::debug!("Closing process log <{}>", self.path.display());
        drop(self.file);
    }
}

/// Hands out per-process log sinks inside the logs folder.
#[derive(Debug, Clone)]
pub struct LogFiles {
    folder: PathBuf,
    keep_per_process: usize,
}

impl LogFiles {
    pub fn new(folder: impl Into<PathBuf>, keep_per_process: usize) -> Self {
        Self {
            folder: folder.into(),
            keep_per_process,
        }
    }

    /// Creates `<name>_<timestamp>.log`, appending `_<n>` when a launch in the same second
    /// already claimed that name.
    pub fn open_sink(&self, process_name: &str) -> io::Result<LogSink> {
        fs::create_dir_all(&self.folder)?;

        let stem = format!(
            "{}_{}",
            sanitize_name(process_name),
            Local::now().format(TIMESTAMP_FORMAT)
        );

        let mut counter = 0u32;
        loop {
            let file_name = match counter {
                0 => format!("{}.log", stem),
                n => format!("{}_{}.log", stem, n),
            };
            let path = self.folder.join(file_name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok(LogSink { file, path }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => counter += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Deletes all but the newest `keep_per_process` output files of a process.
    /// Returns the number of files removed.
    pub fn purge_old(&self, process_name: &str) -> io::Result<usize> {
        let pattern = format!(
            r"^{}_(\d{{14}})(?:_(\d+))?\.log$",
            regex::escape(&sanitize_name(process_name))
        );
        let matcher = Regex::new(&pattern).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let entries = match fs::read_dir(&self.folder) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(caps) = matcher.captures(file_name) {
                let stamp = caps[1].to_string();
                let counter = caps
                    .get(2)
                    .and_then(|m| m.as_str().parse::<u32>().ok())
                    .unwrap_or(0);
                found.push((stamp, counter, entry.path()));
            }
        }

        if found.len() <= self.keep_per_process {
            return Ok(0);
        }

        // newest first
        found.sort_by(|a, b| (&b.0, b.1).cmp(&(&a.0, a.1)));

        let mut removed = 0;
        for (_, _, path) in found.into_iter().skip(self.keep_per_process) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("Could not delete old process log <{}>: {}", path.display(), e),
            }
        }
        Ok(removed)
    }
}

fn sanitize_name(name: &str) -> String {
    UNSAFE_FILENAME_CHARS.replace_all(name, "_").into_owned()
}

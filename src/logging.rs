use anyhow::anyhow;
use chrono::Local;
use env_logger::{Env, Target};
use log::Level;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing_rolling_file::RollingFileAppenderBase;

use crate::models::LoggingConfig;

/// Prefix of the supervisor's own log files.
pub const LOG_FILE_PREFIX: &str = "process-controller";

/// Rolled-over supervisor log files kept next to the current one.
const ARCHIVED_LOG_FILES: usize = 1;

/// Sets up the `log` facade: level from the config (overridable through `RUST_LOG`),
/// records written to a file in the logs folder that rolls over daily and at
/// `LogFileSizeMB`, and optionally mirrored to stderr.
pub fn init(config: &LoggingConfig, console: bool) -> anyhow::Result<()> {
    let max_bytes = u64::from(config.log_file_size_mb) * 1024 * 1024;
    let appender = build_appender(&config.logs_folder, max_bytes)?;
    let writer = ConsoleMirror::new(appender, console);

    let default_level = if config.log_debug_enabled { "debug" } else { "info" };

    env_logger::Builder::from_env(Env::default().default_filter_or(default_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{}-{} {}] {}",
                level_char(record.level()),
                Local::now().format("%H:%M:%S"),
                record.target(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(writer)))
        .try_init()?;

    Ok(())
}

fn level_char(level: Level) -> char {
    match level {
        Level::Error => 'E',
        Level::Warn => 'W',
        Level::Info => 'I',
        Level::Debug => 'D',
        Level::Trace => 'T',
    }
}

/// Supervisor log appender: `<folder>/process-controller.log`, rolled over when the day
/// changes or the file reaches `max_bytes` (zero means no size limit).
fn build_appender(folder: &Path, max_bytes: u64) -> anyhow::Result<RollingFileAppenderBase> {
    fs::create_dir_all(folder)?;
    let filename = folder.join(format!("{}.log", LOG_FILE_PREFIX));

    let mut builder = RollingFileAppenderBase::builder()
        .filename(filename.to_string_lossy().into_owned())
        .condition_daily()
        .max_filecount(ARCHIVED_LOG_FILES);
    if max_bytes > 0 {
        builder = builder.condition_max_file_size(max_bytes);
    }

    builder
        .build()
        .map_err(|e| anyhow!("failed to build log file appender: {}", e))
}

/// Writer that copies every record to stderr when console logging is on.
struct ConsoleMirror<W> {
    inner: W,
    console: bool,
}

impl<W: Write> ConsoleMirror<W> {
    fn new(inner: W, console: bool) -> Self {
        Self { inner, console }
    }
}

impl<W: Write> Write for ConsoleMirror<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        if self.console {
            io::stderr().write_all(&buf[..written])?;
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()?;
        if self.console {
            io::stderr().flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_str().unwrap().to_string())
            .filter(|name| name.starts_with(LOG_FILE_PREFIX))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_rolls_over_on_size_and_keeps_two_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = build_appender(dir.path(), 10).unwrap();

        for _ in 0..4 {
            writer.write_all(b"0123456789").unwrap();
            writer.flush().unwrap();
        }

        assert_eq!(
            log_files_in(dir.path()),
            vec!["process-controller.log", "process-controller.log.1"]
        );
    }

    #[test]
    fn test_unlimited_size_stays_in_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = build_appender(dir.path(), 0).unwrap();

        for _ in 0..5 {
            writer.write_all(b"0123456789").unwrap();
        }
        writer.flush().unwrap();

        assert_eq!(log_files_in(dir.path()), vec!["process-controller.log"]);
        let written = fs::read_to_string(dir.path().join("process-controller.log")).unwrap();
        assert_eq!(written.len(), 50);
    }

    #[test]
    fn test_mirror_passes_records_through() {
        let mut mirror = ConsoleMirror::new(Vec::new(), false);
        mirror.write_all(b"I-10:00:00 pc] hello\n").unwrap();
        mirror.flush().unwrap();
        assert_eq!(mirror.inner, b"I-10:00:00 pc] hello\n".to_vec());
    }

    #[test]
    fn test_level_char() {
        assert_eq!(level_char(Level::Error), 'E');
        assert_eq!(level_char(Level::Debug), 'D');
    }
}

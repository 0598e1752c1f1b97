pub mod launcher;
pub mod log_files;
pub mod monitor;
pub mod process_checker;
pub mod restart;
pub mod terminator;

pub use log_files::{LogFiles, LogSink};

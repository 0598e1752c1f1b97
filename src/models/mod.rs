pub mod config;
pub mod process;

pub use config::{write_default_config, ConfigData, LoggingConfig, ProcessSpec};
pub use process::{ProcessRecord, ProcessStatus};

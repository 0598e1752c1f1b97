use clap::Parser;
use std::path::PathBuf;

/// Process Controller - starts, monitors and restarts a configured set of processes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Path to the configuration file, JSON format
    #[arg(short = 'c', long, env = "PC_CONFIG_FILE", default_value = "./pc-conf.json")]
    pub config_file: PathBuf,

    /// Create a default configuration file at this path and exit
    #[arg(short = 'd', long, value_name = "PATH")]
    pub default_config: Option<PathBuf>,

    /// Mirror the supervisor log to stderr
    #[arg(long, env = "PC_CONSOLE_LOG")]
    pub console_log: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CommandArgs::try_parse_from(["process-controller"]).unwrap();
        assert_eq!(args.config_file, PathBuf::from("./pc-conf.json"));
        assert!(args.default_config.is_none());
        assert!(!args.console_log);
    }

    #[test]
    fn test_default_config_flag() {
        let args =
            CommandArgs::try_parse_from(["process-controller", "-d", "new.json", "--console-log"]).unwrap();
        assert_eq!(args.default_config, Some(PathBuf::from("new.json")));
        assert!(args.console_log);
    }
}

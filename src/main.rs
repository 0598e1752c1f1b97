use anyhow::Context;
use clap::Parser;

use process_controller::cli::CommandArgs;
use process_controller::logging;
use process_controller::models::{write_default_config, ConfigData};
use process_controller::services::LogFiles;
use process_controller::state::SupervisorSettings;
use process_controller::Supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CommandArgs::parse();

    if let Some(path) = &args.default_config {
        write_default_config(path)?;
        println!("Created default configuration file {}", path.display());
        return Ok(());
    }

    let config = ConfigData::load(&args.config_file)?;
    logging::init(&config.logging, args.console_log).context("could not set up logging")?;
    log::info!(
        "Application successfully initialized with {} processes. Starting up",
        config.tasks.len()
    );

    let log_files = LogFiles::new(&config.logging.logs_folder, config.logging.process_logs_kept);
    let supervisor = Supervisor::new(log_files, SupervisorSettings::default());
    supervisor.start(config.tasks).await;

    let signal = wait_for_shutdown_signal().await?;
    log::info!("Shutdown request received: {}", signal);

    let report = supervisor.shutdown().await;
    log::info!(
        "Application shutting down, {} processes terminated. Waiting for pending tasks...",
        report.terminated
    );
    supervisor.wait().await;

    for (name, status) in supervisor.statuses().await {
        log::info!(
            "Process <{}>: launches={} restarts={} error={} done={} timed_out={}",
            name,
            status.launches,
            status.restart_count,
            status.has_error,
            status.done,
            status.timed_out
        );
    }
    if !report.failures.is_empty() {
        log::error!("{} processes could not be killed", report.failures.len());
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("could not register SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("could not listen for Ctrl-C")?;
            Ok("interrupt")
        }
        _ = terminate.recv() => Ok("terminate"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<&'static str> {
    tokio::signal::ctrl_c().await.context("could not listen for Ctrl-C")?;
    Ok("interrupt")
}

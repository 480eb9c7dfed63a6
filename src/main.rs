//! vigil - run periodic background work under a managed lifecycle.
//!
//! Main entry point for the vigil CLI and daemon.

mod app;
mod cli;
mod control;

use std::error::Error;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use vigil_config::{ConfigSnapshot, ConfigSource, FileConfigSource, StaticConfigSource};
use vigil_daemon::{logging, Controller, DaemonError};

use crate::app::Heartbeat;
use crate::cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let source = match config_source(cli.config.as_deref()) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("vigil: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let snapshot = match source.load() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!(
                "vigil: failed to load configuration from {}: {}",
                source.describe(),
                e
            );
            return ExitCode::FAILURE;
        }
    };

    let command = cli.command.unwrap_or(Commands::Run { foreground: false });
    let result = match command {
        Commands::Run { foreground } => run(source, snapshot, foreground),
        Commands::Stop { pid_file, timeout } => with_terminal_logging(&snapshot, |snapshot| {
            let pid_file = control::pid_file(pid_file, snapshot)?;
            control::stop(&pid_file, Duration::from_secs(timeout))?;
            Ok(ExitCode::SUCCESS)
        }),
        Commands::Reload { pid_file } => with_terminal_logging(&snapshot, |snapshot| {
            control::reload(&control::pid_file(pid_file, snapshot)?)?;
            Ok(ExitCode::SUCCESS)
        }),
        Commands::Signal { which, pid_file } => with_terminal_logging(&snapshot, |snapshot| {
            control::signal(&control::pid_file(pid_file, snapshot)?, which)?;
            Ok(ExitCode::SUCCESS)
        }),
        Commands::Status { pid_file } => with_terminal_logging(&snapshot, |snapshot| {
            let running = control::status(&control::pid_file(pid_file, snapshot)?)?;
            // LSB: 3 means "not running".
            Ok(if running { ExitCode::SUCCESS } else { ExitCode::from(3) })
        }),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("vigil: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn config_source(path: Option<&Path>) -> Result<Arc<dyn ConfigSource>, Box<dyn Error>> {
    let source: Arc<dyn ConfigSource> = match path {
        Some(path) => Arc::new(FileConfigSource::new(path)?),
        None => Arc::new(StaticConfigSource::default()),
    };
    Ok(source)
}

/// Run the daemon until it stops.
fn run(
    source: Arc<dyn ConfigSource>,
    snapshot: ConfigSnapshot,
    foreground: bool,
) -> Result<ExitCode, Box<dyn Error>> {
    // Fork before any runtime thread exists.
    #[cfg(unix)]
    if !foreground {
        vigil_daemon::Daemonizer::new(&snapshot.daemon).daemonize()?;
    }
    #[cfg(not(unix))]
    let foreground = {
        if !foreground {
            eprintln!("vigil: daemonizing is not supported on this platform, staying in foreground");
        }
        true
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("vigil-worker")
        .build()?;

    runtime.block_on(async move {
        let logging = Arc::new(logging::init(&snapshot.logging, foreground)?);
        info!(
            version = env!("CARGO_PKG_VERSION"),
            pid = std::process::id(),
            foreground,
            "vigil starting"
        );

        let controller = Controller::builder(Heartbeat::default())
            .shared_config_source(source)
            .logging(logging)
            .build()?;
        if let Err(e) = controller.start().await {
            error!("vigil stopped with an error: {}", e);
            return Err(e.into());
        }

        info!("vigil exiting");
        Ok::<_, Box<dyn Error>>(ExitCode::SUCCESS)
    })
}

/// Run a control subcommand with terminal logging.
fn with_terminal_logging<F>(
    snapshot: &ConfigSnapshot,
    command: F,
) -> Result<ExitCode, Box<dyn Error>>
where
    F: FnOnce(&ConfigSnapshot) -> Result<ExitCode, DaemonError>,
{
    let _logging = logging::init(&snapshot.logging, true)?;
    Ok(command(snapshot)?)
}

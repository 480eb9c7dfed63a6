//! CLI definitions for vigil.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// vigil CLI.
#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Run periodic background work under a managed lifecycle")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (TOML, YAML or JSON)
    #[arg(short, long, env = "VIGIL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the daemon (default)
    Run {
        /// Stay attached to the terminal instead of daemonizing
        #[arg(short, long)]
        foreground: bool,
    },

    /// Ask a running daemon to stop and wait for it to exit
    Stop {
        /// PID file path (overrides daemon.pidfile)
        #[arg(long)]
        pid_file: Option<PathBuf>,

        /// Seconds to wait for the daemon to exit
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// Ask a running daemon to reload its configuration
    Reload {
        /// PID file path (overrides daemon.pidfile)
        #[arg(long)]
        pid_file: Option<PathBuf>,
    },

    /// Deliver a user signal to a running daemon
    Signal {
        /// Which user signal to send
        #[arg(value_enum)]
        which: UserSignal,

        /// PID file path (overrides daemon.pidfile)
        #[arg(long)]
        pid_file: Option<PathBuf>,
    },

    /// Show whether the daemon is running
    Status {
        /// PID file path (overrides daemon.pidfile)
        #[arg(long)]
        pid_file: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum UserSignal {
    Usr1,
    Usr2,
}

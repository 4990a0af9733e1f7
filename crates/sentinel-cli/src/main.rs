//! Sentinel - active integrity checks for SD cards
//!
//! # Usage
//!
//! ```bash
//! # List removable drives
//! sentinel drives
//!
//! # Quick check of the first removable drive
//! sentinel check
//!
//! # Quick check of a specific card, testing 10% of its free space
//! sentinel check /media/user/SDCARD --fraction 0.1
//!
//! # Full sweep: verify every file, then test all free space
//! sentinel sweep /media/user/SDCARD
//!
//! # When is the next sweep due?
//! sentinel status /media/user/SDCARD
//! ```

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use console::style;
use sentinel_core::{AbortToken, Outcome};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing_subscriber::EnvFilter;

mod commands;
mod progress;

use commands::Session;

/// Sentinel - active integrity checks for SD cards and removable flash storage
#[derive(Parser)]
#[command(name = "sentinel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress progress bars and log output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Directory holding manifests and the schedule (default: user data dir)
    #[arg(long, global = true, env = "SENTINEL_DATA_DIR", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Configuration file to use instead of the default location
    #[arg(long, global = true, env = "SENTINEL_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a slice of free space with a known pattern and read it back
    Check {
        /// Mount point of the card (default: first removable drive)
        drive: Option<PathBuf>,

        /// Share of usable free space to test, in (0, 1]
        #[arg(short, long)]
        fraction: Option<f64>,

        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Verify every file against the stored manifest, then test all free space
    Sweep {
        /// Mount point of the card (default: first removable drive)
        drive: Option<PathBuf>,

        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List mounted drives
    Drives {
        /// Include internal drives
        #[arg(short, long)]
        all: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show check history and whether a sweep is due
    Status {
        /// Mount point of the card (default: first removable drive)
        drive: Option<PathBuf>,

        /// Sweep interval in days to judge against instead of the stored one
        #[arg(long, value_name = "DAYS")]
        interval: Option<u32>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration file
    Config {
        /// Initialize a new configuration file with defaults
        #[arg(long)]
        init: bool,

        /// Show the path to the configuration file
        #[arg(long)]
        path: bool,

        /// Output configuration in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    // Set up panic handler for better error messages
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{} {}", style("Error:").red().bold(), panic_info);
    }));

    match run() {
        Ok(Outcome::Passed) => {}
        Ok(_) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);

            // Show cause chain in verbose mode
            if std::env::var("RUST_BACKTRACE").is_ok() {
                let mut source = e.source();
                while let Some(cause) = source {
                    eprintln!("  {} {}", style("Caused by:").yellow(), cause);
                    source = cause.source();
                }
            }

            std::process::exit(1);
        }
    }
}

fn run() -> Result<Outcome> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else if cli.quiet {
        EnvFilter::new("off")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    // First Ctrl+C asks the running scan to stop, the second one forces exit
    let abort = AbortToken::new();
    let flag = abort.handle();
    let quiet_for_handler = cli.quiet;
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            if !quiet_for_handler {
                eprintln!("\n{}", style("Forced exit").red().bold());
            }
            std::process::exit(130);
        }
        if !quiet_for_handler {
            eprintln!(
                "\n{}",
                style("Cancelling... Press Ctrl+C again to force exit").yellow()
            );
        }
    })?;

    let session = Session {
        data_dir: cli.data_dir,
        config_file: cli.config,
        quiet: cli.quiet,
        abort,
    };

    match cli.command {
        Commands::Check {
            drive,
            fraction,
            json,
        } => commands::check::execute(
            commands::check::CheckArgs {
                drive,
                fraction,
                json,
            },
            &session,
        ),
        Commands::Sweep { drive, json } => {
            commands::sweep::execute(drive.as_deref(), json, &session)
        }
        Commands::Drives { all, json } => {
            commands::drives::execute(all, json, session.quiet)?;
            Ok(Outcome::Passed)
        }
        Commands::Status {
            drive,
            interval,
            json,
        } => {
            commands::status::execute(drive.as_deref(), interval, json, &session)?;
            Ok(Outcome::Passed)
        }
        Commands::Config { init, path, json } => {
            commands::config::execute(commands::config::ConfigArgs {
                init,
                path,
                json,
                silent: false,
                config_file: session.config_file,
            })?;
            Ok(Outcome::Passed)
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(Outcome::Passed)
        }
    }
}

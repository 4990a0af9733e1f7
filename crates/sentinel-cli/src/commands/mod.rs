//! CLI command implementations

pub mod check;
pub mod config;
pub mod drives;
pub mod status;
pub mod sweep;

use anyhow::{Context, Result};
use console::style;
use sentinel_core::{AbortToken, DriveDescriptor, Outcome, Sentinel, Settings};
use std::path::{Path, PathBuf};

/// Options shared by every command that touches a drive
pub struct Session {
    /// Override for the manifest and schedule directory
    pub data_dir: Option<PathBuf>,
    /// Override for the settings file
    pub config_file: Option<PathBuf>,
    /// Suppress progress bars and chatter
    pub quiet: bool,
    /// Set by the Ctrl+C handler
    pub abort: AbortToken,
}

impl Session {
    /// Settings from the configured file, or defaults
    pub fn settings(&self) -> Settings {
        Settings::load_from_path(self.config_file.clone().or_else(Settings::config_path))
    }

    /// Whether human-readable chatter should be printed
    pub fn chatty(&self, json: bool) -> bool {
        !json && !self.quiet && !self.settings().behavior.quiet
    }

    /// Open the engine over the configured data directory
    pub fn open(&self) -> Result<Sentinel> {
        let config = self
            .settings()
            .scan_config()
            .context("Invalid configuration file")?;

        let sentinel = match &self.data_dir {
            Some(dir) => Sentinel::open_in(dir, config),
            None => Sentinel::open_default(config),
        };
        sentinel.context("Failed to open the Sentinel data directory")
    }
}

/// The drive at `path`, or the first removable drive when none is given
pub fn resolve_drive(path: Option<&Path>) -> Result<DriveDescriptor> {
    match path {
        Some(path) => sentinel_detect::describe_path(path)
            .with_context(|| format!("Cannot use {} as a drive", path.display())),
        None => Ok(sentinel_detect::default_drive()?),
    }
}

/// Print the drive being scanned
pub fn print_drive_header(verb: &str, drive: &DriveDescriptor) {
    println!(
        "{} {}",
        style(verb).bold(),
        style(drive.display_name()).cyan()
    );
    println!("  {}", drive.size_display());
    println!();
}

/// Print the headline for a finished scan
pub fn print_outcome(outcome: Outcome, message: &str) {
    let marker = match outcome {
        Outcome::Passed => style("✓").green().bold(),
        Outcome::Failed => style("✗").red().bold(),
        Outcome::Aborted | Outcome::Error => style("!").yellow().bold(),
    };
    let message = match outcome {
        Outcome::Passed => style(message).green(),
        Outcome::Failed => style(message).red(),
        Outcome::Aborted | Outcome::Error => style(message).yellow(),
    };
    println!("{} {}", marker, message);
}

/// Print details, confidence, warnings and caveats
pub fn print_notes(details: &str, confidence: u8, warnings: &[String], caveats: &[String]) {
    if !details.is_empty() {
        for line in details.lines() {
            println!("  {}", line);
        }
    }
    println!("  {} {}%", style("Confidence:").dim(), confidence);

    if !warnings.is_empty() {
        println!();
        for warning in warnings {
            println!("{} {}", style("Warning:").yellow(), warning);
        }
    }

    println!();
    for caveat in caveats {
        println!("{}", style(caveat).dim());
    }
}

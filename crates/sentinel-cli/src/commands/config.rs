//! Configuration file management command

use anyhow::{Context, Result};
use console::style;
use sentinel_core::Settings;
use std::path::PathBuf;

/// Arguments for the config command
pub struct ConfigArgs {
    /// Initialize a new configuration file with defaults
    pub init: bool,
    /// Show the path to the configuration file
    pub path: bool,
    /// Show configuration in JSON format
    pub json: bool,
    /// Suppress output (for scripting)
    pub silent: bool,
    /// Custom configuration file path (overrides default)
    pub config_file: Option<PathBuf>,
}

/// Execute the config command
pub fn execute(args: ConfigArgs) -> Result<()> {
    let config_path = args.config_file.clone().or_else(Settings::config_path);

    if args.path {
        if let Some(path) = &config_path {
            if !args.silent {
                println!("{}", path.display());
            }
        } else if !args.silent {
            eprintln!("{}", style("Could not determine config path").yellow());
        }
        return Ok(());
    }

    if args.init {
        return init_config(config_path, args.silent);
    }

    show_config(config_path, args.json, args.silent)
}

/// Initialize a new configuration file with default values
fn init_config(config_path: Option<PathBuf>, silent: bool) -> Result<()> {
    let path = config_path.context("Could not determine configuration directory")?;

    if path.exists() {
        if !silent {
            eprintln!(
                "{} Configuration file already exists at: {}",
                style("Warning:").yellow(),
                path.display()
            );
            eprintln!("Use a text editor to modify it, or delete it to re-initialize.");
        }
        return Ok(());
    }

    let saved_path = Settings::default()
        .save_to_path(Some(path))
        .context("Failed to save configuration file")?;

    if !silent {
        println!(
            "{} Created configuration file at: {}",
            style("Success:").green(),
            saved_path.display()
        );
        println!();
        println!("Example settings:");
        println!();
        println!("  [check]");
        println!("  size_fraction = 0.05   # Share of free space a quick check tests");
        println!();
        println!("  [sweep]");
        println!("  interval_days = 14     # Default days between full sweeps");
        println!("  verify_passes = 1      # Extra read-back passes");
    }

    Ok(())
}

/// Show the current configuration
fn show_config(config_path: Option<PathBuf>, json: bool, silent: bool) -> Result<()> {
    if silent {
        return Ok(());
    }

    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let settings = Settings::load_from_path(config_path.clone());

    if json {
        let json_output = serde_json::to_string_pretty(&settings)
            .context("Failed to serialize settings to JSON")?;
        println!("{}", json_output);
        return Ok(());
    }

    println!("{}", style("Sentinel Configuration").bold());
    println!();

    if let Some(path) = &config_path {
        if config_exists {
            println!("  {} {}", style("Config file:").dim(), path.display());
        } else {
            println!(
                "  {} {} {}",
                style("Config file:").dim(),
                path.display(),
                style("(not found, using defaults)").yellow()
            );
        }
    }
    println!();

    println!("{}", style("[check]").cyan());
    println!("  size_fraction = {}", settings.check.size_fraction);
    println!("  chunk_size = \"{}\"", settings.check.chunk_size);
    println!("  verify_passes = {}", settings.check.verify_passes);
    println!();

    println!("{}", style("[sweep]").cyan());
    println!("  interval_days = {}", settings.sweep.interval_days);
    println!("  chunk_size = \"{}\"", settings.sweep.chunk_size);
    println!("  verify_passes = {}", settings.sweep.verify_passes);
    println!();

    println!("{}", style("[behavior]").cyan());
    println!("  quiet = {}", settings.behavior.quiet);

    if let Err(e) = settings.scan_config() {
        println!();
        println!("{} {}", style("Invalid:").red().bold(), e);
    }

    if !config_exists {
        println!();
        println!(
            "{}",
            style("Run 'sentinel config --init' to create a configuration file.").dim()
        );
    }

    Ok(())
}

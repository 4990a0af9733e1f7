//! Drives command - displays mounted drives

use anyhow::{Context, Result};
use console::style;
use sentinel_core::DriveDescriptor;

/// Execute the drives command
pub fn execute(show_all: bool, json: bool, quiet: bool) -> Result<()> {
    let all_drives = sentinel_detect::list_drives()?;

    let drives: Vec<_> = if show_all {
        all_drives.clone()
    } else {
        all_drives
            .iter()
            .filter(|d| d.is_removable())
            .cloned()
            .collect()
    };

    // JSON output mode - always output even in quiet mode (it's machine-readable)
    if json {
        let output =
            serde_json::to_string_pretty(&drives).context("Failed to serialize drives to JSON")?;
        println!("{}", output);
        return Ok(());
    }

    if quiet {
        return Ok(());
    }

    if drives.is_empty() {
        if show_all {
            println!("No drives found.");
        } else {
            println!("No removable drives found.");
            println!(
                "{}",
                style("Tip: Use --all to show internal drives, or pass a mount point to check/sweep")
                    .dim()
            );
        }
        return Ok(());
    }

    println!(
        "{} {} drive(s):\n",
        style("Found").green().bold(),
        drives.len()
    );

    for drive in &drives {
        print_drive(drive);
    }

    if !show_all {
        let hidden = all_drives.len() - drives.len();
        if hidden > 0 {
            println!(
                "{}",
                style(format!(
                    "Note: {} internal drive(s) hidden. Use --all to show.",
                    hidden
                ))
                .dim()
            );
        }
    }

    Ok(())
}

/// Print a single drive's information
fn print_drive(drive: &DriveDescriptor) {
    let (status, media) = if drive.is_removable() {
        (style("✓").green().bold(), style("removable").cyan())
    } else {
        (style("✗").red().bold(), style("internal").yellow())
    };

    println!(
        "{} {} ({}, {})",
        status,
        style(drive.display_name()).white().bold(),
        drive.size_display(),
        media
    );
    println!(
        "    Filesystem: {} | Fingerprint: {}",
        drive.filesystem.as_deref().unwrap_or("unknown"),
        style(&drive.fingerprint).dim()
    );
    println!();
}

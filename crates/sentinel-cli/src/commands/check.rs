//! Check command - quick write/read-back test of free space

use anyhow::{Context, Result};
use console::style;
use sentinel_core::{format_bytes, format_speed, Outcome, QuickCheckResult};
use std::path::PathBuf;

use super::{print_drive_header, print_notes, print_outcome, resolve_drive, Session};
use crate::progress::BarProgress;

/// Arguments for the check command
pub struct CheckArgs {
    /// Card to check, or the default drive
    pub drive: Option<PathBuf>,
    /// Share of free space to test (overrides the configured one)
    pub fraction: Option<f64>,
    /// Print the result as JSON
    pub json: bool,
}

/// Execute the check command
pub fn execute(args: CheckArgs, session: &Session) -> Result<Outcome> {
    let sentinel = session.open()?;
    let drive = resolve_drive(args.drive.as_deref())?;
    let chatty = session.chatty(args.json);

    if chatty {
        print_drive_header("Quick check of", &drive);
    }

    let progress = BarProgress::new(!chatty);
    let result = sentinel.run_quick_check(
        &drive,
        args.fraction,
        Some(&progress),
        Some(&session.abort),
    );
    progress.finish();

    if args.json {
        let output =
            serde_json::to_string_pretty(&result).context("Failed to serialize result to JSON")?;
        println!("{}", output);
    } else if !session.quiet {
        print_result(&result);
    }

    Ok(result.outcome)
}

fn print_result(result: &QuickCheckResult) {
    print_outcome(result.outcome, &result.message);

    if result.bytes_tested > 0 {
        println!(
            "  {} {} of {} ({} chunks)",
            style("Tested:").dim(),
            format_bytes(result.bytes_tested),
            format_bytes(result.test_size),
            result.chunks_verified
        );
        println!(
            "  {} write {}, read {} in {:.1}s",
            style("Speed:").dim(),
            format_speed(result.write_speed_bps),
            format_speed(result.read_speed_bps),
            result.elapsed_secs
        );
    }
    if let Some(offset) = result.first_mismatch_offset {
        println!(
            "  {} {}",
            style("First bad byte at offset:").red(),
            offset
        );
    }

    print_notes(
        &result.details,
        result.confidence,
        &result.warnings,
        &result.caveats,
    );
}

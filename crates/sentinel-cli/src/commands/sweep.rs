//! Sweep command - verify every file, then test all free space

use anyhow::{Context, Result};
use console::style;
use sentinel_core::{format_bytes, FullSweepResult, Outcome};
use std::path::Path;

use super::{print_drive_header, print_notes, print_outcome, resolve_drive, Session};
use crate::progress::BarProgress;

/// How many paths to list before summarizing the rest
const MAX_LISTED_PATHS: usize = 20;

/// Execute the sweep command
pub fn execute(drive: Option<&Path>, json: bool, session: &Session) -> Result<Outcome> {
    let sentinel = session.open()?;
    let drive = resolve_drive(drive)?;
    let chatty = session.chatty(json);

    if chatty {
        print_drive_header("Full sweep of", &drive);
    }

    let progress = BarProgress::new(!chatty);
    let result = sentinel.run_full_sweep(&drive, Some(&progress), Some(&session.abort));
    progress.finish();

    if json {
        let output =
            serde_json::to_string_pretty(&result).context("Failed to serialize result to JSON")?;
        println!("{}", output);
    } else if !session.quiet {
        print_result(&result);
    }

    Ok(result.outcome)
}

fn print_result(result: &FullSweepResult) {
    print_outcome(result.outcome, &result.message);

    let files = if result.manifest_built_fresh {
        style("indexed").cyan()
    } else if result.manifest_passed {
        style("verified").green()
    } else {
        style("checked").red()
    };
    println!(
        "  {} {} {}",
        style("Files:").dim(),
        result.files_checked,
        files
    );
    if let Some(reason) = &result.manifest_rebuild_reason {
        println!("  {} {}", style("Index rebuilt:").dim(), reason);
    }
    if !result.added.is_empty() || !result.removed.is_empty() {
        println!(
            "  {} {} added, {} removed since last sweep",
            style("Changes:").dim(),
            result.added.len(),
            result.removed.len()
        );
    }
    print_paths("Changed:", &result.mismatched_paths);
    print_paths("Unreadable:", &result.unreadable);

    if result.free_space_test_size > 0 {
        println!(
            "  {} {} of {} {}",
            style("Free space:").dim(),
            format_bytes(result.free_space_bytes_tested),
            format_bytes(result.free_space_test_size),
            if result.free_space_passed {
                style("read back correctly").green()
            } else {
                style("did not read back").red()
            }
        );
    }

    print_notes(
        &result.details,
        result.confidence,
        &result.warnings,
        &result.caveats,
    );

    if let Some(rec) = &result.recommendation {
        println!(
            "{} {}",
            style(format!("Next sweep in {} days:", rec.interval_days)).bold(),
            rec.hint
        );
    }
}

fn print_paths(label: &str, paths: &[String]) {
    if paths.is_empty() {
        return;
    }
    println!("  {}", style(label).red());
    for path in paths.iter().take(MAX_LISTED_PATHS) {
        println!("    {}", path);
    }
    if paths.len() > MAX_LISTED_PATHS {
        println!("    ... and {} more", paths.len() - MAX_LISTED_PATHS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::AbortToken;
    use tempfile::TempDir;

    #[test]
    fn test_sweep_missing_drive_is_an_error() {
        let dir = TempDir::new().unwrap();
        let session = Session {
            data_dir: Some(dir.path().join("data")),
            config_file: Some(dir.path().join("missing.toml")),
            quiet: true,
            abort: AbortToken::new(),
        };
        let result = execute(Some(Path::new("/nonexistent/sentinel/card")), true, &session);
        assert!(result.is_err());
    }

    #[test]
    fn test_sweep_aborted_up_front_records_nothing() {
        let dir = TempDir::new().unwrap();
        let card = TempDir::new().unwrap();
        std::fs::write(card.path().join("photo.jpg"), b"pixels").unwrap();

        let session = Session {
            data_dir: Some(dir.path().join("data")),
            config_file: Some(dir.path().join("missing.toml")),
            quiet: true,
            abort: AbortToken::new(),
        };
        session.abort.abort();

        let outcome = execute(Some(card.path()), true, &session).unwrap();
        assert_eq!(outcome, Outcome::Aborted);
        assert!(!dir.path().join("data").join("schedule.json").exists());
    }
}

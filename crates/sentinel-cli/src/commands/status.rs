//! Status command - check history, next sweep and drive warnings

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use console::style;
use sentinel_core::recommend::next_sweep_due;
use sentinel_core::{DriveDescriptor, Recommendation, Sentinel};
use serde::Serialize;
use std::path::Path;

use super::{resolve_drive, Session};

/// Everything known about one drive's checking schedule
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// The drive described
    pub drive: DriveDescriptor,
    /// Last completed quick check of this drive
    pub last_check_time: Option<DateTime<Utc>>,
    /// Last completed full sweep of this drive
    pub last_sweep_time: Option<DateTime<Utc>>,
    /// Interval the due date is judged against
    pub sweep_interval_days: u32,
    /// Whether a full sweep should run now
    pub sweep_due: bool,
    /// When the next sweep falls due, if one ever ran
    pub next_sweep_due: Option<DateTime<Utc>>,
    /// Interval suggested for the drive as it is now
    pub recommendation: Recommendation,
    /// Problems with the drive itself
    pub warnings: Vec<String>,
}

impl StatusReport {
    /// Gather the status of `drive`
    pub fn collect(sentinel: &Sentinel, drive: DriveDescriptor, interval: Option<u32>) -> Self {
        let sweep_interval_days = interval.unwrap_or_else(|| sentinel.sweep_interval_days(&drive));
        let last_sweep_time = sentinel.last_sweep_time(Some(&drive));

        Self {
            last_check_time: sentinel.last_check_time(Some(&drive)),
            last_sweep_time,
            sweep_interval_days,
            sweep_due: sentinel.is_sweep_due(&drive, interval),
            next_sweep_due: next_sweep_due(last_sweep_time, sweep_interval_days),
            recommendation: sentinel.recommendation(&drive),
            warnings: sentinel.warnings(&drive),
            drive,
        }
    }
}

/// Execute the status command
pub fn execute(
    drive: Option<&Path>,
    interval: Option<u32>,
    json: bool,
    session: &Session,
) -> Result<()> {
    let sentinel = session.open()?;
    let drive = resolve_drive(drive)?;
    let report = StatusReport::collect(&sentinel, drive, interval);

    if json {
        let output =
            serde_json::to_string_pretty(&report).context("Failed to serialize status to JSON")?;
        println!("{}", output);
        return Ok(());
    }

    if session.quiet {
        return Ok(());
    }

    print_report(&report);
    Ok(())
}

fn print_report(report: &StatusReport) {
    println!("{}", style(report.drive.display_name()).bold());
    println!("  {} {}", style("Size:").dim(), report.drive.size_display());
    println!();

    println!(
        "  {} {}",
        style("Last quick check:").dim(),
        format_time(report.last_check_time)
    );
    println!(
        "  {} {}",
        style("Last full sweep: ").dim(),
        format_time(report.last_sweep_time)
    );

    if report.sweep_due {
        println!(
            "  {}",
            style(format!(
                "A full sweep is due (every {} days)",
                report.sweep_interval_days
            ))
            .yellow()
            .bold()
        );
    } else {
        println!(
            "  {} {} (every {} days)",
            style("Next sweep due:  ").dim(),
            format_time(report.next_sweep_due),
            report.sweep_interval_days
        );
    }

    println!();
    println!(
        "{} every {} days. {}",
        style("Recommended:").cyan(),
        report.recommendation.interval_days,
        report.recommendation.hint
    );

    for warning in &report.warnings {
        println!("{} {}", style("Warning:").yellow(), warning);
    }
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(
        || "never".to_string(),
        |t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
    )
}

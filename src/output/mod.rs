//! Output formatting for CLI display
//!
//! Listings are printed one path header followed by one line per version.
//! In quiet mode only the bare values are printed so output can be piped.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use std::io::{self, Write};

use crate::S3kitError;
use crate::commands::locks::VersionLocks;
use crate::commands::size::{SizeSpec, format_size};
use crate::commands::versions::VersionEntry;
use crate::pipeline::RunSummary;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Write `value` as pretty JSON to stdout
///
/// # Errors
/// Returns an error if serialization or the write fails.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), S3kitError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

/// Write `value` as one compact JSON line to `out`
///
/// # Errors
/// Returns an error if serialization or the write fails.
pub fn write_json_line<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> Result<(), S3kitError> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Header line for one object path
#[must_use]
pub fn path_header(path: &str, quiet: bool) -> String {
    if quiet {
        path.to_string()
    } else {
        path.bold().to_string()
    }
}

/// One version line; the current version is marked with `*`
#[must_use]
pub fn version_line(version: &VersionEntry, quiet: bool) -> String {
    if quiet {
        return version.version_id.clone();
    }
    let marker = if version.latest { "*" } else { " " };
    let line = format!(
        "  {marker} {}  {}",
        version.version_id,
        format_time(version.last_modified)
    );
    if version.latest {
        line.green().to_string()
    } else {
        line
    }
}

/// Version line followed by its tags
#[must_use]
pub fn tags_line(version: &VersionEntry, tags: &[String], quiet: bool) -> String {
    if quiet {
        return format!("{} {}", version.version_id, tags.join(","));
    }
    let tags = if tags.is_empty() {
        "(no tags)".dimmed().to_string()
    } else {
        format!("[{}]", tags.join(", ")).cyan().to_string()
    };
    format!("{} {tags}", version_line(version, false))
}

/// Version line followed by its lock state
#[must_use]
pub fn locks_line(locks: &VersionLocks, quiet: bool) -> String {
    let mut states = Vec::new();
    if locks.legal_hold {
        states.push("legal hold".to_string());
    }
    if let Some(until) = locks.governance_until {
        states.push(format!("governance until {}", format_time(until)));
    }
    if let Some(until) = locks.compliance_until {
        states.push(format!("compliance until {}", format_time(until)));
    }

    if quiet {
        return format!("{} {}", locks.version.version_id, states.join(","));
    }
    let states = if states.is_empty() {
        "(unlocked)".dimmed().to_string()
    } else {
        states.join(", ").yellow().to_string()
    };
    format!("{} {states}", version_line(&locks.version, false))
}

/// Completion line of a batch change
#[must_use]
pub fn run_summary(label: &str, summary: &RunSummary) -> String {
    format!(
        "{} {label}: {} version(s) listed in {} batch(es)",
        "✓".green(),
        summary.items,
        summary.batches
    )
}

/// Table of sizes with a total row
#[must_use]
pub fn size_table(rows: &[SizeSpec], raw: bool) -> String {
    let width = rows.iter().map(|row| row.path.len()).max().unwrap_or(0).max(6);
    let mut table = String::new();
    let (mut count, mut size) = (0u64, 0u64);
    for row in rows {
        count += row.count;
        size += row.size;
        table.push_str(&format!(
            "{:<width$}  {:>10}  {:>12}\n",
            row.path,
            row.count,
            row.display_size(raw)
        ));
    }
    let total = format!(
        "{:<width$}  {:>10}  {:>12}",
        "Total:",
        count,
        format_size(size, raw)
    );
    table.push_str(&total.bold().to_string());
    table.push('\n');
    table
}

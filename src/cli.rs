//! Command-line interface definitions and parsing
//!
//! # Commands
//!
//! - **ls**: List versions, tags or object locks under locations
//! - **tag**: Add or remove tags on object versions
//! - **lock**: Legal holds, governance and compliance retention
//! - **size**: Object count and total size per location
//! - **logs**: Print stored S3 access logs as JSON lines
//! - **config**: Read and write persistent settings
//!
//! Locations are given as `s3://bucket/prefix` arguments. Global flags
//! (`--workers`, `--quiet`, `--verbose`, `--store-dir`) are accepted after
//! any subcommand.

use chrono::{Duration, NaiveDate};
use clap::{ArgAction, Args, Parser, Subcommand};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

use crate::selection::SelectionFlags;

/// One `<number><unit>` part of a duration such as `1h30m`
static DURATION_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(s|m|h|d)").expect("Invalid duration regex"));

/// Parse `90s`, `15m`, `1h30m`, `30d` and the like
///
/// # Errors
/// Returns a message for clap when the text is not a positive duration.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let mut total = Duration::zero();
    let mut consumed = 0;
    for part in DURATION_PART.captures_iter(text) {
        let whole = &part[0];
        let start = part.get(0).map_or(0, |m| m.start());
        if start != consumed {
            break;
        }
        consumed += whole.len();
        let amount: i64 = part[1]
            .parse()
            .map_err(|_| format!("Duration too large: {text}"))?;
        let unit = match &part[2] {
            "s" => Duration::try_seconds(amount),
            "m" => Duration::try_minutes(amount),
            "h" => Duration::try_hours(amount),
            _ => Duration::try_days(amount),
        }
        .ok_or_else(|| format!("Duration too large: {text}"))?;
        total = total
            .checked_add(&unit)
            .ok_or_else(|| format!("Duration too large: {text}"))?;
    }
    if text.is_empty() || consumed != text.len() {
        return Err(format!("Invalid duration '{text}' (expected e.g. 30m, 1h, 7d)"));
    }
    if total <= Duration::zero() {
        return Err(format!("Duration must be positive: {text}"));
    }
    Ok(total)
}

fn parse_date(text: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| format!("Invalid date '{text}' (expected YYYY-MM-DD): {e}"))
}

#[derive(Parser, Debug)]
#[command(name = "s3kit")]
#[command(about = "S3 command line toolkit", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Number of concurrent worker threads
    #[arg(short = 'w', long, global = true, value_name = "N")]
    pub workers: Option<usize>,

    /// Suppress informational output (only print values)
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,

    /// More log output (repeat for trace)
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Root directory of the local bucket mirror
    #[arg(long, global = true, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,
}

/// Which versions of each object a command applies to
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionArgs {
    /// Apply to all versions of object(s)
    #[arg(long)]
    pub all: bool,

    /// Apply to the latest version of object(s) (default)
    #[arg(long)]
    pub latest: bool,

    /// Apply to a specific version
    #[arg(long, value_name = "VERSION")]
    pub version: Option<String>,
}

impl SelectionArgs {
    /// Selection flags with `--latest` on unless another choice was made
    #[must_use]
    pub fn flags(&self) -> SelectionFlags {
        SelectionFlags {
            all: self.all,
            latest: true,
            version: self.version.clone(),
        }
    }
}

/// Output options shared by the `ls` subcommands
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ListArgs {
    /// Object locations (s3://bucket/prefix)
    #[arg(value_name = "LOCATION", required = true)]
    pub locations: Vec<String>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// JSON output
    #[arg(long)]
    pub json: bool,
}

/// Locations plus version selection for commands that change objects
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetArgs {
    /// Object locations (s3://bucket/prefix)
    #[arg(value_name = "LOCATION", required = true)]
    pub locations: Vec<String>,

    #[command(flatten)]
    pub selection: SelectionArgs,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List versions, tags or locks
    Ls {
        #[command(subcommand)]
        command: LsCommands,
    },

    /// Tag S3 object(s)
    Tag {
        #[command(subcommand)]
        command: TagCommands,
    },

    /// Manage object locks
    Lock {
        #[command(subcommand)]
        command: LockCommands,
    },

    /// Calculate size of S3 location(s)
    Size {
        /// Object locations (s3://bucket/prefix)
        #[arg(value_name = "LOCATION", required = true)]
        locations: Vec<String>,

        /// Group sizes by top-level folders
        #[arg(short = 'g', long)]
        group: bool,

        /// Output as JSON array
        #[arg(long)]
        json: bool,

        /// Raw numbers, no human-formatted size
        #[arg(long)]
        raw: bool,
    },

    /// Print S3 object(s), decompressing .gz and .bz2 content
    Cat {
        /// Object locations (s3://bucket/prefix)
        #[arg(value_name = "LOCATION", required = true)]
        locations: Vec<String>,
    },

    /// Print S3 access logs as JSON
    Logs {
        /// Log locations (s3://bucket/prefix)
        #[arg(value_name = "LOCATION", required = true)]
        locations: Vec<String>,

        /// Start date (YYYY-MM-DD), exclusive
        #[arg(short = 's', long, value_parser = parse_date)]
        start: Option<NaiveDate>,

        /// End date (YYYY-MM-DD), exclusive
        #[arg(short = 'e', long, value_parser = parse_date)]
        end: Option<NaiveDate>,

        /// Include every field of the log format
        #[arg(long)]
        full: bool,
    },

    /// Manage configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum LsCommands {
    /// List object versions
    Versions(ListArgs),
    /// List tags per version
    Tags(ListArgs),
    /// List legal holds and retention locks per version
    Locks(ListArgs),
}

#[derive(Subcommand, Debug, Clone)]
pub enum TagCommands {
    /// Add tag(s) to S3 object(s)
    Add {
        #[command(flatten)]
        target: TargetArgs,

        /// Tags as --tags 'tag1=value1,tag2=value2' or multiple --tags options
        #[arg(long, value_name = "TAGS", required = true)]
        tags: Vec<String>,
    },

    /// Remove tag(s) from S3 object(s)
    Rm {
        #[command(flatten)]
        target: TargetArgs,

        /// Tag keys as --tags 'tag1,tag2' or multiple --tags options
        #[arg(long, value_name = "TAGS", required = true)]
        tags: Vec<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum LockCommands {
    /// Add/remove legal hold
    Legal {
        #[command(subcommand)]
        command: SwitchCommands,
    },

    /// Add/remove governance lock
    Govern {
        #[command(subcommand)]
        command: GovernCommands,
    },

    /// Add compliance lock (asks for confirmation per version)
    Compliance {
        #[command(flatten)]
        target: TargetArgs,

        /// Compliance lock duration (1m, 1h etc)
        #[arg(long, value_parser = parse_duration)]
        expire: Duration,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SwitchCommands {
    /// Add legal hold for given object(s)
    Add(TargetArgs),
    /// Remove legal hold for given object(s)
    Rm(TargetArgs),
}

#[derive(Subcommand, Debug, Clone)]
pub enum GovernCommands {
    /// Add governance lock for given object(s)
    Add {
        #[command(flatten)]
        target: TargetArgs,

        /// Governance lock duration (1m, 1h etc)
        #[arg(long, value_parser = parse_duration)]
        expire: Duration,
    },
    /// Release governance lock for given object(s)
    Rm(TargetArgs),
}

/// Configuration management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Set a configuration value
    Set {
        /// Configuration key=value (e.g., workers=8)
        #[arg(value_name = "KEY=VALUE")]
        setting: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key to retrieve (e.g., workers)
        #[arg(value_name = "KEY")]
        key: String,
    },
}

impl Cli {
    /// Parse command line arguments
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

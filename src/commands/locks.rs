//! Object lock changes - legal holds, governance and compliance retention
//!
//! Every operation here writes lock state through an [`ObjectLocks`]
//! capability. `ls locks` reads it back per version.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

use super::versions::{PathListing, VersionEntry, Versioned, list_paths};
use crate::location::RootLocation;
use crate::model::{Item, LegalHoldStatus, Retention, RetentionMode};
use crate::pipeline::{Operation, PipelineError, RunSummary, operation};
use crate::selection::SelectionPolicy;
use crate::store::{Enumerator, ObjectLocks};
use crate::{S3kitError, output};

/// How long a released governance lock lingers before it expires
const RELEASE_GRACE: Duration = Duration::seconds(1);

/// Place or lift a legal hold
pub fn legal_hold_operation<'a, C>(client: &'a C, status: LegalHoldStatus) -> impl Operation + 'a
where
    C: ObjectLocks + ?Sized,
{
    operation(move |container, item| {
        info!("hold {status}: {}@{}", item.url(container), item.version_id);
        client.put_legal_hold(container, &item.key, &item.version_id, status)?;
        Ok(())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernanceAction {
    /// Lock until now plus the duration
    Apply(Duration),
    /// Shorten the lock so it expires almost immediately
    Release,
}

/// Place or release a governance retention lock
///
/// Releasing rewrites the lock to expire one second from now, bypassing
/// governance so the lock may be shortened.
pub fn governance_operation<'a, C>(client: &'a C, action: GovernanceAction) -> impl Operation + 'a
where
    C: ObjectLocks + ?Sized,
{
    operation(move |container, item| {
        let (ttl, bypass, label) = match action {
            GovernanceAction::Apply(duration) => (duration, false, "ON"),
            GovernanceAction::Release => (RELEASE_GRACE, true, "OFF"),
        };
        let retention = Retention {
            mode: RetentionMode::Governance,
            retain_until: Utc::now() + ttl,
        };
        info!("governance {label}: {}@{}", item.url(container), item.version_id);
        client.put_retention(container, &item.key, &item.version_id, &retention, bypass)?;
        Ok(())
    })
}

/// Place a compliance retention lock on the versions `confirm` accepts
///
/// `confirm` is asked once per version with its path, version id and the
/// lock expiry. `Ok(false)` skips the version; an error ends the run.
pub fn compliance_operation<'a, C, F>(
    client: &'a C,
    duration: Duration,
    confirm: F,
) -> impl Operation + 'a
where
    C: ObjectLocks + ?Sized,
    F: Fn(&str, &str, DateTime<Utc>) -> io::Result<bool> + Sync + 'a,
{
    operation(move |container, item| {
        let retain_until = Utc::now() + duration;
        if !confirm(&item.url(container), &item.version_id, retain_until)? {
            info!("compliance skipped: {}@{}", item.url(container), item.version_id);
            return Ok(());
        }
        let retention = Retention {
            mode: RetentionMode::Compliance,
            retain_until,
        };
        info!("compliance ON: {}@{}", item.url(container), item.version_id);
        client.put_retention(container, &item.key, &item.version_id, &retention, false)?;
        Ok(())
    })
}

/// Ask on `output` whether to lock one version and read the answer from `input`
///
/// Only `y` or `Y` accepts. End of input declines.
///
/// # Errors
/// Returns the I/O error of the prompt or the read.
pub fn ask_confirmation<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    path: &str,
    version: &str,
    until: DateTime<Utc>,
) -> io::Result<bool> {
    write!(
        output,
        "Locking {path} version {version} expires {}, proceed? (y/N): ",
        until.format("%Y-%m-%d %H:%M:%S")
    )?;
    output.flush()?;
    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        return Ok(false);
    }
    Ok(matches!(answer.trim_end_matches(['\n', '\r']), "y" | "Y"))
}

/// Lock state of one version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionLocks {
    #[serde(flatten)]
    pub version: VersionEntry,
    pub legal_hold: bool,
    pub governance_until: Option<DateTime<Utc>>,
    pub compliance_until: Option<DateTime<Utc>>,
}

impl Versioned for VersionLocks {
    fn version(&self) -> &VersionEntry {
        &self.version
    }
}

pub type PathLocks = PathListing<VersionLocks>;

fn describe_locks<C: ObjectLocks + ?Sized>(client: &C, container: &str, item: &Item) -> VersionLocks {
    let mut locks = VersionLocks {
        version: VersionEntry::from(item),
        legal_hold: false,
        governance_until: None,
        compliance_until: None,
    };

    match client.legal_hold(container, &item.key, &item.version_id) {
        Ok(status) => locks.legal_hold = status == Some(LegalHoldStatus::On),
        Err(e) => warn!(
            "Can't get legal hold for {} version {}: {e}",
            item.url(container),
            item.version_id
        ),
    }

    match client.retention(container, &item.key, &item.version_id) {
        Ok(Some(retention)) => match retention.mode {
            RetentionMode::Governance => locks.governance_until = Some(retention.retain_until),
            RetentionMode::Compliance => locks.compliance_until = Some(retention.retain_until),
        },
        Ok(None) => {}
        Err(e) => warn!(
            "Can't get retention for {} version {}: {e}",
            item.url(container),
            item.version_id
        ),
    }
    locks
}

/// Lock state of every selected version under `roots`, grouped by path
///
/// # Errors
/// Returns the pipeline error of the run. Failed lock reads are logged and
/// listed as unlocked.
pub fn list_locks<S>(
    store: &S,
    roots: &[RootLocation],
    policy: &SelectionPolicy,
    workers: usize,
) -> Result<Vec<PathLocks>, PipelineError>
where
    S: Enumerator + ObjectLocks + ?Sized,
{
    list_paths(store, roots, policy, workers, |container, item| {
        describe_locks(store, container, item)
    })
}

/// Execute a lock change and report how many versions the run covered
///
/// # Errors
/// Returns the pipeline error of the run.
pub fn execute<S, O>(
    store: &S,
    roots: &[RootLocation],
    policy: &SelectionPolicy,
    workers: usize,
    label: &str,
    lock: O,
    quiet: bool,
) -> Result<RunSummary, S3kitError>
where
    S: Enumerator + ?Sized,
    O: Operation,
{
    let summary = crate::pipeline::run(store, roots, lock, policy, workers)?;
    if !quiet {
        println!("{}", output::run_summary(label, &summary));
    }
    Ok(summary)
}

/// Execute `ls locks`
///
/// # Errors
/// Returns an error if the listing fails or output cannot be written.
pub fn execute_list<S>(
    store: &S,
    roots: &[RootLocation],
    policy: &SelectionPolicy,
    workers: usize,
    json: bool,
    quiet: bool,
) -> Result<(), S3kitError>
where
    S: Enumerator + ObjectLocks + ?Sized,
{
    let listings = list_locks(store, roots, policy, workers)?;
    if json {
        return output::print_json(&listings);
    }
    for listing in &listings {
        println!("{}", output::path_header(&listing.path, quiet));
        for entry in &listing.versions {
            println!("{}", output::locks_line(entry, quiet));
        }
    }
    Ok(())
}

//! Store capabilities
//!
//! The pipeline never talks to a concrete object store. It is handed an
//! explicitly constructed store value and uses it through the traits below,
//! sharing it by reference across all workers of a run. Every trait is
//! `Sync` so one instance can serve concurrent calls.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`]: an in-memory versioned store, used by tests and by
//!   callers that want to drive the pipeline without a backend
//! - [`LocalStore`]: a directory mirror of buckets on local disk

use chrono::{DateTime, Utc};
use std::io::Read;
use std::ops::ControlFlow;

use crate::location::RootLocation;
use crate::model::{Item, LegalHoldStatus, Retention, RetentionMode, Tag};

mod error;
pub mod local;
pub mod memory;

pub use error::{EnumerateError, StoreError};
pub use local::LocalStore;
pub use memory::MemoryStore;

/// Default number of items per listing page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Paginated version listing
pub trait Enumerator: Sync {
    /// List every version under `root`, one page per `visit` call.
    ///
    /// Pages arrive in the store's native order. Returning
    /// `ControlFlow::Break` from `visit` ends the listing early without error.
    ///
    /// # Errors
    /// Returns `EnumerateError` if a page cannot be fetched; no further pages
    /// are delivered after that.
    fn list_versions(
        &self,
        root: &RootLocation,
        visit: &mut dyn FnMut(Vec<Item>) -> ControlFlow<()>,
    ) -> Result<(), EnumerateError>;

    /// Prefixes one `/`-delimited level below `root`, in lexical order.
    ///
    /// # Errors
    /// Returns `EnumerateError` if the listing fails.
    fn common_prefixes(&self, root: &RootLocation) -> Result<Vec<String>, EnumerateError>;
}

/// Reading object content
pub trait ObjectReader: Sync {
    /// Open the current content of `key`.
    ///
    /// # Errors
    /// Returns `StoreError` if the object does not exist or cannot be read.
    fn open(&self, container: &str, key: &str) -> Result<Box<dyn Read + Send>, StoreError>;
}

/// Object version tagging
pub trait ObjectTagging: Sync {
    /// # Errors
    /// Returns `StoreError` if the tags cannot be read.
    fn get_tags(&self, container: &str, key: &str, version: &str) -> Result<Vec<Tag>, StoreError>;

    /// Replace the whole tag set of a version.
    ///
    /// # Errors
    /// Returns `StoreError` if the tags cannot be written.
    fn put_tags(
        &self,
        container: &str,
        key: &str,
        version: &str,
        tags: &[Tag],
    ) -> Result<(), StoreError>;
}

/// Object lock (legal hold and retention) state
///
/// Reads return `Ok(None)` when the version carries no lock configuration;
/// that is not an error.
pub trait ObjectLocks: Sync {
    /// # Errors
    /// Returns `StoreError` if the hold cannot be written.
    fn put_legal_hold(
        &self,
        container: &str,
        key: &str,
        version: &str,
        status: LegalHoldStatus,
    ) -> Result<(), StoreError>;

    /// # Errors
    /// Returns `StoreError` if the hold cannot be read.
    fn legal_hold(
        &self,
        container: &str,
        key: &str,
        version: &str,
    ) -> Result<Option<LegalHoldStatus>, StoreError>;

    /// Place or replace a retention lock. `bypass_governance` allows an
    /// existing governance lock to be shortened.
    ///
    /// # Errors
    /// Returns `StoreError` if the retention cannot be written, including
    /// attempts to shorten a lock that may not be shortened.
    fn put_retention(
        &self,
        container: &str,
        key: &str,
        version: &str,
        retention: &Retention,
        bypass_governance: bool,
    ) -> Result<(), StoreError>;

    /// # Errors
    /// Returns `StoreError` if the retention cannot be read.
    fn retention(
        &self,
        container: &str,
        key: &str,
        version: &str,
    ) -> Result<Option<Retention>, StoreError>;
}

/// Whether `next` may replace the retention lock `existing` at `now`
///
/// Expired locks can always be replaced. A live compliance lock can only be
/// extended; a live governance lock can be shortened only with
/// `bypass_governance`.
pub(crate) fn retention_change_allowed(
    existing: &Retention,
    next: &Retention,
    bypass_governance: bool,
    now: DateTime<Utc>,
) -> bool {
    if existing.retain_until <= now {
        return true;
    }
    let shortens = next.retain_until < existing.retain_until;
    match existing.mode {
        RetentionMode::Compliance => !shortens && next.mode == RetentionMode::Compliance,
        RetentionMode::Governance => !shortens || bypass_governance,
    }
}

/// First `/`-delimited level of `keys` below `prefix`, deduplicated and sorted
pub(crate) fn prefixes_below<'a>(prefix: &str, keys: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut prefixes: Vec<String> = keys
        .filter_map(|key| key.strip_prefix(prefix))
        .filter_map(|rest| rest.find('/').map(|i| format!("{prefix}{}", &rest[..=i])))
        .collect();
    prefixes.sort();
    prefixes.dedup();
    prefixes
}

//! Version listing - `ls versions`
//!
//! Workers describe every selected version and send the description to one
//! aggregator thread, which groups them by `s3://container/key`. The same
//! grouping backs the tag and lock listings.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::aggregate;
use crate::location::RootLocation;
use crate::model::Item;
use crate::pipeline::{BoxError, Pipeline, PipelineError, operation};
use crate::selection::SelectionPolicy;
use crate::store::Enumerator;
use crate::{S3kitError, output};

/// Descriptions buffered between workers and the aggregator
const LISTING_CAPACITY: usize = 100;

/// One version of one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionEntry {
    pub version_id: String,
    pub last_modified: DateTime<Utc>,
    pub latest: bool,
}

impl From<&Item> for VersionEntry {
    fn from(item: &Item) -> Self {
        Self {
            version_id: item.version_id.clone(),
            last_modified: item.last_modified,
            latest: item.is_current,
        }
    }
}

/// Anything listed per version
pub trait Versioned {
    fn version(&self) -> &VersionEntry;
}

impl Versioned for VersionEntry {
    fn version(&self) -> &VersionEntry {
        self
    }
}

/// All listed versions of one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathListing<V> {
    pub path: String,
    pub versions: Vec<V>,
    /// Id of the version flagged current, if it was listed
    pub latest: Option<String>,
}

pub type PathVersions = PathListing<VersionEntry>;

/// Groups version descriptions by path
#[derive(Debug)]
pub struct PathIndex<V> {
    paths: BTreeMap<String, PathListing<V>>,
}

impl<V> Default for PathIndex<V> {
    fn default() -> Self {
        Self {
            paths: BTreeMap::new(),
        }
    }
}

impl<V: Versioned> PathIndex<V> {
    pub fn insert(&mut self, path: String, entry: V) {
        let listing = self
            .paths
            .entry(path)
            .or_insert_with_key(|path| PathListing {
                path: path.clone(),
                versions: Vec::new(),
                latest: None,
            });
        if entry.version().latest {
            listing.latest = Some(entry.version().version_id.clone());
        }
        listing.versions.push(entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Listings sorted by path, versions newest first
    ///
    /// Versions written at the same instant keep the order they arrived in.
    #[must_use]
    pub fn into_listings(self) -> Vec<PathListing<V>> {
        self.paths
            .into_values()
            .map(|mut listing| {
                listing
                    .versions
                    .sort_by_key(|v| Reverse(v.version().last_modified));
                listing
            })
            .collect()
    }
}

/// Run the pipeline and group `describe(container, item)` of every selected
/// version by path
///
/// # Errors
/// Returns the pipeline error of the run.
pub fn list_paths<S, V, F>(
    store: &S,
    roots: &[RootLocation],
    policy: &SelectionPolicy,
    workers: usize,
    describe: F,
) -> Result<Vec<PathListing<V>>, PipelineError>
where
    S: Enumerator + ?Sized,
    V: Versioned + Send,
    F: Fn(&str, &Item) -> V + Sync,
{
    let (_, index) = aggregate::collect(
        LISTING_CAPACITY,
        PathIndex::default(),
        |index: &mut PathIndex<V>, (path, entry): (String, V)| index.insert(path, entry),
        |tx| {
            let forward = operation(|container, item| {
                tx.send((item.url(container), describe(container, item)))
                    .map_err(|_| BoxError::from("listing aggregator stopped"))
            });
            Pipeline::new(store)
                .with_workers(workers)
                .run(roots, policy, forward)
        },
    )?;
    Ok(index.into_listings())
}

/// Every selected version under `roots`, grouped by path
///
/// # Errors
/// Returns the pipeline error of the run.
pub fn list_versions<S: Enumerator + ?Sized>(
    store: &S,
    roots: &[RootLocation],
    policy: &SelectionPolicy,
    workers: usize,
) -> Result<Vec<PathVersions>, PipelineError> {
    list_paths(store, roots, policy, workers, |_, item| VersionEntry::from(item))
}

/// Execute `ls versions`
///
/// # Errors
/// Returns an error if the listing fails or output cannot be written.
pub fn execute<S: Enumerator + ?Sized>(
    store: &S,
    roots: &[RootLocation],
    policy: &SelectionPolicy,
    workers: usize,
    json: bool,
    quiet: bool,
) -> Result<(), S3kitError> {
    let listings = list_versions(store, roots, policy, workers)?;

    if json {
        return output::print_json(&listings);
    }
    if listings.is_empty() {
        if !quiet {
            println!("No versions found.");
        }
        return Ok(());
    }
    for listing in &listings {
        println!("{}", output::path_header(&listing.path, quiet));
        for version in &listing.versions {
            println!("{}", output::version_line(version, quiet));
        }
    }
    Ok(())
}

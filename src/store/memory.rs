//! In-memory versioned store
//!
//! Versions are listed in the order they were added. Adding a new version of
//! a key through [`MemoryStore::with_object`] demotes the previous current
//! version, mirroring how a versioned bucket behaves. [`MemoryStore::with_item`]
//! inserts an item verbatim, which allows listings a real store should never
//! produce (several current versions of one key, for example).

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Cursor, Read};
use std::ops::ControlFlow;
use std::sync::{Mutex, MutexGuard};

use super::{
    DEFAULT_PAGE_SIZE, EnumerateError, Enumerator, ObjectLocks, ObjectReader, ObjectTagging,
    StoreError, prefixes_below, retention_change_allowed,
};
use crate::location::RootLocation;
use crate::model::{Item, LegalHoldStatus, Retention, Tag};

/// (container, key, version)
type VersionKey = (String, String, String);

fn version_key(container: &str, key: &str, version: &str) -> VersionKey {
    (container.to_string(), key.to_string(), version.to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
}

/// Timestamp of the first version added to a store
const EPOCH_SECS: i64 = 1_586_556_186;

#[derive(Debug)]
pub struct MemoryStore {
    containers: BTreeMap<String, Vec<Item>>,
    contents: HashMap<(String, String), Vec<u8>>,
    unreadable: HashSet<(String, String)>,
    failing_listings: HashMap<String, usize>,
    page_size: usize,
    written: i64,
    tags: Mutex<HashMap<VersionKey, Vec<Tag>>>,
    holds: Mutex<HashMap<VersionKey, LegalHoldStatus>>,
    retentions: Mutex<HashMap<VersionKey, Retention>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            containers: BTreeMap::new(),
            contents: HashMap::new(),
            unreadable: HashSet::new(),
            failing_listings: HashMap::new(),
            page_size: DEFAULT_PAGE_SIZE,
            written: 0,
            tags: Mutex::new(HashMap::new()),
            holds: Mutex::new(HashMap::new()),
            retentions: Mutex::new(HashMap::new()),
        }
    }

    /// Set the number of items per listing page (at least one)
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Create an empty container
    #[must_use]
    pub fn with_container(mut self, container: &str) -> Self {
        self.containers.entry(container.to_string()).or_default();
        self
    }

    /// Write a new current version of `key`
    #[must_use]
    pub fn with_object(
        mut self,
        container: &str,
        key: &str,
        version_id: &str,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        let content = content.into();
        let last_modified = DateTime::from_timestamp(EPOCH_SECS, 0).unwrap_or(DateTime::UNIX_EPOCH)
            + Duration::seconds(self.written);
        self.written += 1;

        let items = self.containers.entry(container.to_string()).or_default();
        for previous in items.iter_mut().filter(|i| i.key == key) {
            previous.is_current = false;
        }
        items.push(
            Item::new(key, version_id, true, last_modified).with_size(content.len() as u64),
        );
        self.contents
            .insert((container.to_string(), key.to_string()), content);
        self
    }

    /// Insert an item exactly as given
    #[must_use]
    pub fn with_item(mut self, container: &str, item: Item) -> Self {
        self.containers
            .entry(container.to_string())
            .or_default()
            .push(item);
        self
    }

    /// Make listings of `container` fail after `pages` pages were delivered
    #[must_use]
    pub fn with_listing_failure(mut self, container: &str, pages: usize) -> Self {
        self.failing_listings.insert(container.to_string(), pages);
        self
    }

    /// Make reads of `key` fail
    #[must_use]
    pub fn with_unreadable(mut self, container: &str, key: &str) -> Self {
        self.unreadable
            .insert((container.to_string(), key.to_string()));
        self
    }

    /// Preset the tag set of a version
    #[must_use]
    pub fn with_tags(self, container: &str, key: &str, version: &str, tags: Vec<Tag>) -> Self {
        if let Ok(mut all) = self.tags.lock() {
            all.insert(version_key(container, key, version), tags);
        }
        self
    }

    /// Every version stored for `container`, in listing order
    #[must_use]
    pub fn items(&self, container: &str) -> &[Item] {
        self.containers.get(container).map_or(&[], Vec::as_slice)
    }
}

impl Enumerator for MemoryStore {
    fn list_versions(
        &self,
        root: &RootLocation,
        visit: &mut dyn FnMut(Vec<Item>) -> ControlFlow<()>,
    ) -> Result<(), EnumerateError> {
        let items = self
            .containers
            .get(root.container())
            .ok_or_else(|| EnumerateError::NoSuchContainer(root.container().to_string()))?;
        let fail_after = self.failing_listings.get(root.container()).copied();

        let matching: Vec<&Item> = items
            .iter()
            .filter(|item| item.key.starts_with(root.prefix()))
            .collect();

        for (delivered, page) in matching.chunks(self.page_size).enumerate() {
            if fail_after.is_some_and(|limit| delivered >= limit) {
                return Err(EnumerateError::PageFetch {
                    location: root.to_string(),
                    reason: "injected listing failure".into(),
                });
            }
            let page = page.iter().map(|item| (*item).clone()).collect();
            if visit(page).is_break() {
                return Ok(());
            }
        }

        if fail_after.is_some_and(|limit| matching.len().div_ceil(self.page_size) <= limit) {
            return Err(EnumerateError::PageFetch {
                location: root.to_string(),
                reason: "injected listing failure".into(),
            });
        }
        Ok(())
    }

    fn common_prefixes(&self, root: &RootLocation) -> Result<Vec<String>, EnumerateError> {
        let items = self
            .containers
            .get(root.container())
            .ok_or_else(|| EnumerateError::NoSuchContainer(root.container().to_string()))?;
        Ok(prefixes_below(
            root.prefix(),
            items
                .iter()
                .filter(|item| item.is_current)
                .map(|item| item.key.as_str()),
        ))
    }
}

impl ObjectReader for MemoryStore {
    fn open(&self, container: &str, key: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        let id = (container.to_string(), key.to_string());
        if self.unreadable.contains(&id) {
            return Err(StoreError::Backend(format!(
                "access denied to s3://{container}/{key}"
            )));
        }
        if !self.containers.contains_key(container) {
            return Err(StoreError::NoSuchContainer(container.to_string()));
        }
        let content = self.contents.get(&id).ok_or_else(|| StoreError::NoSuchObject {
            container: container.to_string(),
            key: key.to_string(),
        })?;
        Ok(Box::new(Cursor::new(content.clone())))
    }
}

impl ObjectTagging for MemoryStore {
    fn get_tags(&self, container: &str, key: &str, version: &str) -> Result<Vec<Tag>, StoreError> {
        if self.unreadable.contains(&(container.to_string(), key.to_string())) {
            return Err(StoreError::Backend(format!(
                "access denied to s3://{container}/{key}"
            )));
        }
        Ok(lock(&self.tags)?
            .get(&version_key(container, key, version))
            .cloned()
            .unwrap_or_default())
    }

    fn put_tags(
        &self,
        container: &str,
        key: &str,
        version: &str,
        tags: &[Tag],
    ) -> Result<(), StoreError> {
        lock(&self.tags)?.insert(version_key(container, key, version), tags.to_vec());
        Ok(())
    }
}

impl ObjectLocks for MemoryStore {
    fn put_legal_hold(
        &self,
        container: &str,
        key: &str,
        version: &str,
        status: LegalHoldStatus,
    ) -> Result<(), StoreError> {
        lock(&self.holds)?.insert(version_key(container, key, version), status);
        Ok(())
    }

    fn legal_hold(
        &self,
        container: &str,
        key: &str,
        version: &str,
    ) -> Result<Option<LegalHoldStatus>, StoreError> {
        Ok(lock(&self.holds)?
            .get(&version_key(container, key, version))
            .copied())
    }

    fn put_retention(
        &self,
        container: &str,
        key: &str,
        version: &str,
        retention: &Retention,
        bypass_governance: bool,
    ) -> Result<(), StoreError> {
        let mut retentions = lock(&self.retentions)?;
        let id = version_key(container, key, version);

        if let Some(existing) = retentions.get(&id)
            && !retention_change_allowed(existing, retention, bypass_governance, Utc::now())
        {
            return Err(StoreError::Locked {
                path: format!("s3://{container}/{key}@{version}"),
                until: existing.retain_until,
            });
        }

        retentions.insert(id, *retention);
        Ok(())
    }

    fn retention(
        &self,
        container: &str,
        key: &str,
        version: &str,
    ) -> Result<Option<Retention>, StoreError> {
        Ok(lock(&self.retentions)?
            .get(&version_key(container, key, version))
            .copied())
    }
}

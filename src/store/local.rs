//! Local directory mirror of buckets
//!
//! `<root>/<bucket>/<key>` holds the content of `s3://bucket/key`, as left
//! behind by a bucket sync. Local files carry no version history, so every
//! file is listed as a single current version with the `null` version id,
//! the same id an unversioned bucket reports.
//!
//! Tags and object lock state live in one small JSON document per version
//! under [`METADATA_DIR`], at `<bucket>/<key>@<version>.json`. Documents are
//! replaced by writing a temporary file next to them and renaming it over
//! the old one, so a reader sees either the old or the new state. Updates
//! are serialized within the process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use walkdir::WalkDir;

use super::{
    DEFAULT_PAGE_SIZE, EnumerateError, Enumerator, ObjectLocks, ObjectReader, ObjectTagging,
    StoreError, prefixes_below, retention_change_allowed,
};
use crate::location::{RootLocation, is_valid_container};
use crate::model::{Item, LegalHoldStatus, NULL_VERSION, Retention, Tag};

/// Directory under the store root holding per-version metadata documents
pub const METADATA_DIR: &str = ".s3kit-meta";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct VersionMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<Tag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hold: Option<LegalHoldStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retention: Option<Retention>,
}

impl VersionMetadata {
    fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.hold.is_none() && self.retention.is_none()
    }
}

fn read_metadata(path: &Path) -> Result<VersionMetadata, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(VersionMetadata::default()),
        Err(e) => Err(e.into()),
    }
}

/// Replace the document at `path`; an empty document removes it
fn write_metadata(path: &Path, metadata: &VersionMetadata) -> Result<(), StoreError> {
    if metadata.is_empty() {
        return match fs::remove_file(path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        };
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(format!("json.{}.tmp", std::process::id()));
    let mut file = File::create(&tmp)?;
    file.write_all(&serde_json::to_vec_pretty(metadata)?)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)?;
    Ok(())
}

#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    page_size: usize,
    metadata: Mutex<()>,
}

impl LocalStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
            metadata: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_dir(&self, container: &str) -> PathBuf {
        self.root.join(container)
    }

    /// Directory of an existing bucket; names that could leave the root never match
    fn existing_container(&self, container: &str) -> Option<PathBuf> {
        let dir = self.container_dir(container);
        (is_valid_container(container) && dir.is_dir()).then_some(dir)
    }

    fn metadata_path(&self, container: &str, key: &str, version: &str) -> PathBuf {
        self.root
            .join(METADATA_DIR)
            .join(container)
            .join(format!("{key}@{version}.json"))
    }

    /// All keys of a container in lexical order
    fn keys(&self, root: &RootLocation) -> Result<Vec<String>, EnumerateError> {
        let Some(dir) = self.existing_container(root.container()) else {
            return Err(EnumerateError::NoSuchContainer(root.container().to_string()));
        };

        let mut keys = Vec::new();
        for entry in WalkDir::new(&dir).follow_links(true) {
            let entry = entry.map_err(|e| EnumerateError::PageFetch {
                location: root.to_string(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&dir) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(root.prefix()) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn item(&self, container: &str, key: &str) -> Result<Item, std::io::Error> {
        let metadata = std::fs::metadata(self.container_dir(container).join(key))?;
        let last_modified: DateTime<Utc> = metadata.modified()?.into();
        Ok(Item::new(key, NULL_VERSION, true, last_modified).with_size(metadata.len()))
    }

    /// Fail unless `key` exists with `version`
    fn ensure_version(&self, container: &str, key: &str, version: &str) -> Result<(), StoreError> {
        let Some(dir) = self.existing_container(container) else {
            return Err(StoreError::NoSuchContainer(container.to_string()));
        };
        if version != NULL_VERSION || !dir.join(key).is_file() {
            return Err(StoreError::NoSuchObject {
                container: container.to_string(),
                key: format!("{key}@{version}"),
            });
        }
        Ok(())
    }

    fn read_version(
        &self,
        container: &str,
        key: &str,
        version: &str,
    ) -> Result<VersionMetadata, StoreError> {
        self.ensure_version(container, key, version)?;
        read_metadata(&self.metadata_path(container, key, version))
    }

    /// Read-modify-write of one version's document
    fn update_version(
        &self,
        container: &str,
        key: &str,
        version: &str,
        f: impl FnOnce(&mut VersionMetadata) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        self.ensure_version(container, key, version)?;
        let path = self.metadata_path(container, key, version);
        let _guard = self
            .metadata
            .lock()
            .map_err(|_| StoreError::Backend("metadata lock poisoned".into()))?;
        let mut metadata = read_metadata(&path)?;
        f(&mut metadata)?;
        write_metadata(&path, &metadata)
    }
}

impl Enumerator for LocalStore {
    fn list_versions(
        &self,
        root: &RootLocation,
        visit: &mut dyn FnMut(Vec<Item>) -> ControlFlow<()>,
    ) -> Result<(), EnumerateError> {
        let keys = self.keys(root)?;
        for page in keys.chunks(self.page_size) {
            let items = page
                .iter()
                .map(|key| self.item(root.container(), key))
                .collect::<Result<Vec<_>, _>>()?;
            if visit(items).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn common_prefixes(&self, root: &RootLocation) -> Result<Vec<String>, EnumerateError> {
        let keys = self.keys(root)?;
        Ok(prefixes_below(root.prefix(), keys.iter().map(String::as_str)))
    }
}

impl ObjectReader for LocalStore {
    fn open(&self, container: &str, key: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        let Some(dir) = self.existing_container(container) else {
            return Err(StoreError::NoSuchContainer(container.to_string()));
        };
        match File::open(dir.join(key)) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NoSuchObject {
                container: container.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

impl ObjectTagging for LocalStore {
    fn get_tags(&self, container: &str, key: &str, version: &str) -> Result<Vec<Tag>, StoreError> {
        Ok(self.read_version(container, key, version)?.tags)
    }

    fn put_tags(
        &self,
        container: &str,
        key: &str,
        version: &str,
        tags: &[Tag],
    ) -> Result<(), StoreError> {
        self.update_version(container, key, version, |m| {
            m.tags = tags.to_vec();
            Ok(())
        })
    }
}

impl ObjectLocks for LocalStore {
    fn put_legal_hold(
        &self,
        container: &str,
        key: &str,
        version: &str,
        status: LegalHoldStatus,
    ) -> Result<(), StoreError> {
        self.update_version(container, key, version, |m| {
            m.hold = Some(status);
            Ok(())
        })
    }

    fn legal_hold(
        &self,
        container: &str,
        key: &str,
        version: &str,
    ) -> Result<Option<LegalHoldStatus>, StoreError> {
        Ok(self.read_version(container, key, version)?.hold)
    }

    fn put_retention(
        &self,
        container: &str,
        key: &str,
        version: &str,
        retention: &Retention,
        bypass_governance: bool,
    ) -> Result<(), StoreError> {
        self.update_version(container, key, version, |m| {
            if let Some(existing) = &m.retention
                && !retention_change_allowed(existing, retention, bypass_governance, Utc::now())
            {
                return Err(StoreError::Locked {
                    path: format!("s3://{container}/{key}@{version}"),
                    until: existing.retain_until,
                });
            }
            m.retention = Some(*retention);
            Ok(())
        })
    }

    fn retention(
        &self,
        container: &str,
        key: &str,
        version: &str,
    ) -> Result<Option<Retention>, StoreError> {
        Ok(self.read_version(container, key, version)?.retention)
    }
}

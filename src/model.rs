//! Shared data types for versioned objects
//!
//! These are the values that flow between the store, the batch pipeline and
//! the per-command aggregators. All of them are plain data: once a store has
//! produced an [`Item`] nothing in the crate mutates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version id reported for objects stored without versioning
pub const NULL_VERSION: &str = "null";

/// One (key, version) pair reported by a store listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Object key within its container
    pub key: String,
    /// Version identifier, unique within the key
    pub version_id: String,
    /// Whether this is the current version of the key
    pub is_current: bool,
    /// Time the version was written
    pub last_modified: DateTime<Utc>,
    /// Size of the version in bytes
    #[serde(default)]
    pub size: u64,
}

impl Item {
    /// Create a new item with a size of zero
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        version_id: impl Into<String>,
        is_current: bool,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            version_id: version_id.into(),
            is_current,
            last_modified,
            size: 0,
        }
    }

    #[must_use]
    pub const fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Full `s3://container/key` path of this item
    #[must_use]
    pub fn url(&self, container: &str) -> String {
        format!("s3://{container}/{}", self.key)
    }
}

/// One listing page for one container, the unit of work handed to a worker
#[derive(Debug, Clone)]
pub struct Batch {
    pub container: String,
    pub items: Vec<Item>,
}

impl Batch {
    #[must_use]
    pub fn new(container: impl Into<String>, items: Vec<Item>) -> Self {
        Self {
            container: container.into(),
            items,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Object tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Legal hold state of an object version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LegalHoldStatus {
    On,
    Off,
}

impl fmt::Display for LegalHoldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "ON"),
            Self::Off => write!(f, "OFF"),
        }
    }
}

/// Object lock retention mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RetentionMode {
    /// Can be shortened or removed by callers allowed to bypass governance
    Governance,
    /// Cannot be shortened or removed until it expires
    Compliance,
}

/// Retention lock placed on an object version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retention {
    pub mode: RetentionMode,
    pub retain_until: DateTime<Utc>,
}

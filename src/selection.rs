//! Version selection policy
//!
//! Decides which versions under a root location an operation runs on. The
//! policy is resolved once, before any listing starts, and wraps the
//! caller's operation into a filtered one with [`SelectionPolicy::build`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::Item;
use crate::pipeline::{BoxError, Operation};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Must specify either --all or --latest or --version <version>")]
    NoneSelected,

    #[error("--all and --version <version> are mutually exclusive")]
    Conflicting,
}

/// Which versions of each key an operation applies to
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionPolicy {
    /// Every version
    All,
    /// Only versions flagged current
    #[default]
    CurrentOnly,
    /// Only versions with this exact id
    ExactVersion(String),
}

impl SelectionPolicy {
    /// Whether the policy selects `item`
    ///
    /// `CurrentOnly` selects every item flagged current; if a listing ever
    /// reports several current versions of one key, all of them match.
    #[must_use]
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Self::All => true,
            Self::CurrentOnly => item.is_current,
            Self::ExactVersion(id) => item.version_id == *id,
        }
    }

    /// Wrap `operation` so it only runs on selected items
    #[must_use]
    pub fn build<O: Operation>(self, operation: O) -> Selected<O> {
        Selected {
            policy: self,
            inner: operation,
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all versions"),
            Self::CurrentOnly => write!(f, "latest version"),
            Self::ExactVersion(id) => write!(f, "version {id}"),
        }
    }
}

/// An operation filtered through a [`SelectionPolicy`]
#[derive(Debug, Clone)]
pub struct Selected<O> {
    policy: SelectionPolicy,
    inner: O,
}

impl<O> Selected<O> {
    #[must_use]
    pub const fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }
}

impl<O: Operation> Operation for Selected<O> {
    fn apply(&self, container: &str, item: &Item) -> Result<(), BoxError> {
        if self.policy.matches(item) {
            self.inner.apply(container, item)
        } else {
            Ok(())
        }
    }
}

/// Selection flags as they come from the command line or a config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionFlags {
    /// Apply to all versions
    #[serde(default)]
    pub all: bool,
    /// Apply to the latest version
    #[serde(default = "default_latest")]
    pub latest: bool,
    /// Apply to one specific version
    #[serde(default)]
    pub version: Option<String>,
}

const fn default_latest() -> bool {
    true
}

impl Default for SelectionFlags {
    fn default() -> Self {
        Self {
            all: false,
            latest: default_latest(),
            version: None,
        }
    }
}

impl SelectionFlags {
    /// Resolve the flags into exactly one policy
    ///
    /// `--all` and `--version` each override `--latest`, which is on by
    /// default. An empty version string counts as unset.
    ///
    /// # Errors
    /// Returns `SelectionError::Conflicting` when both `all` and `version`
    /// are set, and `SelectionError::NoneSelected` when nothing is set.
    pub fn resolve(&self) -> Result<SelectionPolicy, SelectionError> {
        let version = self.version.as_deref().filter(|v| !v.is_empty());
        match (self.all, version) {
            (true, Some(_)) => Err(SelectionError::Conflicting),
            (true, None) => Ok(SelectionPolicy::All),
            (false, Some(id)) => Ok(SelectionPolicy::ExactVersion(id.to_string())),
            (false, None) if self.latest => Ok(SelectionPolicy::CurrentOnly),
            (false, None) => Err(SelectionError::NoneSelected),
        }
    }
}

//! Root locations (`s3://container/prefix`)

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Matches `scheme://host/path`, with the path optional
static LOCATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9+.-]*)://([^/]*)(?:/(.*))?$").expect("Invalid location regex")
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocationError {
    /// Not of the form `s3://bucket/prefix`
    #[error("Invalid location '{0}': expected s3://bucket/prefix")]
    InvalidFormat(String),

    /// Well formed but the bucket part is empty
    #[error("No bucket defined for {0}")]
    MissingContainer(String),

    /// A bucket name that could name a path outside a store root
    #[error("Invalid bucket name '{0}'")]
    InvalidContainer(String),
}

/// Whether `name` can be a bucket: non-empty, no path separators and not
/// starting with a dot (which also excludes `.` and `..`)
#[must_use]
pub fn is_valid_container(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\'])
}

/// A (container, prefix) pair that enumeration starts from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RootLocation {
    container: String,
    prefix: String,
}

impl RootLocation {
    #[must_use]
    pub fn new(container: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn container(&self) -> &str {
        &self.container
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Parse every location, failing on the first malformed one
    ///
    /// # Errors
    /// Returns the `LocationError` of the first location that does not parse.
    pub fn parse_all<S: AsRef<str>>(urls: &[S]) -> Result<Vec<Self>, LocationError> {
        urls.iter().map(|url| url.as_ref().parse()).collect()
    }
}

impl FromStr for RootLocation {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = LOCATION_REGEX
            .captures(s.trim())
            .ok_or_else(|| LocationError::InvalidFormat(s.to_string()))?;

        if !caps[1].eq_ignore_ascii_case("s3") {
            return Err(LocationError::InvalidFormat(s.to_string()));
        }

        let container = &caps[2];
        if container.is_empty() {
            return Err(LocationError::MissingContainer(s.to_string()));
        }
        if !is_valid_container(container) {
            return Err(LocationError::InvalidContainer(container.to_string()));
        }

        let prefix = caps.get(3).map_or("", |m| m.as_str());
        Ok(Self::new(container, prefix))
    }
}

impl fmt::Display for RootLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.container, self.prefix)
    }
}

//! Testing utilities for s3kit
//!
//! Provides [`TestMirror`], a temporary bucket mirror directory for
//! exercising [`LocalStore`](crate::store::LocalStore) end to end.
//!
//! Only available when compiled with `cfg(test)`.

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use crate::store::LocalStore;

/// Temporary `<root>/<bucket>/<key>` tree, removed on drop
///
/// # Examples
/// ```ignore
/// let mirror = TestMirror::new().with_file("bucket", "logs/a.log", "line\n");
/// let store = mirror.store();
/// ```
pub struct TestMirror {
    dir: TempDir,
}

impl TestMirror {
    /// # Panics
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create mirror directory"),
        }
    }

    /// Write `contents` to `s3://bucket/key`, creating parent directories
    ///
    /// # Panics
    /// Panics if the file cannot be written.
    #[must_use]
    pub fn with_file(self, bucket: &str, key: &str, contents: impl AsRef<[u8]>) -> Self {
        let path = self.dir.path().join(bucket).join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create mirror directory");
        }
        fs::write(&path, contents).expect("Failed to write mirror file");
        self
    }

    /// Create an empty bucket
    ///
    /// # Panics
    /// Panics if the directory cannot be created.
    #[must_use]
    pub fn with_bucket(self, bucket: &str) -> Self {
        fs::create_dir_all(self.dir.path().join(bucket)).expect("Failed to create bucket");
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn store(&self) -> LocalStore {
        LocalStore::new(self.dir.path())
    }
}

impl Default for TestMirror {
    fn default() -> Self {
        Self::new()
    }
}

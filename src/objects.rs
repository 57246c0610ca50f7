//! Object storage for uploaded files (profile photos).

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::lock;

pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `key` (replacing any previous object) and return a
    /// URL for it.
    fn upload(&self, key: &str, bytes: &[u8]) -> Result<String>;
}

/// Objects stored as files below a root directory; URLs are `file://` URLs.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.trim().is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            return Err(Error::InvalidArgument(format!("invalid object key '{key}'")));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for LocalObjectStore {
    fn upload(&self, key: &str, bytes: &[u8]) -> Result<String> {
        let path = self.object_path(key)?;
        lock::write_atomic(&path, bytes)?;
        let absolute = path.canonicalize().unwrap_or(path);
        tracing::debug!(key, size = bytes.len(), "object uploaded");
        Ok(format!("file://{}", absolute.display()))
    }
}

/// Object key for a user's profile photo.
pub fn profile_photo_key(uid: &str, file_name: &str) -> String {
    format!("profile_photos/{uid}/{file_name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn upload_writes_and_replaces() {
        let temp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp.path());
        let key = profile_photo_key("u1", "me.png");

        let url = store.upload(&key, b"first").unwrap();
        store.upload(&key, b"second").unwrap();

        assert!(url.starts_with("file://"));
        assert!(url.ends_with("profile_photos/u1/me.png"));
        let stored = std::fs::read(temp.path().join("profile_photos/u1/me.png")).unwrap();
        assert_eq!(stored, b"second");
    }

    #[test]
    fn keys_cannot_escape_root() {
        let temp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp.path());
        for key in ["../outside", "/etc/passwd", "", "./a", "a/../../b"] {
            assert!(store.upload(key, b"x").is_err(), "{key}");
        }
    }
}

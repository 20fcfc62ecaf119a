//! Content-addressed message storage.
//!
//! Stored objects are keyed by the SHA-256 digest of their raw bytes and
//! written at most once: storing the same content twice is a no-op, and two
//! workers racing on a new digest both succeed without error.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{MailsieveError, Result};

/// File extension used for stored message objects.
const OBJECT_EXT: &str = "eml";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Content-addressed file store for raw message bytes.
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Open (creating if necessary) a content store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| MailsieveError::artifact(&root, e))?;
        Ok(Self { root })
    }

    /// Compute the hex-encoded SHA-256 digest of raw message bytes.
    #[must_use]
    pub fn digest(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }

    /// Store raw message bytes, returning their digest.
    ///
    /// Writes the object only if no object with the same digest exists.
    /// The write goes through a temp file plus rename, so a concurrent
    /// store of identical content cannot leave a torn object behind.
    pub fn store(&self, bytes: &[u8]) -> Result<String> {
        let digest = Self::digest(bytes);
        let path = self.path_for(&digest);

        if path.exists() {
            debug!(digest = %digest, "Object already stored, skipping write");
            return Ok(digest);
        }

        let tmp = self.root.join(format!(
            ".tmp-{}-{}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, bytes).map_err(|e| MailsieveError::artifact(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| MailsieveError::artifact(&path, e))?;

        debug!(digest = %digest, size = bytes.len(), "Stored new object");
        Ok(digest)
    }

    /// Read back the raw bytes for a digest.
    pub fn read(&self, digest: &str) -> Result<Vec<u8>> {
        let path = self.path_for(digest);
        if !path.exists() {
            return Err(MailsieveError::ObjectNotFound(digest.to_string()));
        }
        fs::read(&path).map_err(|e| MailsieveError::artifact(&path, e))
    }

    /// Whether an object with this digest is already stored.
    #[must_use]
    pub fn contains(&self, digest: &str) -> bool {
        self.path_for(digest).exists()
    }

    /// Path of the stored object for a digest.
    #[must_use]
    pub fn path_for(&self, digest: &str) -> PathBuf {
        self.root.join(format!("{digest}.{OBJECT_EXT}"))
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enumerate the digests of every stored object.
    ///
    /// Enumeration order carries no meaning; temp files and foreign files
    /// are skipped.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut digests = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|e| MailsieveError::artifact(&self.root, e))?
        {
            let entry = entry.map_err(|e| MailsieveError::artifact(&self.root, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(OBJECT_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                digests.push(stem.to_string());
            }
        }
        Ok(digests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContentStore::open(dir.path()).expect("open store");

        let first = store.store(b"Subject: hi\n\nbody\n").expect("store");
        let second = store.store(b"Subject: hi\n\nbody\n").expect("restore");
        assert_eq!(first, second);

        let objects = store.list().expect("list");
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0], first);
    }

    #[test]
    fn test_distinct_content_distinct_objects() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContentStore::open(dir.path()).expect("open store");

        let a = store.store(b"message one").expect("store a");
        let b = store.store(b"message two").expect("store b");
        assert_ne!(a, b);
        assert_eq!(store.list().expect("list").len(), 2);
    }

    #[test]
    fn test_read_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContentStore::open(dir.path()).expect("open store");

        let digest = store.store(b"raw bytes").expect("store");
        assert!(store.contains(&digest));
        assert_eq!(store.read(&digest).expect("read"), b"raw bytes");
    }

    #[test]
    fn test_read_missing_digest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContentStore::open(dir.path()).expect("open store");

        assert!(!store.contains("deadbeef"));
        assert!(matches!(
            store.read("deadbeef"),
            Err(MailsieveError::ObjectNotFound(_))
        ));
    }
}

//! Intake stage: dirty directory to content store.
//!
//! Converts incoming single-message `.eml` files and multi-message `.mbox`
//! archives into individually stored, deduplicated objects. Originals are
//! removed only after their content has been durably captured; a corrupt or
//! unreadable artifact is logged and skipped without affecting siblings.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{MailsieveError, Result};
use crate::mbox::split_mbox;
use crate::pool::{PoolStats, WorkerPool};
use crate::store::ContentStore;

/// Recognized input artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArtifactKind {
    Eml,
    Mbox,
}

impl ArtifactKind {
    fn of(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("eml") => Some(Self::Eml),
            Some(ext) if ext.eq_ignore_ascii_case("mbox") => Some(Self::Mbox),
            _ => None,
        }
    }
}

/// Ingest every recognized artifact in `dirty_dir` on a pool of `workers`.
///
/// Returns per-artifact pool statistics; per-artifact failures are counted
/// there, not propagated. Only being unable to enumerate the directory or
/// start the pool is fatal.
pub fn ingest_directory(
    store: &Arc<ContentStore>,
    dirty_dir: impl AsRef<Path>,
    workers: usize,
) -> Result<PoolStats> {
    let dirty_dir = dirty_dir.as_ref();
    info!(dir = %dirty_dir.display(), workers, "Starting intake");

    let pool = {
        let store = Arc::clone(store);
        WorkerPool::start(workers, move |path: &PathBuf| {
            ingest_artifact(&store, path)
        })?
    };

    for entry in
        fs::read_dir(dirty_dir).map_err(|e| MailsieveError::artifact(dirty_dir, e))?
    {
        let entry = entry.map_err(|e| MailsieveError::artifact(dirty_dir, e))?;
        let path = entry.path();
        if ArtifactKind::of(&path).is_some() {
            pool.submit(path)?;
        } else {
            debug!(path = %path.display(), "Skipping unrecognized artifact");
        }
    }

    let stats = pool.join();
    info!(
        processed = stats.processed,
        failed = stats.failed,
        "Intake finished"
    );
    Ok(stats)
}

/// Ingest one artifact into the content store, removing it on success.
pub fn ingest_artifact(store: &ContentStore, path: &Path) -> Result<()> {
    match ArtifactKind::of(path) {
        Some(ArtifactKind::Eml) => ingest_eml(store, path),
        Some(ArtifactKind::Mbox) => ingest_mbox(store, path),
        None => Err(MailsieveError::Parse(format!(
            "unrecognized artifact: {}",
            path.display()
        ))),
    }
}

/// Store a single-message file, then remove the original.
fn ingest_eml(store: &ContentStore, path: &Path) -> Result<()> {
    let bytes = fs::read(path).map_err(|e| MailsieveError::artifact(path, e))?;
    let digest = store.store(&bytes)?;
    // The original goes only after the store durably succeeded
    fs::remove_file(path).map_err(|e| MailsieveError::artifact(path, e))?;
    debug!(path = %path.display(), digest = %digest, "Ingested message file");
    Ok(())
}

/// Split an archive into stored messages, then remove the archive.
///
/// The archive is kept when any contained message fails to store, so the
/// whole artifact can be replayed.
fn ingest_mbox(store: &ContentStore, path: &Path) -> Result<()> {
    let count = split_mbox(path, |raw| {
        store.store(raw)?;
        Ok(())
    })?;
    fs::remove_file(path).map_err(|e| MailsieveError::artifact(path, e))?;
    debug!(path = %path.display(), messages = count, "Ingested archive");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn eml(subject: &str, body: &str) -> Vec<u8> {
        format!("From: a@example.com\r\nSubject: {subject}\r\n\r\n{body}\r\n").into_bytes()
    }

    #[test]
    fn test_eml_ingest_removes_original() {
        let dirty = tempfile::tempdir().expect("tempdir");
        let storage = tempfile::tempdir().expect("tempdir");
        let store = ContentStore::open(storage.path()).expect("open store");

        let path = dirty.path().join("one.eml");
        fs::write(&path, eml("hello", "body")).expect("write");

        ingest_artifact(&store, &path).expect("ingest");
        assert!(!path.exists());
        assert_eq!(store.list().expect("list").len(), 1);
    }

    #[test]
    fn test_mbox_ingest_splits_and_removes() {
        let dirty = tempfile::tempdir().expect("tempdir");
        let storage = tempfile::tempdir().expect("tempdir");
        let store = ContentStore::open(storage.path()).expect("open store");

        let path = dirty.path().join("batch.mbox");
        let mut f = fs::File::create(&path).expect("create");
        for i in 0..3 {
            writeln!(f, "From sender@example.com Thu Jan  1 00:00:0{i} 2024").expect("write");
            writeln!(f, "Subject: msg {i}\n\nbody {i}\n").expect("write");
        }
        drop(f);

        ingest_artifact(&store, &path).expect("ingest");
        assert!(!path.exists());
        assert_eq!(store.list().expect("list").len(), 3);
    }

    #[test]
    fn test_duplicate_content_stored_once() {
        let dirty = tempfile::tempdir().expect("tempdir");
        let storage = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(ContentStore::open(storage.path()).expect("open store"));

        // Two files, identical bytes
        for name in ["a.eml", "b.eml"] {
            fs::write(dirty.path().join(name), eml("same", "same")).expect("write");
        }

        let stats = ingest_directory(&store, dirty.path(), 2).expect("ingest dir");
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.failed, 0);
        assert_eq!(store.list().expect("list").len(), 1);
    }

    #[test]
    fn test_unreadable_artifact_is_isolated() {
        let dirty = tempfile::tempdir().expect("tempdir");
        let storage = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(ContentStore::open(storage.path()).expect("open store"));

        fs::write(dirty.path().join("good.eml"), eml("ok", "fine")).expect("write");
        // A directory with a message extension reads as an I/O error
        fs::create_dir(dirty.path().join("bad.eml")).expect("mkdir");

        let stats = ingest_directory(&store, dirty.path(), 2).expect("ingest dir");
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(store.list().expect("list").len(), 1);
    }
}

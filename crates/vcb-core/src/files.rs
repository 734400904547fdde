//! Temporary storage for uploads collected across several messages.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{errors::Error, Result};

/// Opaque reference to a stored upload.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileHandle(pub String);

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn save(&self, bytes: Vec<u8>) -> Result<FileHandle>;
    async fn read(&self, handle: &FileHandle) -> Result<Vec<u8>>;
    async fn delete(&self, handle: &FileHandle) -> Result<()>;
}

/// Stores uploads as files under a bot-owned temp directory.
pub struct TempDirFileStore {
    dir: PathBuf,
    counter: AtomicU64,
}

impl TempDirFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(1),
        }
    }

    fn path_for(&self, handle: &FileHandle) -> Result<PathBuf> {
        let ok = !handle.0.is_empty()
            && handle
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !handle.0.starts_with('.');
        if !ok {
            return Err(Error::Storage(format!("invalid file handle: {}", handle.0)));
        }
        Ok(self.dir.join(&handle.0))
    }
}

#[async_trait]
impl FileStore for TempDirFileStore {
    async fn save(&self, bytes: Vec<u8>) -> Result<FileHandle> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Storage(format!("create temp dir: {e}")))?;

        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let handle = FileHandle(format!("upload_{ts}_{n}.bin"));

        let path = self.path_for(&handle)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::Storage(format!("write upload: {e}")))?;
        debug!(path = %path.display(), "Stored upload");
        Ok(handle)
    }

    async fn read(&self, handle: &FileHandle) -> Result<Vec<u8>> {
        let path = self.path_for(handle)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| Error::Storage(format!("read upload {}: {e}", handle.0)))
    }

    async fn delete(&self, handle: &FileHandle) -> Result<()> {
        let path = self.path_for(handle)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("delete upload {}: {e}", handle.0))),
        }
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryFileStore {
    files: Mutex<HashMap<FileHandle, Vec<u8>>>,
    counter: AtomicU64,
}

impl MemoryFileStore {
    pub async fn len(&self) -> usize {
        self.files.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.lock().await.is_empty()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn save(&self, bytes: Vec<u8>) -> Result<FileHandle> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let handle = FileHandle(format!("mem-{n}"));
        self.files.lock().await.insert(handle.clone(), bytes);
        Ok(handle)
    }

    async fn read(&self, handle: &FileHandle) -> Result<Vec<u8>> {
        self.files
            .lock()
            .await
            .get(handle)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("unknown file handle: {}", handle.0)))
    }

    async fn delete(&self, handle: &FileHandle) -> Result<()> {
        self.files.lock().await.remove(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        PathBuf::from(format!("/tmp/{prefix}-{}-{ts}", std::process::id()))
    }

    #[tokio::test]
    async fn temp_dir_store_round_trip_and_delete() {
        let dir = tmp("vcb-files");
        let store = TempDirFileStore::new(&dir);

        let h = store.save(b"BEGIN:VCARD".to_vec()).await.unwrap();
        assert_eq!(store.read(&h).await.unwrap(), b"BEGIN:VCARD");

        store.delete(&h).await.unwrap();
        assert!(matches!(store.read(&h).await, Err(Error::Storage(_))));
        // Deleting twice is fine.
        store.delete(&h).await.unwrap();

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn temp_dir_store_rejects_traversal_handles() {
        let store = TempDirFileStore::new(tmp("vcb-files"));
        let bad = FileHandle("../etc/passwd".to_string());
        assert!(matches!(store.read(&bad).await, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn memory_store_tracks_handles() {
        let store = MemoryFileStore::default();
        let a = store.save(vec![1]).await.unwrap();
        let b = store.save(vec![2]).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);
        store.delete(&a).await.unwrap();
        assert_eq!(store.read(&b).await.unwrap(), vec![2]);
        assert_eq!(store.len().await, 1);
    }
}

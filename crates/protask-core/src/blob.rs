use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::StoreResult;

pub const BLOB_FILE_NAME: &str = "protask_db.json";

/// A single-key durable store holding the whole serialized state.
///
/// Writes replace the blob in one step; readers never observe a partial write.
pub trait BlobStore: Send + Sync + 'static {
    /// Current contents, or `None` when nothing has been written yet.
    fn read(&self) -> StoreResult<Option<String>>;

    fn write(&self, contents: &str) -> StoreResult<()>;

    fn describe(&self) -> String;
}

#[derive(Debug)]
pub struct FileBlobStore {
    pub data_dir: PathBuf,
    pub blob_path: PathBuf,
}

impl FileBlobStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let blob_path = data_dir.join(BLOB_FILE_NAME);

        info!(
            data_dir = %data_dir.display(),
            blob = %blob_path.display(),
            "opened blob store"
        );

        Ok(Self {
            data_dir,
            blob_path,
        })
    }
}

impl BlobStore for FileBlobStore {
    #[tracing::instrument(skip(self))]
    fn read(&self) -> StoreResult<Option<String>> {
        match fs::read_to_string(&self.blob_path) {
            Ok(raw) if raw.trim().is_empty() => Ok(None),
            Ok(raw) => {
                debug!(file = %self.blob_path.display(), bytes = raw.len(), "read blob");
                Ok(Some(raw))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(skip(self, contents))]
    fn write(&self, contents: &str) -> StoreResult<()> {
        debug!(file = %self.blob_path.display(), bytes = contents.len(), "writing blob atomically");

        let dir = self.blob_path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(contents.as_bytes())?;
        temp.flush()?;
        temp.persist(&self.blob_path).map_err(|err| err.error)?;

        Ok(())
    }

    fn describe(&self) -> String {
        self.blob_path.display().to_string()
    }
}

/// Shared in-process blob. Clones see the same contents, which is how tests model
/// two contexts writing to one store.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<Option<String>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(contents.into()))),
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.inner.lock().clone()
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self) -> StoreResult<Option<String>> {
        Ok(self.inner.lock().clone())
    }

    fn write(&self, contents: &str) -> StoreResult<()> {
        *self.inner.lock() = Some(contents.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn file_blob_roundtrip_replaces_contents() {
        let temp = tempdir().expect("tempdir");
        let store = FileBlobStore::open(temp.path()).expect("open blob store");

        assert!(store.read().expect("read empty").is_none());

        store.write(r#"{"a":1}"#).expect("first write");
        store.write(r#"{"b":2}"#).expect("second write");
        assert_eq!(store.read().expect("read").as_deref(), Some(r#"{"b":2}"#));
        assert!(temp.path().join(BLOB_FILE_NAME).exists());
    }

    #[test]
    fn memory_blob_clones_share_contents() {
        let a = MemoryBlobStore::new();
        let b = a.clone();
        a.write("x").expect("write");
        assert_eq!(b.read().expect("read").as_deref(), Some("x"));
    }
}

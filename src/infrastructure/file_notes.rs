// JSON file-backed note store
use anyhow::Context;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::application::error::LabError;
use crate::application::notes::{InMemoryNoteStore, NoteStore, validate_key};

/// Keeps notes in memory and rewrites the whole file after every change.
#[derive(Debug)]
pub struct JsonFileNoteStore {
    path: PathBuf,
    inner: InMemoryNoteStore,
    write_lock: Mutex<()>,
}

impl JsonFileNoteStore {
    /// Opens the store, starting empty when the file does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let notes: BTreeMap<String, String> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse notes file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read notes file {}", path.display()));
            }
        };

        tracing::info!(path = %path.display(), count = notes.len(), "notes loaded");
        Ok(Self {
            path,
            inner: InMemoryNoteStore::with_notes(notes),
            write_lock: Mutex::new(()),
        })
    }

    /// Writes the whole map. Callers hold `write_lock`.
    async fn persist(&self) -> Result<(), LabError> {
        let notes = self.inner.to_map().await;
        let bytes = serde_json::to_vec_pretty(&notes).map_err(|e| LabError::NoteStore(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LabError::NoteStore(e.to_string()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let written = match tokio::fs::write(&tmp, bytes).await {
            Ok(()) => tokio::fs::rename(&tmp, &self.path).await,
            Err(e) => Err(e),
        };
        written.map_err(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "failed to persist notes");
            LabError::NoteStore(e.to_string())
        })
    }

    /// Puts back the value a failed write replaced.
    async fn restore(&self, key: &str, previous: Option<String>) -> Result<(), LabError> {
        match previous {
            Some(value) => self.inner.put(key, value).await,
            None => self.inner.delete(key).await.map(|_| ()),
        }
    }
}

#[async_trait]
impl NoteStore for JsonFileNoteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, LabError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: String) -> Result<(), LabError> {
        validate_key(key)?;
        let _guard = self.write_lock.lock().await;
        let previous = self.inner.get(key).await?;
        self.inner.put(key, value).await?;
        if let Err(e) = self.persist().await {
            self.restore(key, previous).await?;
            return Err(e);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, LabError> {
        validate_key(key)?;
        let _guard = self.write_lock.lock().await;
        let Some(previous) = self.inner.get(key).await? else {
            return Ok(false);
        };
        self.inner.delete(key).await?;
        if let Err(e) = self.persist().await {
            self.restore(key, Some(previous)).await?;
            return Err(e);
        }
        Ok(true)
    }

    async fn keys(&self) -> Result<Vec<String>, LabError> {
        self.inner.keys().await
    }
}

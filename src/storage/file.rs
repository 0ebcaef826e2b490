// src/storage/file.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;

use crate::domain::ExemptionTable;

use super::traits::Storage;

/// Errors that can occur while reading or writing the state file.
#[derive(Error, Debug)]
pub enum FileStorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// On-disk document holding every persisted value.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    blocked_sites: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    required_reps: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    exemptions: Option<ExemptionTable>,
}

/// Storage backed by a single JSON file.
///
/// Every write rewrites the whole document to a temp file and renames it over
/// the existing file, so a crash never leaves a half-written state file. Writes are
/// serialized by an internal lock; reads always go to disk.
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Create a file storage, creating the parent directory if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, FileStorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        Ok(FileStorage {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<StateDocument, FileStorageError> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(StateDocument::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StateDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, document: &StateDocument) -> Result<(), FileStorageError> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state.json".to_string());
        let temp_path = self.path.with_file_name(format!(".{}.tmp", file_name));

        let bytes = serde_json::to_vec_pretty(document)?;
        fs::write(&temp_path, bytes).await?;
        fs::rename(&temp_path, &self.path).await?;

        Ok(())
    }

    async fn update<F>(&self, apply: F) -> Result<(), FileStorageError>
    where
        F: FnOnce(&mut StateDocument) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        apply(&mut document);
        self.write_document(&document).await
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get_blocked_sites(&self) -> anyhow::Result<Option<Vec<String>>> {
        Ok(self.read_document().await?.blocked_sites)
    }

    async fn set_blocked_sites(&self, sites: &[String]) -> anyhow::Result<()> {
        let sites = sites.to_vec();
        self.update(move |doc| doc.blocked_sites = Some(sites)).await?;
        Ok(())
    }

    async fn get_required_reps(&self) -> anyhow::Result<Option<i64>> {
        Ok(self.read_document().await?.required_reps)
    }

    async fn set_required_reps(&self, count: i64) -> anyhow::Result<()> {
        self.update(move |doc| doc.required_reps = Some(count)).await?;
        Ok(())
    }

    async fn get_exemptions(&self) -> anyhow::Result<Option<ExemptionTable>> {
        Ok(self.read_document().await?.exemptions)
    }

    async fn set_exemptions(&self, table: &ExemptionTable) -> anyhow::Result<()> {
        let table = table.clone();
        self.update(move |doc| doc.exemptions = Some(table)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_reads_as_unset() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::open(temp_dir.path().join("state.json"))
            .await
            .unwrap();

        assert!(storage.get_blocked_sites().await.unwrap().is_none());
        assert!(storage.get_required_reps().await.unwrap().is_none());
        assert!(storage.get_exemptions().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("state.json");

        let expires_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        {
            let storage = FileStorage::open(&path).await.unwrap();
            storage
                .set_blocked_sites(&["reddit.com".to_string(), "youtube.com".to_string()])
                .await
                .unwrap();
            storage.set_required_reps(20).await.unwrap();

            let mut table = ExemptionTable::new();
            table.insert(Domain::new("reddit.com"), expires_at);
            storage.set_exemptions(&table).await.unwrap();
        }

        let storage = FileStorage::open(&path).await.unwrap();
        assert_eq!(
            storage.get_blocked_sites().await.unwrap().unwrap(),
            vec!["reddit.com".to_string(), "youtube.com".to_string()]
        );
        assert_eq!(storage.get_required_reps().await.unwrap(), Some(20));

        let table = storage.get_exemptions().await.unwrap().unwrap();
        assert_eq!(table.expiry(&Domain::new("reddit.com")), Some(expires_at));
    }

    #[tokio::test]
    async fn test_writes_do_not_clobber_other_keys() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::open(temp_dir.path().join("state.json"))
            .await
            .unwrap();

        storage.set_required_reps(7).await.unwrap();
        storage
            .set_blocked_sites(&["tiktok.com".to_string()])
            .await
            .unwrap();

        assert_eq!(storage.get_required_reps().await.unwrap(), Some(7));
        assert!(!temp_dir.path().join(".state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let storage = FileStorage::open(&path).await.unwrap();
        assert!(storage.get_blocked_sites().await.is_err());
    }
}

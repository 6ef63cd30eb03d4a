//! Host storage persisted as a JSON file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use metakeep_connector::host::{Storage, StorageError, StorageResult};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

/// [`Storage`] backed by a single JSON object on disk.
///
/// The file is read once on [`open`](Self::open) and rewritten after every
/// change, so values such as the disconnect flag survive restarts.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    cache: RwLock<Map<String, Value>>,
}

impl FileStorage {
    /// Open the store at `path`, loading existing entries if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let cache = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str(&content)? {
                Value::Object(entries) => entries,
                _ => {
                    return Err(StorageError::backend(
                        "file",
                        format!("{} does not hold a JSON object", path.display()),
                    ));
                }
            }
        } else {
            Map::new()
        };
        Ok(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &Map<String, Value>) -> StorageResult<()> {
        let content = serde_json::to_string_pretty(entries)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.cache.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: Value) -> StorageResult<()> {
        let mut cache = self.cache.write().await;
        cache.insert(key.to_owned(), value);
        self.persist(&cache).await
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        let mut cache = self.cache.write().await;
        if cache.remove(key).is_some() {
            self.persist(&cache).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_fs::TempDir;
    use assert_fs::prelude::*;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.child("nested").child("storage.json");

        let storage = FileStorage::open(path.path()).await.unwrap();
        storage
            .set_item("metaKeep.disconnected", json!(true))
            .await
            .unwrap();
        storage.set_item("other", json!({"a": 1})).await.unwrap();
        storage.remove_item("other").await.unwrap();
        assert!(path.path().exists());

        let reopened = FileStorage::open(path.path()).await.unwrap();
        assert_eq!(
            reopened.get_item("metaKeep.disconnected").await.unwrap(),
            Some(json!(true))
        );
        assert_eq!(reopened.get_item("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.child("storage.json");
        file.write_str("not json").unwrap();
        let err = FileStorage::open(file.path()).await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));

        file.write_str("[1, 2]").unwrap();
        let err = FileStorage::open(file.path()).await.unwrap_err();
        assert!(matches!(err, StorageError::Backend { backend: "file", .. }));
    }
}

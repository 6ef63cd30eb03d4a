//! Host-provided key/value storage.
//!
//! The host persists small JSON values for connectors (for example the
//! "user disconnected" flag). [`Storage`] is the async seam; [`MemoryStorage`]
//! is the in-process backend used by tests and short-lived hosts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

/// Error type for host storage operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StorageError {
    /// A stored value could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O failure in a persistent backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The storage backend encountered an error.
    #[error("[{backend}] {message}")]
    Backend {
        /// Backend identifier (e.g., `"file"`).
        backend: &'static str,
        /// Human-readable error description.
        message: String,
    },
}

impl StorageError {
    /// Creates a [`Backend`](Self::Backend) error for the given backend.
    #[must_use]
    pub fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            message: message.into(),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Async key/value storage injected by the host.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read the value stored under `key`.
    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: Value) -> StorageResult<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove_item(&self, key: &str) -> StorageResult<()>;
}

/// A shared, reference-counted storage handle.
pub type SharedStorage = Arc<dyn Storage>;

/// In-memory storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, Value>>,
}

impl MemoryStorage {
    /// Create an empty memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory storage behind a [`SharedStorage`] handle.
    #[must_use]
    pub fn shared() -> SharedStorage {
        Arc::new(Self::new())
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    /// Returns `true` if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: Value) -> StorageResult<()> {
        self.items.write().await.insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.items.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        assert!(storage.is_empty().await);

        storage
            .set_item("metaKeep.disconnected", json!(true))
            .await
            .unwrap();
        assert_eq!(
            storage.get_item("metaKeep.disconnected").await.unwrap(),
            Some(json!(true))
        );

        storage.remove_item("metaKeep.disconnected").await.unwrap();
        storage.remove_item("metaKeep.disconnected").await.unwrap();
        assert!(storage.get_item("metaKeep.disconnected").await.unwrap().is_none());
        assert_eq!(storage.len().await, 0);
    }
}

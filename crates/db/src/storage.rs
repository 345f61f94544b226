//! Binary storage for uploaded documents. Metadata lives in the request
//! tables; this layer only keeps bytes addressed by a relative location.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid storage location `{0}`")]
    InvalidLocation(String),
    #[error("no stored object at `{0}`")]
    NotFound(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub location: String,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put(
        &self,
        folder_path: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<StoredObject, StorageError>;

    async fn get(&self, location: &str) -> Result<Vec<u8>, StorageError>;
}

/// Joins a folder path and file name into a relative location, rejecting
/// anything that would escape the storage root.
pub fn object_location(folder_path: &str, file_name: &str) -> Result<String, StorageError> {
    let joined = format!("{}/{}", folder_path.trim_matches('/'), file_name);
    let relative = joined.trim_start_matches('/');
    validate_relative(relative)?;
    Ok(relative.to_owned())
}

fn validate_relative(location: &str) -> Result<PathBuf, StorageError> {
    let path = Path::new(location);
    if location.is_empty() || location.contains('\0') {
        return Err(StorageError::InvalidLocation(location.to_owned()));
    }
    for component in path.components() {
        if !matches!(component, Component::Normal(_)) {
            return Err(StorageError::InvalidLocation(location.to_owned()));
        }
    }
    Ok(path.to_path_buf())
}

pub struct LocalDocumentStore {
    root: PathBuf,
}

impl LocalDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root directory and checks it is writable.
    pub async fn ensure_ready(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let probe = self.root.join(".write-probe");
        tokio::fs::write(&probe, b"ok").await?;
        tokio::fs::remove_file(&probe).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn put(
        &self,
        folder_path: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<StoredObject, StorageError> {
        let location = object_location(folder_path, file_name)?;
        let target = self.root.join(validate_relative(&location)?);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        Ok(StoredObject { location })
    }

    async fn get(&self, location: &str) -> Result<Vec<u8>, StorageError> {
        let target = self.root.join(validate_relative(location)?);
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(location.to_owned()))
            }
            Err(error) => Err(StorageError::Io(error)),
        }
    }
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryDocumentStore {
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put(
        &self,
        folder_path: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<StoredObject, StorageError> {
        let location = object_location(folder_path, file_name)?;
        self.objects.write().await.insert(location.clone(), bytes.to_vec());
        Ok(StoredObject { location })
    }

    async fn get(&self, location: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .read()
            .await
            .get(location)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(location.to_owned()))
    }
}

//! Storage abstraction trait
//!
//! This module defines the Storage trait that the artifact store implements.

use async_trait::async_trait;
use bytes::Bytes;
use opentube_core::AppError;
use std::path::PathBuf;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("File not found: {}", key)),
            StorageError::InvalidKey(msg) => AppError::Validation(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Storage abstraction trait
///
/// Keys are relative paths built by the `layout` module. The encoder writes its
/// output straight to disk, so backends also expose the local path of a key.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write a file. An existing file is replaced atomically (write to a
    /// sibling temp file, then rename), so readers never see partial content.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Read a whole file
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Delete a file. Missing files are not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check if a file or directory exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Create a directory that must not already exist. Parents are created as
    /// needed; the leaf never is reused.
    async fn create_dir(&self, key: &str) -> StorageResult<PathBuf>;

    /// Recursively remove a directory. Missing directories are not an error.
    async fn remove_dir(&self, key: &str) -> StorageResult<()>;

    /// Filesystem path for a key, validated to stay inside the store.
    fn local_path(&self, key: &str) -> StorageResult<PathBuf>;
}

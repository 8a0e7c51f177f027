//! Storage: binary file read/write, no transformation.

use std::path::{Path, PathBuf};

use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
}

pub async fn read_input(path: &Path) -> Result<Bytes, StorageError> {
    tokio::fs::read(path)
        .await
        .map(Bytes::from)
        .map_err(|e| StorageError::ReadFailed(path.to_path_buf(), e))
}

/// Write `data` to `path`, creating parent directories as needed.
pub async fn write_output(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::WriteFailed(path.to_path_buf(), e))?;
    }
    tokio::fs::write(path, data)
        .await
        .map_err(|e| StorageError::WriteFailed(path.to_path_buf(), e))
}

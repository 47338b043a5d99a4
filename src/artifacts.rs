//! Artifact storage for listing screenshots

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact backend error: {0}")]
    Backend(String),
}

/// What a `put` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// An artifact with this key was already stored; its content is left untouched
    AlreadyExists,
}

/// Write-once key/value store for binary artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<PutOutcome, ArtifactError>;
}

/// Stores artifacts as files under one directory
///
/// Bytes are written to a hidden staging file first and then linked into place, so a
/// key only ever names a complete artifact.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ArtifactError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(ArtifactError::Backend(format!("invalid artifact key '{key}'")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<PutOutcome, ArtifactError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let staging = self.root.join(format!(".{}.{}.part", key, Uuid::new_v4()));
        let outcome = publish(&staging, &path, bytes).await;
        if let Err(e) = tokio::fs::remove_file(&staging).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!("Could not remove staging file {}: {}", staging.display(), e);
            }
        }

        let outcome = outcome?;
        if outcome == PutOutcome::Stored {
            tracing::debug!("Stored artifact {}", path.display());
        }
        Ok(outcome)
    }
}

/// Writes `bytes` to `staging` and links it to `path` unless `path` already exists
async fn publish(staging: &Path, path: &Path, bytes: &[u8]) -> Result<PutOutcome, ArtifactError> {
    tokio::fs::write(staging, bytes).await?;
    match tokio::fs::hard_link(staging, path).await {
        Ok(()) => Ok(PutOutcome::Stored),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(PutOutcome::AlreadyExists),
        Err(e) => Err(e.into()),
    }
}

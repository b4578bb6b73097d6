use std::path::PathBuf;

use genvault_store::StoreError;
use genvault_types::{ObjectId, TypeError};
use genvault_vfs::VfsError;
use thiserror::Error;

/// Errors from repository-level operations.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("filesystem error: {0}")]
    Vfs(#[from] VfsError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("host not found: {0}")]
    HostNotFound(String),

    #[error("generation {spec} not found for host {host}")]
    GenerationNotFound { host: String, spec: String },

    #[error("host {0} has no generations")]
    NoGenerations(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("directory {0} reached twice in one tree")]
    Cycle(ObjectId),

    #[error("directory {id} is nested deeper than {limit} levels")]
    TooDeep { id: ObjectId, limit: usize },

    #[error("cannot scan {}: {reason}", path.display())]
    Scan { path: PathBuf, reason: String },
}

impl RepoError {
    /// Whether the underlying session is gone, which makes continuing pointless.
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Store(e) => e.is_connection(),
            Self::Vfs(e) => e.is_connection(),
            _ => false,
        }
    }

    pub fn is_lock_held(&self) -> bool {
        matches!(
            self,
            Self::Vfs(VfsError::LockHeld { .. }) | Self::Store(StoreError::Vfs(VfsError::LockHeld { .. }))
        )
    }
}

/// Result alias for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;

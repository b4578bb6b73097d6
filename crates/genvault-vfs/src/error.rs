//! Error taxonomy shared by every VFS backend.
//!
//! Backends translate their native failures into [`VfsError`] at the
//! boundary, so upper layers never branch on which transport they talk to.

use std::io;

use thiserror::Error;

/// Errors that can occur during VFS operations.
#[derive(Debug, Error)]
pub enum VfsError {
    /// The session could not be established or was lost.
    #[error("connection error for {target}: {reason}")]
    Connection { target: String, reason: String },

    /// The path does not exist.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// Exclusive creation hit an existing path.
    #[error("already exists: {path}")]
    AlreadyExists { path: String },

    /// Another session holds the named lock.
    #[error("lock {name} is held by another session")]
    LockHeld { name: String },

    /// The backend refused access to the path.
    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    /// The backend cannot perform this operation at all.
    #[error("unsupported operation {operation} on {backend}")]
    Unsupported {
        operation: &'static str,
        backend: &'static str,
    },

    /// The path could escape the backend root or is otherwise unusable.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Native failure with no closer match in the taxonomy.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl VfsError {
    pub fn not_found(path: &str) -> Self {
        Self::NotFound {
            path: path.to_string(),
        }
    }

    pub fn already_exists(path: &str) -> Self {
        Self::AlreadyExists {
            path: path.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Translate a native I/O error on `path` into the shared taxonomy.
pub fn translate_io(err: io::Error, path: &str) -> VfsError {
    let path = path.to_string();
    match err.kind() {
        io::ErrorKind::NotFound => VfsError::NotFound { path },
        io::ErrorKind::AlreadyExists => VfsError::AlreadyExists { path },
        io::ErrorKind::PermissionDenied => VfsError::PermissionDenied { path },
        io::ErrorKind::TimedOut
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe => VfsError::Connection {
            target: path,
            reason: err.to_string(),
        },
        io::ErrorKind::Unsupported => VfsError::Unsupported {
            operation: "native call",
            backend: "io",
        },
        _ => VfsError::Io { path, source: err },
    }
}

/// Result alias for VFS operations.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn translated(kind: io::ErrorKind) -> VfsError {
        translate_io(io::Error::new(kind, "boom"), "objects/ab/x")
    }

    #[test]
    fn not_found_maps() {
        let err = translated(io::ErrorKind::NotFound);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not found: objects/ab/x");
    }

    #[test]
    fn already_exists_maps() {
        assert!(translated(io::ErrorKind::AlreadyExists).is_already_exists());
    }

    #[test]
    fn permission_maps() {
        assert!(matches!(
            translated(io::ErrorKind::PermissionDenied),
            VfsError::PermissionDenied { .. }
        ));
    }

    #[test]
    fn network_failures_become_connection_errors() {
        for kind in [
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::BrokenPipe,
            io::ErrorKind::TimedOut,
        ] {
            assert!(translated(kind).is_connection(), "{kind:?}");
        }
    }

    #[test]
    fn everything_else_is_io() {
        assert!(matches!(
            translated(io::ErrorKind::InvalidData),
            VfsError::Io { .. }
        ));
    }
}

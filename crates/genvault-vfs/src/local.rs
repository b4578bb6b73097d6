use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::error::{translate_io, VfsError, VfsResult};
use crate::metadata::{FileKind, Metadata};
use crate::traits::Vfs;

/// [`Vfs`] backed by a directory on the local filesystem.
///
/// Exclusive creation writes to a `tempfile` in the target directory and
/// persists it without clobbering, so a file is either fully present or
/// absent.
pub struct LocalFs {
    root: PathBuf,
    create: bool,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl LocalFs {
    /// Backend rooted at an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            create: false,
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        }
    }

    /// Backend that creates its root directory on `connect` if missing.
    pub fn create(root: impl Into<PathBuf>) -> Self {
        Self {
            create: true,
            ..Self::new(root)
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bytes returned by `read` since the backend was created.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Bytes stored by `create_exclusive` since the backend was created.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Reject paths that could escape the root.
    fn validate_path(path: &str) -> VfsResult<()> {
        let fail = |reason: &str| VfsError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        if path.starts_with('/') || path.starts_with('\\') {
            return Err(fail("absolute path"));
        }
        if path.contains('\\') {
            return Err(fail("contains backslash"));
        }
        if Path::new(path)
            .components()
            .any(|c| c == Component::ParentDir)
        {
            return Err(fail("parent traversal"));
        }
        Ok(())
    }

    fn resolve(&self, path: &str) -> VfsResult<PathBuf> {
        Self::validate_path(path)?;
        if path.is_empty() {
            Ok(self.root.clone())
        } else {
            Ok(self.root.join(path))
        }
    }
}

#[cfg(unix)]
fn to_metadata(meta: &fs::Metadata) -> Metadata {
    use std::os::unix::fs::MetadataExt;

    Metadata {
        kind: FileKind::from_mode(meta.mode()),
        mode: meta.mode(),
        size: meta.size(),
        mtime: meta.mtime(),
        atime: meta.atime(),
        uid: meta.uid(),
        gid: meta.gid(),
    }
}

#[cfg(not(unix))]
fn to_metadata(meta: &fs::Metadata) -> Metadata {
    use crate::metadata::{S_IFDIR, S_IFLNK, S_IFREG};
    use std::time::UNIX_EPOCH;

    let secs = |t: std::io::Result<std::time::SystemTime>| {
        t.ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    };
    let file_type = meta.file_type();
    let (kind, type_bits) = if file_type.is_dir() {
        (FileKind::Directory, S_IFDIR | 0o755)
    } else if file_type.is_symlink() {
        (FileKind::Symlink, S_IFLNK | 0o777)
    } else if file_type.is_file() {
        (FileKind::Regular, S_IFREG | 0o644)
    } else {
        (FileKind::Other, 0o644)
    };
    Metadata {
        kind,
        mode: type_bits,
        size: meta.len(),
        mtime: secs(meta.modified()),
        atime: secs(meta.accessed()),
        uid: 0,
        gid: 0,
    }
}

impl Vfs for LocalFs {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    fn connect(&self) -> VfsResult<()> {
        let target = self.root.display().to_string();
        if self.create {
            fs::create_dir_all(&self.root).map_err(|e| VfsError::Connection {
                target: target.clone(),
                reason: e.to_string(),
            })?;
        }
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => {
                debug!(root = %target, "connected to local filesystem");
                Ok(())
            }
            Ok(_) => Err(VfsError::Connection {
                target,
                reason: "not a directory".into(),
            }),
            Err(e) => Err(VfsError::Connection {
                target,
                reason: e.to_string(),
            }),
        }
    }

    fn close(&self) -> VfsResult<()> {
        info!(
            root = %self.root.display(),
            bytes_read = self.bytes_read(),
            bytes_written = self.bytes_written(),
            "closed local filesystem"
        );
        Ok(())
    }

    fn stat(&self, path: &str) -> VfsResult<Metadata> {
        let full = self.resolve(path)?;
        let meta = fs::symlink_metadata(&full).map_err(|e| translate_io(e, path))?;
        Ok(to_metadata(&meta))
    }

    fn list_dir(&self, path: &str) -> VfsResult<Vec<String>> {
        let full = self.resolve(path)?;
        let mut names = Vec::new();
        for entry in fs::read_dir(&full).map_err(|e| translate_io(e, path))? {
            let entry = entry.map_err(|e| translate_io(e, path))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn make_dir(&self, path: &str) -> VfsResult<()> {
        let full = self.resolve(path)?;
        fs::create_dir(&full).map_err(|e| translate_io(e, path))
    }

    fn create_exclusive(&self, path: &str, data: &[u8]) -> VfsResult<()> {
        let full = self.resolve(path)?;
        let dir = full.parent().unwrap_or(&self.root).to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| translate_io(e, path))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| translate_io(e, path))?;
        tmp.write_all(data).map_err(|e| translate_io(e, path))?;
        tmp.as_file().sync_all().map_err(|e| translate_io(e, path))?;
        tmp.persist_noclobber(&full)
            .map_err(|e| translate_io(e.error, path))?;

        self.bytes_written
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn remove(&self, path: &str) -> VfsResult<()> {
        let full = self.resolve(path)?;
        let meta = fs::symlink_metadata(&full).map_err(|e| translate_io(e, path))?;
        if meta.is_dir() {
            fs::remove_dir(&full)
        } else {
            fs::remove_file(&full)
        }
        .map_err(|e| translate_io(e, path))
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;
        fs::rename(&src, &dst).map_err(|e| translate_io(e, from))
    }

    fn read(&self, path: &str) -> VfsResult<Vec<u8>> {
        let full = self.resolve(path)?;
        let data = fs::read(&full).map_err(|e| translate_io(e, path))?;
        self.bytes_read
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(data)
    }

    fn hard_link(&self, existing: &str, new: &str) -> VfsResult<()> {
        let src = self.resolve(existing)?;
        let dst = self.resolve(new)?;
        fs::hard_link(&src, &dst).map_err(|e| translate_io(e, new))
    }
}

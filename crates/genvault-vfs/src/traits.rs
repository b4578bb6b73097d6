use tracing::{debug, warn};

use crate::error::{VfsError, VfsResult};
use crate::metadata::Metadata;
use crate::path;

/// How many random temp names `write_temp` tries before giving up.
const TEMP_NAME_ATTEMPTS: usize = 16;

/// Filesystem abstraction a repository is stored on.
///
/// Paths are `/`-separated and relative to the backend root; `""` is the
/// root itself. All implementations must satisfy these invariants:
/// - `create_exclusive` is atomic: either the complete file appears under
///   the target name or nothing does, and it fails with `AlreadyExists` if
///   the name is taken.
/// - `rename` replaces an existing target.
/// - Backend-native failures are translated into [`VfsError`]; nothing
///   transport-specific leaks upward.
///
/// Everything above the primitives (recursive mkdir, atomic overwrite,
/// locking) is provided here in terms of those primitives, so a backend only
/// needs to get the primitives right.
pub trait Vfs: Send + Sync {
    /// Short backend name used in error messages and logs.
    fn backend_name(&self) -> &'static str;

    /// Establish the session. Must be called before any other operation.
    fn connect(&self) -> VfsResult<()>;

    /// Tear down the session. Further operations may fail with `Connection`.
    fn close(&self) -> VfsResult<()> {
        Ok(())
    }

    /// Metadata for `path`, not following symlinks.
    fn stat(&self, path: &str) -> VfsResult<Metadata>;

    /// Names (not paths) of the entries in a directory, sorted.
    fn list_dir(&self, path: &str) -> VfsResult<Vec<String>>;

    /// Create one directory. The parent must exist.
    fn make_dir(&self, path: &str) -> VfsResult<()>;

    /// Atomically create a new file holding `data`, creating missing parent
    /// directories. Fails with `AlreadyExists` if `path` exists.
    fn create_exclusive(&self, path: &str, data: &[u8]) -> VfsResult<()>;

    /// Remove a file or an empty directory.
    fn remove(&self, path: &str) -> VfsResult<()>;

    /// Rename `from` to `to`, replacing `to` if it exists.
    fn rename(&self, from: &str, to: &str) -> VfsResult<()>;

    /// Full contents of a file.
    fn read(&self, path: &str) -> VfsResult<Vec<u8>>;

    /// Create a hard link. Most backends cannot.
    fn hard_link(&self, existing: &str, new: &str) -> VfsResult<()> {
        let _ = (existing, new);
        Err(VfsError::Unsupported {
            operation: "hard_link",
            backend: self.backend_name(),
        })
    }

    /// Whether `path` exists. Any failure, including a dropped connection,
    /// reads as "does not exist".
    fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }

    /// Whether `path` is a directory. Failures read as `false`.
    fn is_dir(&self, path: &str) -> bool {
        matches!(self.stat(path), Ok(meta) if meta.is_dir())
    }

    /// Create `path` and any missing ancestors. Existing directories are fine.
    fn make_dirs(&self, path: &str) -> VfsResult<()> {
        if path.is_empty() || self.is_dir(path) {
            return Ok(());
        }
        self.make_dirs(path::parent(path))?;
        match self.make_dir(path) {
            Ok(()) => Ok(()),
            Err(e) if e.is_already_exists() && self.is_dir(path) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Write `data` to a fresh, uniquely named temporary file inside `dir`
    /// and return its path.
    fn write_temp(&self, dir: &str, data: &[u8]) -> VfsResult<String> {
        for _ in 0..TEMP_NAME_ATTEMPTS {
            let name = path::join(dir, &format!("tmp.{:016x}", rand::random::<u64>()));
            match self.create_exclusive(&name, data) {
                Ok(()) => return Ok(name),
                Err(e) if e.is_already_exists() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(VfsError::already_exists(&path::join(dir, "tmp.*")))
    }

    /// Replace the contents of `path` so that a reader sees either the old
    /// or the new version, never a mix.
    ///
    /// The new data goes to a temp file first. The current file is renamed
    /// to `<path>.bak`, then the temp file is renamed into place. If the
    /// session dies between the two renames, [`Vfs::read_current`] still
    /// finds the old version. With `keep_backup == false` the `.bak` copy is
    /// removed afterwards.
    fn overwrite_atomic(&self, path: &str, data: &[u8], keep_backup: bool) -> VfsResult<()> {
        let temp = self.write_temp(path::parent(path), data)?;
        let backup = path::backup_path(path);

        if self.exists(path) {
            self.rename(path, &backup)?;
        }
        self.rename(&temp, path)?;

        if !keep_backup {
            match self.remove(&backup) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        debug!(path, bytes = data.len(), "overwrote file");
        Ok(())
    }

    /// Read `path`, falling back to the `.bak` copy an interrupted
    /// [`Vfs::overwrite_atomic`] may have left behind.
    fn read_current(&self, path: &str) -> VfsResult<Vec<u8>> {
        match self.read(path) {
            Err(e) if e.is_not_found() => match self.read(&path::backup_path(path)) {
                Ok(data) => {
                    warn!(path, "file missing, recovered previous version from backup");
                    Ok(data)
                }
                Err(backup_err) if backup_err.is_not_found() => Err(e),
                Err(backup_err) => Err(backup_err),
            },
            other => other,
        }
    }

    /// Take the named lock by creating an empty file exclusively.
    ///
    /// Fails with `LockHeld` if the lock file already exists.
    fn lock(&self, name: &str) -> VfsResult<()> {
        match self.create_exclusive(name, b"") {
            Ok(()) => {
                debug!(lock = name, "lock acquired");
                Ok(())
            }
            Err(e) if e.is_already_exists() => Err(VfsError::LockHeld {
                name: name.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Release the named lock. Releasing a lock that is not held is a no-op.
    fn unlock(&self, name: &str) -> VfsResult<()> {
        match self.remove(name) {
            Ok(()) => {
                debug!(lock = name, "lock released");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

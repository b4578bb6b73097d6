//! Fault injection for exercising crash recovery.
//!
//! [`CrashingFs`] wraps another backend and fails every mutating primitive
//! once a configured number of writes has gone through, as if the process
//! or the connection died at that point.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::error::{VfsError, VfsResult};
use crate::metadata::Metadata;
use crate::traits::Vfs;

/// A [`Vfs`] that simulates a crash after `limit` mutating calls.
///
/// A limit of 0 disables the simulation. Reads keep working after the crash
/// so tests can inspect what was left behind.
pub struct CrashingFs {
    inner: Arc<dyn Vfs>,
    limit: u64,
    writes: AtomicU64,
}

impl CrashingFs {
    pub fn new(inner: Arc<dyn Vfs>, limit: u64) -> Self {
        Self {
            inner,
            limit,
            writes: AtomicU64::new(0),
        }
    }

    /// Mutating calls attempted so far, including the one that crashed.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn count_write(&self, operation: &str) -> VfsResult<()> {
        let n = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if self.limit > 0 && n > self.limit {
            warn!(operation, limit = self.limit, "simulating crash");
            return Err(VfsError::Connection {
                target: self.inner.backend_name().to_string(),
                reason: format!("simulated crash after {} writes", self.limit),
            });
        }
        Ok(())
    }
}

impl Vfs for CrashingFs {
    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    fn connect(&self) -> VfsResult<()> {
        self.inner.connect()
    }

    fn close(&self) -> VfsResult<()> {
        self.inner.close()
    }

    fn stat(&self, path: &str) -> VfsResult<Metadata> {
        self.inner.stat(path)
    }

    fn list_dir(&self, path: &str) -> VfsResult<Vec<String>> {
        self.inner.list_dir(path)
    }

    fn make_dir(&self, path: &str) -> VfsResult<()> {
        self.count_write("make_dir")?;
        self.inner.make_dir(path)
    }

    fn create_exclusive(&self, path: &str, data: &[u8]) -> VfsResult<()> {
        self.count_write("create_exclusive")?;
        self.inner.create_exclusive(path, data)
    }

    fn remove(&self, path: &str) -> VfsResult<()> {
        self.count_write("remove")?;
        self.inner.remove(path)
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        self.count_write("rename")?;
        self.inner.rename(from, to)
    }

    fn read(&self, path: &str) -> VfsResult<Vec<u8>> {
        self.inner.read(path)
    }

    fn hard_link(&self, existing: &str, new: &str) -> VfsResult<()> {
        self.count_write("hard_link")?;
        self.inner.hard_link(existing, new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFs;

    fn seeded() -> Arc<MemoryFs> {
        let mem = Arc::new(MemoryFs::new());
        mem.connect().unwrap();
        mem.create_exclusive("hosts/web", b"original").unwrap();
        mem
    }

    #[test]
    fn zero_limit_never_crashes() {
        let mem = seeded();
        let fs = CrashingFs::new(mem, 0);
        for i in 0..20 {
            fs.create_exclusive(&format!("f{i}"), b"").unwrap();
        }
        assert_eq!(fs.writes(), 20);
    }

    #[test]
    fn crash_before_first_rename_leaves_original() {
        let mem = seeded();
        let fs = CrashingFs::new(mem.clone(), 1);
        let err = fs.overwrite_atomic("hosts/web", b"new", true).unwrap_err();
        assert!(err.is_connection());
        assert_eq!(mem.read("hosts/web").unwrap(), b"original");
        assert!(!mem.exists("hosts/web.bak"));
    }

    #[test]
    fn crash_between_renames_recovers_from_backup() {
        let mem = seeded();
        let fs = CrashingFs::new(mem.clone(), 2);
        let err = fs.overwrite_atomic("hosts/web", b"new", true).unwrap_err();
        assert!(err.is_connection());
        assert!(!mem.exists("hosts/web"));
        assert_eq!(mem.read_current("hosts/web").unwrap(), b"original");
    }

    #[test]
    fn reads_survive_the_crash() {
        let mem = seeded();
        let fs = CrashingFs::new(mem, 1);
        fs.create_exclusive("a", b"").unwrap();
        assert!(fs.create_exclusive("b", b"").is_err());
        assert_eq!(fs.read("hosts/web").unwrap(), b"original");
    }
}

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{VfsError, VfsResult};
use crate::traits::Vfs;

/// Delay between attempts while waiting for a held lock.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A held [`Vfs::lock`] that is released when dropped.
pub struct LockGuard {
    vfs: Arc<dyn Vfs>,
    name: String,
    released: bool,
}

impl LockGuard {
    /// Take the lock or fail immediately with `LockHeld`.
    pub fn acquire(vfs: Arc<dyn Vfs>, name: &str) -> VfsResult<Self> {
        vfs.lock(name)?;
        Ok(Self {
            vfs,
            name: name.to_string(),
            released: false,
        })
    }

    /// Take the lock, retrying while it is held for up to `timeout`.
    pub fn acquire_with_timeout(
        vfs: Arc<dyn Vfs>,
        name: &str,
        timeout: Duration,
    ) -> VfsResult<Self> {
        let deadline = Instant::now() + timeout;
        loop {
            match vfs.lock(name) {
                Ok(()) => {
                    return Ok(Self {
                        vfs,
                        name: name.to_string(),
                        released: false,
                    })
                }
                Err(VfsError::LockHeld { .. }) if Instant::now() < deadline => {
                    debug!(lock = name, "lock held, waiting");
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the lock now and report failures instead of logging them.
    pub fn release(mut self) -> VfsResult<()> {
        self.released = true;
        self.vfs.unlock(&self.name)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.vfs.unlock(&self.name) {
            warn!(lock = %self.name, error = %e, "failed to release lock");
        }
    }
}

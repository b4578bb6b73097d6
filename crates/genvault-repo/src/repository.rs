use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use genvault_store::layout::{HOSTS_DIR, LOCK_PATH, OBJECTS_DIR, ROOT_PATH};
use genvault_store::{Generation, Host, ObjectStore, Root, ZstdTransform};
use genvault_types::ObjectId;
use genvault_vfs::{CrashingFs, LockGuard, Vfs};
use tracing::{debug, info, warn};

use crate::backup::{clock, BackupSession, BackupStats};
use crate::cancel::CancelToken;
use crate::config::{Compression, Config};
use crate::error::{RepoError, RepoResult};
use crate::fsck::{Checker, FsckReport};
use crate::spec::GenerationSpec;
use crate::walker::Walker;

/// A connected repository and the settings it was opened with.
pub struct Repository {
    store: ObjectStore,
    config: Config,
}

impl Repository {
    /// Connect to the repository behind `vfs`.
    ///
    /// The configuration decides which transforms the store applies and
    /// whether the backend is wrapped for fault injection.
    pub fn open(vfs: Arc<dyn Vfs>, config: Config) -> RepoResult<Self> {
        config.validate()?;
        let vfs: Arc<dyn Vfs> = if config.crash_limit > 0 {
            warn!(limit = config.crash_limit, "fault injection enabled");
            Arc::new(CrashingFs::new(vfs, config.crash_limit))
        } else {
            vfs
        };
        vfs.connect()?;

        let mut store = ObjectStore::new(vfs).with_strict_put(config.strict_put);
        if config.compression == Compression::Zstd {
            store = store.with_transform(Box::new(ZstdTransform::new(config.zstd_level)));
        }
        debug!(client = %config.client_name, compression = ?config.compression, "repository opened");
        Ok(Self { store, config })
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current time, or the configured pretend time. Backups stamp their
    /// generations from the same clock.
    pub fn now(&self) -> RepoResult<DateTime<Utc>> {
        Ok(clock(self.config.pretend_time()?))
    }

    /// Lay out an empty repository. Existing content is left alone.
    pub fn init(&self) -> RepoResult<()> {
        let _lock = self.lock()?;
        let vfs = self.store.vfs();
        vfs.make_dirs(OBJECTS_DIR)?;
        vfs.make_dirs(HOSTS_DIR)?;
        if vfs.exists(ROOT_PATH) || vfs.exists(&genvault_vfs::path::backup_path(ROOT_PATH)) {
            debug!("repository already initialized");
        } else {
            self.store.put_root(&Root::default())?;
            info!("initialized repository");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    pub fn hosts(&self) -> RepoResult<Vec<String>> {
        Ok(self.store.list_hosts()?)
    }

    pub fn host(&self, hostname: &str) -> RepoResult<Host> {
        match self.store.get_host(hostname) {
            Ok(host) => Ok(host),
            Err(e) if e.is_not_found() => Err(RepoError::HostNotFound(hostname.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Every generation of a host, oldest first.
    pub fn generations(&self, hostname: &str) -> RepoResult<Vec<Generation>> {
        let host = self.host(hostname)?;
        host.generations
            .iter()
            .map(|id| Ok(self.store.get::<Generation>(id)?))
            .collect()
    }

    pub fn generation(&self, hostname: &str, spec: &GenerationSpec) -> RepoResult<Generation> {
        let id = spec.resolve(&self.host(hostname)?)?;
        Ok(self.store.get(&id)?)
    }

    /// Walk a generation's directory tree with the configured depth guard.
    pub fn walk(&self, generation: &Generation) -> Walker<'_> {
        Walker::new(&self.store, generation).with_max_depth(self.config.max_tree_depth)
    }

    pub fn checker(&self) -> Checker<'_> {
        Checker::new(&self.store).with_max_depth(self.config.max_tree_depth)
    }

    /// Check the whole repository, reporting progress to `observer`.
    pub fn fsck<'a>(&'a self, observer: impl FnMut(&str) + 'a) -> RepoResult<FsckReport> {
        self.checker().with_observer(observer).check()
    }

    // -----------------------------------------------------------------------
    // Writing
    // -----------------------------------------------------------------------

    /// Take the repository lock, waiting up to the configured timeout.
    pub fn lock(&self) -> RepoResult<LockGuard> {
        Ok(self.store.lock_with_timeout(self.config.lock_timeout())?)
    }

    /// Remove a lock left behind by a process that died. Returns whether a
    /// lock was present.
    pub fn force_unlock(&self) -> RepoResult<bool> {
        let vfs = self.store.vfs();
        let held = vfs.exists(LOCK_PATH);
        vfs.unlock(LOCK_PATH)?;
        if held {
            warn!("removed repository lock");
        }
        Ok(held)
    }

    /// Lock the repository and start a generation for the configured client.
    pub fn begin_backup(&self) -> RepoResult<BackupSession<'_>> {
        let lock = self.lock()?;
        let hostname = &self.config.client_name;
        let host = match self.store.get_host(hostname) {
            Ok(host) => host,
            Err(e) if e.is_not_found() => Host::new(hostname.clone()),
            Err(e) => return Err(e.into()),
        };
        Ok(BackupSession::new(
            &self.store,
            lock,
            host,
            self.config.pretend_time()?,
            self.config.files_per_group,
        ))
    }

    /// Back up the metadata of the directory tree at `path` as a new
    /// generation of the configured client.
    pub fn backup_path(
        &self,
        path: &Path,
        cancel: &CancelToken,
    ) -> RepoResult<(Generation, BackupStats)> {
        let mut session = self.begin_backup()?;
        let root = session.scan(path, cancel)?;
        cancel.check()?;
        let stats = session.stats().clone();
        let generation = session.commit(root)?;
        Ok((generation, stats))
    }

    /// Drop a generation from its host and delete the generation object.
    ///
    /// Directories and file groups below it stay in place; another
    /// generation may still reference them.
    pub fn forget(&self, hostname: &str, spec: &GenerationSpec) -> RepoResult<ObjectId> {
        let lock = self.lock()?;
        let mut host = self.host(hostname)?;
        let id = spec.resolve(&host)?;
        host.generations.retain(|g| g != &id);
        self.store.put_host(&host)?;
        self.store.remove(&id)?;
        info!(host = hostname, generation = %id, "forgot generation");
        lock.release()?;
        Ok(id)
    }

    /// End the backend session.
    pub fn close(self) -> RepoResult<()> {
        self.store.vfs().close()?;
        Ok(())
    }
}

//! Writing new generations.
//!
//! A [`BackupSession`] holds the repository lock from the moment it is opened
//! until it is committed or dropped. Objects are written bottom-up (file
//! groups, then directories, then the generation), and the host and root
//! lists are only touched by [`BackupSession::commit`]. An abandoned session
//! therefore leaves unreferenced objects behind but never a host list that
//! points at a half-written tree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use genvault_store::{Dir, File, FileGroup, Generation, Host, ObjectStore};
use genvault_types::ObjectId;
use genvault_vfs::LockGuard;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::error::{RepoError, RepoResult};

/// Counters for one backup run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BackupStats {
    pub dirs: usize,
    pub files: usize,
    pub file_groups: usize,
    /// Entries that could not be read and were left out.
    pub skipped: usize,
}

/// An open, locked backup of one host.
pub struct BackupSession<'a> {
    store: &'a ObjectStore,
    lock: LockGuard,
    host: Host,
    started: DateTime<Utc>,
    pretend_time: Option<DateTime<Utc>>,
    files_per_group: usize,
    stats: BackupStats,
}

impl<'a> BackupSession<'a> {
    pub(crate) fn new(
        store: &'a ObjectStore,
        lock: LockGuard,
        host: Host,
        pretend_time: Option<DateTime<Utc>>,
        files_per_group: usize,
    ) -> Self {
        let started = clock(pretend_time);
        debug!(host = %host.hostname, %started, "backup session opened");
        Self {
            store,
            lock,
            host,
            started,
            pretend_time,
            files_per_group: files_per_group.max(1),
            stats: BackupStats::default(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.host.hostname
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn stats(&self) -> &BackupStats {
        &self.stats
    }

    /// Store one file group and return its identifier.
    pub fn put_file_group(&mut self, files: Vec<File>) -> RepoResult<ObjectId> {
        let count = files.len();
        let id = self.store.put(&FileGroup::new(ObjectId::generate(), files))?;
        self.stats.file_groups += 1;
        self.stats.files += count;
        Ok(id)
    }

    /// Split `files` into groups of at most `files_per_group` and store each.
    /// No files means no groups.
    pub fn put_files(&mut self, files: Vec<File>) -> RepoResult<Vec<ObjectId>> {
        let mut ids = Vec::new();
        let mut rest = files;
        while !rest.is_empty() {
            let tail = rest.split_off(rest.len().min(self.files_per_group));
            ids.push(self.put_file_group(rest)?);
            rest = tail;
        }
        Ok(ids)
    }

    /// Store a directory whose children have already been stored.
    pub fn put_dir(
        &mut self,
        name: impl Into<String>,
        dirrefs: Vec<ObjectId>,
        fgrefs: Vec<ObjectId>,
    ) -> RepoResult<ObjectId> {
        let id = self
            .store
            .put(&Dir::new(ObjectId::generate(), name, dirrefs, fgrefs))?;
        self.stats.dirs += 1;
        Ok(id)
    }

    /// Record the tree under `path` on the local disk and return its root
    /// directory identifier.
    ///
    /// Only metadata is stored. Unreadable entries below the top are logged
    /// and skipped; an unreadable top is an error.
    pub fn scan(&mut self, path: &Path, cancel: &CancelToken) -> RepoResult<ObjectId> {
        let mut pending: HashMap<PathBuf, PendingDir> = HashMap::new();
        let walk = WalkDir::new(path)
            .follow_links(false)
            .contents_first(true)
            .sort_by_file_name();

        for entry in walk {
            cancel.check()?;
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(RepoError::Scan {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    })
                }
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    self.stats.skipped += 1;
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                let contents = pending.remove(entry.path()).unwrap_or_default();
                let fgrefs = self.put_files(contents.files)?;
                if entry.depth() == 0 {
                    let name = path.display().to_string();
                    return self.put_dir(name, contents.dirrefs, fgrefs);
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                let id = self.put_dir(name, contents.dirrefs, fgrefs)?;
                pending
                    .entry(parent_of(entry.path()))
                    .or_default()
                    .dirrefs
                    .push(id);
            } else {
                if entry.depth() == 0 {
                    return Err(RepoError::Scan {
                        path: path.to_path_buf(),
                        reason: "not a directory".into(),
                    });
                }
                match file_entry(&entry) {
                    Ok(file) => pending
                        .entry(parent_of(entry.path()))
                        .or_default()
                        .files
                        .push(file),
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "skipping unreadable entry");
                        self.stats.skipped += 1;
                    }
                }
            }
        }

        Err(RepoError::Scan {
            path: path.to_path_buf(),
            reason: "directory vanished during scan".into(),
        })
    }

    /// Write the generation for `root`, append it to the host, make sure the
    /// host is listed in the root, and release the lock.
    pub fn commit(mut self, root: ObjectId) -> RepoResult<Generation> {
        let mut generation = Generation::new(ObjectId::generate(), self.started, root);
        generation.ended = Some(clock(self.pretend_time));
        self.store.put(&generation)?;

        self.host.generations.push(generation.id.clone());
        self.store.put_host(&self.host)?;

        let mut root_list = self.store.get_root()?;
        if !root_list.hosts.contains(&self.host.hostname) {
            root_list.hosts.push(self.host.hostname.clone());
            self.store.put_root(&root_list)?;
        }

        info!(
            host = %self.host.hostname,
            generation = %generation.id,
            dirs = self.stats.dirs,
            files = self.stats.files,
            "generation committed"
        );
        self.lock.release()?;
        Ok(generation)
    }
}

/// The time source for generation timestamps and [`Repository::now`].
///
/// [`Repository::now`]: crate::Repository::now
pub(crate) fn clock(pretend_time: Option<DateTime<Utc>>) -> DateTime<Utc> {
    pretend_time.unwrap_or_else(Utc::now)
}

#[derive(Default)]
struct PendingDir {
    dirrefs: Vec<ObjectId>,
    files: Vec<File>,
}

fn parent_of(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn file_entry(entry: &walkdir::DirEntry) -> RepoResult<File> {
    let meta = entry.metadata().map_err(|e| RepoError::Scan {
        path: entry.path().to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut file = File::new(entry.file_name().to_string_lossy());
    fill_metadata(&mut file, &meta);
    if meta.file_type().is_symlink() {
        let target = std::fs::read_link(entry.path()).map_err(|e| RepoError::Scan {
            path: entry.path().to_path_buf(),
            reason: e.to_string(),
        })?;
        file.target = Some(target.to_string_lossy().into_owned());
    }
    Ok(file)
}

#[cfg(unix)]
fn fill_metadata(file: &mut File, meta: &std::fs::Metadata) {
    use std::os::unix::fs::MetadataExt;

    file.mode = meta.mode();
    file.size = meta.size();
    file.mtime = meta.mtime();
    file.uid = meta.uid();
    file.gid = meta.gid();
}

#[cfg(not(unix))]
fn fill_metadata(file: &mut File, meta: &std::fs::Metadata) {
    use genvault_vfs::metadata::{S_IFLNK, S_IFREG};

    let file_type = meta.file_type();
    file.mode = if file_type.is_symlink() {
        S_IFLNK | 0o777
    } else if meta.permissions().readonly() {
        S_IFREG | 0o444
    } else {
        S_IFREG | 0o644
    };
    file.size = meta.len();
    file.mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .unwrap_or(0);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use genvault_store::Root;
    use genvault_vfs::{MemoryFs, Vfs};

    use super::*;

    fn store() -> ObjectStore {
        let fs = Arc::new(MemoryFs::new());
        fs.connect().unwrap();
        ObjectStore::new(fs)
    }

    fn session(store: &ObjectStore, per_group: usize) -> BackupSession<'_> {
        let lock = store.lock().unwrap();
        let pretend = DateTime::from_timestamp(1_700_000_000, 0);
        BackupSession::new(store, lock, Host::new("web"), pretend, per_group)
    }

    // ------------------------------------------------------------------
    // Building trees by hand
    // ------------------------------------------------------------------

    #[test]
    fn files_are_chunked() {
        let store = store();
        let mut s = session(&store, 2);
        let files = ["a", "b", "c", "d", "e"].map(File::new).to_vec();
        let ids = s.put_files(files).unwrap();
        assert_eq!(ids.len(), 3);
        let sizes: Vec<usize> = ids
            .iter()
            .map(|id| store.get::<FileGroup>(id).unwrap().files.len())
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(s.stats().files, 5);
        assert!(s.put_files(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn commit_updates_host_and_root() {
        let store = store();
        let mut s = session(&store, 10);
        let fg = s.put_files(vec![File::new("f")]).unwrap();
        let root = s.put_dir("/", vec![], fg).unwrap();
        let generation = s.commit(root.clone()).unwrap();

        assert_eq!(generation.root, root);
        assert_eq!(generation.started.timestamp(), 1_700_000_000);
        assert_eq!(generation.ended, Some(generation.started));
        assert_eq!(store.get::<Generation>(&generation.id).unwrap(), generation);
        assert_eq!(store.list_generations("web").unwrap(), vec![generation.id]);
        assert_eq!(store.get_root().unwrap(), Root { hosts: vec!["web".into()] });
    }

    #[test]
    fn commit_releases_lock() {
        let store = store();
        let mut s = session(&store, 10);
        assert!(store.lock().is_err());
        let root = s.put_dir("/", vec![], vec![]).unwrap();
        s.commit(root).unwrap();
        assert!(store.lock().is_ok());
    }

    #[test]
    fn abandoned_session_leaves_lists_untouched() {
        let store = store();
        {
            let mut s = session(&store, 10);
            s.put_dir("/", vec![], vec![]).unwrap();
        }
        assert!(store.list_hosts().unwrap().is_empty());
        assert!(store.lock().is_ok());
    }

    // ------------------------------------------------------------------
    // Scanning a local directory
    // ------------------------------------------------------------------

    #[test]
    fn scan_builds_sorted_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b/c")).unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::write(dir.path().join("top.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("b/c/deep.txt"), b"x").unwrap();

        let store = store();
        let mut s = session(&store, 10);
        let root_id = s.scan(dir.path(), &CancelToken::new()).unwrap();

        let root: Dir = store.get(&root_id).unwrap();
        assert_eq!(root.name, dir.path().display().to_string());
        let children: Vec<String> = root
            .dirrefs
            .iter()
            .map(|id| store.get::<Dir>(id).unwrap().name)
            .collect();
        assert_eq!(children, vec!["a", "b"]);

        assert_eq!(root.fgrefs.len(), 1);
        let group: FileGroup = store.get(&root.fgrefs[0]).unwrap();
        assert_eq!(group.files.len(), 1);
        assert_eq!(group.files[0].name, "top.txt");
        assert_eq!(group.files[0].size, 5);

        assert_eq!(s.stats().dirs, 4);
        assert_eq!(s.stats().files, 2);
    }

    #[cfg(unix)]
    #[test]
    fn scan_records_symlink_target() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("elsewhere", dir.path().join("link")).unwrap();

        let store = store();
        let mut s = session(&store, 10);
        let root: Dir = store
            .get(&s.scan(dir.path(), &CancelToken::new()).unwrap())
            .unwrap();
        let group: FileGroup = store.get(&root.fgrefs[0]).unwrap();
        assert_eq!(group.files[0].target.as_deref(), Some("elsewhere"));
        assert_eq!(
            genvault_vfs::FileKind::from_mode(group.files[0].mode),
            genvault_vfs::FileKind::Symlink
        );
    }

    #[test]
    fn scan_of_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = store();
        let mut s = session(&store, 10);
        let err = s
            .scan(&dir.path().join("nope"), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, RepoError::Scan { .. }));
    }

    #[test]
    fn scan_of_plain_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"").unwrap();
        let store = store();
        let mut s = session(&store, 10);
        let err = s.scan(&file, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, RepoError::Scan { .. }));
    }

    #[test]
    fn cancelled_scan_writes_nothing_listed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f"), b"").unwrap();
        let store = store();
        let mut s = session(&store, 10);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            s.scan(dir.path(), &cancel),
            Err(RepoError::Cancelled)
        ));
        drop(s);
        assert!(store.list_hosts().unwrap().is_empty());
    }
}

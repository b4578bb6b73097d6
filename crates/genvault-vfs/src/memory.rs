//! In-memory filesystem for testing and ephemeral repositories.
//!
//! [`MemoryFs`] keeps every file and directory in a `BTreeMap` behind a
//! `RwLock`. It honors the full [`Vfs`] contract, including refusing work
//! before `connect` and after `close`, so repository code can be tested
//! without touching disk.

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{VfsError, VfsResult};
use crate::metadata::{FileKind, Metadata, S_IFDIR, S_IFREG};
use crate::path;
use crate::traits::Vfs;

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

/// An in-memory implementation of [`Vfs`].
///
/// Data is lost when the value is dropped.
#[derive(Debug, Default)]
pub struct MemoryFs {
    nodes: RwLock<BTreeMap<String, Node>>,
    connected: AtomicBool,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored path, sorted. Directories included.
    pub fn paths(&self) -> Vec<String> {
        match self.nodes.read() {
            Ok(nodes) => nodes.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn ensure_connected(&self) -> VfsResult<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(VfsError::Connection {
                target: "memory".into(),
                reason: "not connected".into(),
            })
        }
    }

    fn read_nodes(&self) -> VfsResult<RwLockReadGuard<'_, BTreeMap<String, Node>>> {
        self.ensure_connected()?;
        self.nodes.read().map_err(|e| VfsError::Connection {
            target: "memory".into(),
            reason: format!("lock poisoned: {e}"),
        })
    }

    fn write_nodes(&self) -> VfsResult<RwLockWriteGuard<'_, BTreeMap<String, Node>>> {
        self.ensure_connected()?;
        self.nodes.write().map_err(|e| VfsError::Connection {
            target: "memory".into(),
            reason: format!("lock poisoned: {e}"),
        })
    }
}

fn other_error(path: &str, msg: &str) -> VfsError {
    VfsError::Io {
        path: path.to_string(),
        source: io::Error::new(io::ErrorKind::Other, msg.to_string()),
    }
}

fn is_dir(nodes: &BTreeMap<String, Node>, path: &str) -> bool {
    path.is_empty() || matches!(nodes.get(path), Some(Node::Dir))
}

fn has_children(nodes: &BTreeMap<String, Node>, path: &str) -> bool {
    let prefix = format!("{path}/");
    nodes
        .range(prefix.clone()..)
        .next()
        .is_some_and(|(k, _)| k.starts_with(&prefix))
}

/// `path` plus every key below it.
fn subtree(nodes: &BTreeMap<String, Node>, path: &str) -> Vec<String> {
    let prefix = format!("{path}/");
    let mut keys = vec![path.to_string()];
    keys.extend(
        nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone()),
    );
    keys
}

impl Vfs for MemoryFs {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn connect(&self) -> VfsResult<()> {
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn close(&self) -> VfsResult<()> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    fn stat(&self, path: &str) -> VfsResult<Metadata> {
        let path = path::normalize(path);
        let nodes = self.read_nodes()?;
        let (kind, mode, size) = if path.is_empty() {
            (FileKind::Directory, S_IFDIR | 0o755, 0)
        } else {
            match nodes.get(&path) {
                Some(Node::Dir) => (FileKind::Directory, S_IFDIR | 0o755, 0),
                Some(Node::File(data)) => (FileKind::Regular, S_IFREG | 0o644, data.len() as u64),
                None => return Err(VfsError::not_found(&path)),
            }
        };
        Ok(Metadata {
            kind,
            mode,
            size,
            mtime: 0,
            atime: 0,
            uid: 0,
            gid: 0,
        })
    }

    fn list_dir(&self, path: &str) -> VfsResult<Vec<String>> {
        let path = path::normalize(path);
        let nodes = self.read_nodes()?;
        if !is_dir(&nodes, &path) {
            return match nodes.get(&path) {
                Some(_) => Err(other_error(&path, "not a directory")),
                None => Err(VfsError::not_found(&path)),
            };
        }
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        let names = nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| {
                let rest = &k[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect();
        Ok(names)
    }

    fn make_dir(&self, path: &str) -> VfsResult<()> {
        let path = path::normalize(path);
        let mut nodes = self.write_nodes()?;
        if path.is_empty() || nodes.contains_key(&path) {
            return Err(VfsError::already_exists(&path));
        }
        if !is_dir(&nodes, path::parent(&path)) {
            return Err(VfsError::not_found(path::parent(&path)));
        }
        nodes.insert(path, Node::Dir);
        Ok(())
    }

    fn create_exclusive(&self, path: &str, data: &[u8]) -> VfsResult<()> {
        let path = path::normalize(path);
        let mut nodes = self.write_nodes()?;
        if path.is_empty() || nodes.contains_key(&path) {
            return Err(VfsError::already_exists(&path));
        }

        let mut ancestors = Vec::new();
        let mut dir = path::parent(&path);
        while !dir.is_empty() {
            match nodes.get(dir) {
                Some(Node::Dir) => break,
                Some(Node::File(_)) => return Err(other_error(dir, "not a directory")),
                None => ancestors.push(dir.to_string()),
            }
            dir = path::parent(dir);
        }
        for dir in ancestors {
            nodes.insert(dir, Node::Dir);
        }
        nodes.insert(path, Node::File(data.to_vec()));
        Ok(())
    }

    fn remove(&self, path: &str) -> VfsResult<()> {
        let path = path::normalize(path);
        let mut nodes = self.write_nodes()?;
        let existing_dir = nodes.get(&path).map(|n| matches!(n, Node::Dir));
        match existing_dir {
            None => Err(VfsError::not_found(&path)),
            Some(true) if has_children(&nodes, &path) => {
                Err(other_error(&path, "directory not empty"))
            }
            Some(_) => {
                nodes.remove(&path);
                Ok(())
            }
        }
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let from = path::normalize(from);
        let to = path::normalize(to);
        let mut nodes = self.write_nodes()?;
        if !nodes.contains_key(&from) {
            return Err(VfsError::not_found(&from));
        }
        if from == to {
            return Ok(());
        }
        if !is_dir(&nodes, path::parent(&to)) {
            return Err(VfsError::not_found(path::parent(&to)));
        }
        if to.starts_with(&format!("{from}/")) {
            return Err(VfsError::InvalidPath {
                path: to,
                reason: "cannot move a directory into itself".into(),
            });
        }
        let existing_dir = nodes.get(&to).map(|n| matches!(n, Node::Dir));
        match existing_dir {
            Some(true) if has_children(&nodes, &to) => {
                return Err(other_error(&to, "directory not empty"));
            }
            Some(_) => {
                nodes.remove(&to);
            }
            None => {}
        }

        for key in subtree(&nodes, &from) {
            if let Some(node) = nodes.remove(&key) {
                let moved = format!("{to}{}", &key[from.len()..]);
                nodes.insert(moved, node);
            }
        }
        Ok(())
    }

    fn read(&self, path: &str) -> VfsResult<Vec<u8>> {
        let path = path::normalize(path);
        let nodes = self.read_nodes()?;
        match nodes.get(&path) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Dir) => Err(other_error(&path, "is a directory")),
            None => Err(VfsError::not_found(&path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> MemoryFs {
        let fs = MemoryFs::new();
        fs.connect().unwrap();
        fs
    }

    #[test]
    fn operations_fail_before_connect() {
        let fs = MemoryFs::new();
        assert!(fs.read("x").unwrap_err().is_connection());
        assert!(fs.create_exclusive("x", b"").unwrap_err().is_connection());
        assert!(!fs.exists(""));
    }

    #[test]
    fn operations_fail_after_close() {
        let fs = connected();
        fs.create_exclusive("x", b"1").unwrap();
        fs.close().unwrap();
        assert!(fs.read("x").unwrap_err().is_connection());
    }

    #[test]
    fn root_always_exists() {
        let fs = connected();
        assert!(fs.is_dir(""));
        assert!(fs.list_dir("").unwrap().is_empty());
    }

    #[test]
    fn create_exclusive_makes_parents() {
        let fs = connected();
        fs.create_exclusive("objects/ab/id1", b"data").unwrap();
        assert!(fs.is_dir("objects"));
        assert!(fs.is_dir("objects/ab"));
        assert_eq!(fs.read("objects/ab/id1").unwrap(), b"data");
        assert!(fs
            .create_exclusive("objects/ab/id1", b"other")
            .unwrap_err()
            .is_already_exists());
    }

    #[test]
    fn list_dir_shows_direct_children_only() {
        let fs = connected();
        fs.create_exclusive("a/x", b"").unwrap();
        fs.create_exclusive("a/b/y", b"").unwrap();
        fs.create_exclusive("a/c", b"").unwrap();
        fs.create_exclusive("ab", b"").unwrap();
        assert_eq!(fs.list_dir("a").unwrap(), vec!["b", "c", "x"]);
        assert_eq!(fs.list_dir("").unwrap(), vec!["a", "ab"]);
        assert!(fs.list_dir("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn make_dir_requires_parent() {
        let fs = connected();
        assert!(fs.make_dir("a/b").unwrap_err().is_not_found());
        fs.make_dir("a").unwrap();
        fs.make_dir("a/b").unwrap();
        assert!(fs.make_dir("a").unwrap_err().is_already_exists());
    }

    #[test]
    fn make_dirs_is_recursive_and_idempotent() {
        let fs = connected();
        fs.make_dirs("a/b/c").unwrap();
        fs.make_dirs("a/b/c").unwrap();
        assert!(fs.is_dir("a/b/c"));
    }

    #[test]
    fn remove_refuses_non_empty_dir() {
        let fs = connected();
        fs.create_exclusive("d/f", b"").unwrap();
        assert!(fs.remove("d").is_err());
        fs.remove("d/f").unwrap();
        fs.remove("d").unwrap();
        assert!(!fs.exists("d"));
    }

    #[test]
    fn rename_replaces_file() {
        let fs = connected();
        fs.create_exclusive("a", b"new").unwrap();
        fs.create_exclusive("b", b"old").unwrap();
        fs.rename("a", "b").unwrap();
        assert_eq!(fs.read("b").unwrap(), b"new");
        assert!(!fs.exists("a"));
    }

    #[test]
    fn rename_moves_subtree() {
        let fs = connected();
        fs.create_exclusive("src/x/y", b"1").unwrap();
        fs.rename("src", "dst").unwrap();
        assert_eq!(fs.read("dst/x/y").unwrap(), b"1");
        assert!(!fs.exists("src/x"));
    }

    #[test]
    fn hard_link_is_unsupported() {
        let fs = connected();
        fs.create_exclusive("a", b"").unwrap();
        assert!(matches!(
            fs.hard_link("a", "b"),
            Err(VfsError::Unsupported {
                operation: "hard_link",
                backend: "memory"
            })
        ));
    }

    #[test]
    fn overwrite_atomic_without_backup() {
        let fs = connected();
        fs.overwrite_atomic("root", b"v1", false).unwrap();
        fs.overwrite_atomic("root", b"v2", false).unwrap();
        assert_eq!(fs.read("root").unwrap(), b"v2");
        assert_eq!(fs.paths(), vec!["root"]);
    }

    #[test]
    fn overwrite_atomic_with_backup() {
        let fs = connected();
        fs.overwrite_atomic("root", b"v1", true).unwrap();
        fs.overwrite_atomic("root", b"v2", true).unwrap();
        assert_eq!(fs.read("root").unwrap(), b"v2");
        assert_eq!(fs.read("root.bak").unwrap(), b"v1");
    }

    #[test]
    fn read_current_falls_back_to_backup() {
        let fs = connected();
        fs.create_exclusive("hosts/web.bak", b"old").unwrap();
        assert_eq!(fs.read_current("hosts/web").unwrap(), b"old");
        assert!(fs.read_current("hosts/db").unwrap_err().is_not_found());
    }

    #[test]
    fn write_temp_names_are_unique() {
        let fs = connected();
        let a = fs.write_temp("hosts", b"1").unwrap();
        let b = fs.write_temp("hosts", b"2").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("hosts/tmp."));
    }

    #[test]
    fn lock_and_unlock() {
        let fs = connected();
        fs.lock("lock").unwrap();
        assert!(matches!(fs.lock("lock"), Err(VfsError::LockHeld { .. })));
        assert_eq!(fs.read("lock").unwrap(), b"");
        fs.unlock("lock").unwrap();
        assert!(!fs.exists("lock"));
        fs.unlock("lock").unwrap();
    }
}

//! Depth-first traversal of a generation's directory tree.

use std::collections::HashSet;

use genvault_store::{Dir, File, FileGroup, Generation, ObjectStore};
use genvault_types::ObjectId;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::{RepoError, RepoResult};

/// One directory of a generation, with its files fully materialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalkEntry {
    pub id: ObjectId,
    pub name: String,
    /// Names joined from the generation root down to this directory.
    pub path: String,
    /// 0 for the root directory.
    pub depth: usize,
    /// Names of the immediate subdirectories, in stored order.
    pub subdirs: Vec<String>,
    /// Contents of every file group of the directory, in stored order.
    pub files: Vec<File>,
}

struct Pending {
    dir: Dir,
    path: String,
    depth: usize,
}

/// Lazy iterator over the directories of one generation.
///
/// Yields parents before children and siblings in stored order. Each walker
/// is a fresh traversal; it cannot be restarted. A directory reached twice
/// yields [`RepoError::Cycle`], and nesting beyond the depth limit yields
/// [`RepoError::TooDeep`]. After the first error the iterator is exhausted.
pub struct Walker<'a> {
    store: &'a ObjectStore,
    root: Option<ObjectId>,
    stack: Vec<Pending>,
    visited: HashSet<ObjectId>,
    max_depth: usize,
    cancel: Option<CancelToken>,
    done: bool,
}

impl<'a> Walker<'a> {
    pub fn new(store: &'a ObjectStore, generation: &Generation) -> Self {
        Self {
            store,
            root: Some(generation.root.clone()),
            stack: Vec::new(),
            visited: HashSet::new(),
            max_depth: usize::MAX,
            cancel: None,
            done: false,
        }
    }

    /// Deepest directory level to descend to; the root is level 0.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn load_dir(&mut self, id: &ObjectId, depth: usize) -> RepoResult<Dir> {
        if depth > self.max_depth {
            return Err(RepoError::TooDeep {
                id: id.clone(),
                limit: self.max_depth,
            });
        }
        if !self.visited.insert(id.clone()) {
            return Err(RepoError::Cycle(id.clone()));
        }
        Ok(self.store.get::<Dir>(id)?)
    }

    fn advance(&mut self) -> RepoResult<Option<WalkEntry>> {
        if let Some(cancel) = &self.cancel {
            cancel.check()?;
        }
        if let Some(root) = self.root.take() {
            let dir = self.load_dir(&root, 0)?;
            let path = dir.name.clone();
            self.stack.push(Pending { dir, path, depth: 0 });
        }
        let Some(Pending { dir, path, depth }) = self.stack.pop() else {
            return Ok(None);
        };

        let mut files = Vec::new();
        for fgref in &dir.fgrefs {
            let group: FileGroup = self.store.get(fgref)?;
            files.extend(group.files);
        }

        let mut children = Vec::with_capacity(dir.dirrefs.len());
        for dirref in &dir.dirrefs {
            children.push(self.load_dir(dirref, depth + 1)?);
        }
        let subdirs = children.iter().map(|c| c.name.clone()).collect();
        for child in children.into_iter().rev() {
            let child_path = join_path(&path, &child.name);
            self.stack.push(Pending {
                dir: child,
                path: child_path,
                depth: depth + 1,
            });
        }

        debug!(dir = %dir.id.short(), path = %path, files = files.len(), "walked directory");
        Ok(Some(WalkEntry {
            id: dir.id,
            name: dir.name,
            path,
            depth,
            subdirs,
            files,
        }))
    }
}

impl Iterator for Walker<'_> {
    type Item = RepoResult<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

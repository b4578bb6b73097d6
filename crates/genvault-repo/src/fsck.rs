//! Repository consistency checking.
//!
//! The checker walks root → hosts → generations → directories → file groups
//! and tries to resolve every reference on the way. A reference that does not
//! resolve is recorded as a [`Problem`] and the walk carries on with its
//! siblings, so one run reports everything it can reach. Only a lost
//! connection or cancellation stops the run early.

use std::collections::{HashMap, HashSet};
use std::fmt;

use genvault_store::{Dir, FieldKind, FileGroup, Generation, ObjectStore, StoreError};
use genvault_types::ObjectId;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::{RepoError, RepoResult};

/// What went wrong with one reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    /// Nothing is stored under the identifier.
    Missing,
    /// Bytes exist but do not decode as the expected object.
    Corrupt,
    /// The backend refused to read it.
    Unreadable,
    /// A directory is reachable twice within one generation.
    Cycle,
    /// A generation is listed more than once.
    DuplicateGeneration,
    /// The tree is nested deeper than the configured limit.
    TooDeep,
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Missing => "missing",
            Self::Corrupt => "corrupt",
            Self::Unreadable => "unreadable",
            Self::Cycle => "cycle",
            Self::DuplicateGeneration => "duplicate generation",
            Self::TooDeep => "too deep",
        };
        f.write_str(s)
    }
}

/// One failing reference: what it points at, who holds it, and through
/// which field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Problem {
    pub id: String,
    /// Holder of the reference; `None` for the root node itself.
    pub parent: Option<String>,
    pub field: Option<FieldKind>,
    pub kind: ProblemKind,
    pub detail: String,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)?;
        if let Some(parent) = &self.parent {
            write!(f, " (referenced by {parent}")?;
            if let Some(field) = self.field {
                write!(f, " via {field}")?;
            }
            write!(f, ")")?;
        }
        write!(f, ": {}", self.detail)
    }
}

/// Summary of a check run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FsckReport {
    pub hosts_checked: usize,
    pub generations_checked: usize,
    pub dirs_checked: usize,
    pub file_groups_checked: usize,
    pub files_seen: usize,
    pub problems: Vec<Problem>,
}

/// Terminal state of a check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FsckOutcome {
    Clean,
    Inconsistent(Vec<Problem>),
}

impl FsckReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn outcome(&self) -> FsckOutcome {
        if self.is_clean() {
            FsckOutcome::Clean
        } else {
            FsckOutcome::Inconsistent(self.problems.clone())
        }
    }
}

/// Sort a store failure into a problem kind, or hand it back if it should
/// end the run.
fn classify(err: StoreError) -> Result<(ProblemKind, String), RepoError> {
    if err.is_connection() {
        return Err(err.into());
    }
    let kind = if err.is_not_found() {
        ProblemKind::Missing
    } else if err.is_corrupt() {
        ProblemKind::Corrupt
    } else {
        ProblemKind::Unreadable
    };
    Ok((kind, err.to_string()))
}

struct PendingDir {
    id: ObjectId,
    parent: String,
    depth: usize,
}

/// Consistency checker over one repository.
pub struct Checker<'a> {
    store: &'a ObjectStore,
    observer: Box<dyn FnMut(&str) + 'a>,
    max_depth: usize,
    cancel: Option<CancelToken>,
    report: FsckReport,
    generation_owner: HashMap<ObjectId, String>,
}

impl<'a> Checker<'a> {
    pub fn new(store: &'a ObjectStore) -> Self {
        Self {
            store,
            observer: Box::new(|_| {}),
            max_depth: usize::MAX,
            cancel: None,
            report: FsckReport::default(),
            generation_owner: HashMap::new(),
        }
    }

    /// Receive a status line before each object is checked.
    pub fn with_observer(mut self, observer: impl FnMut(&str) + 'a) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn status(&mut self, message: String) {
        debug!("{message}");
        (self.observer)(&message);
    }

    fn checkpoint(&self) -> RepoResult<()> {
        match &self.cancel {
            Some(cancel) => cancel.check(),
            None => Ok(()),
        }
    }

    fn record(
        &mut self,
        id: impl Into<String>,
        parent: Option<&str>,
        field: Option<FieldKind>,
        kind: ProblemKind,
        detail: String,
    ) {
        let problem = Problem {
            id: id.into(),
            parent: parent.map(str::to_string),
            field,
            kind,
            detail,
        };
        warn!(problem = %problem, "fsck problem");
        self.report.problems.push(problem);
    }

    /// Check the whole repository.
    pub fn check(mut self) -> RepoResult<FsckReport> {
        self.status("Checking root node".into());
        let root = match self.store.get_root() {
            Ok(root) => root,
            Err(e) => {
                let (kind, detail) = classify(e)?;
                self.record("root", None, None, kind, detail);
                return Ok(self.report);
            }
        };
        for hostname in &root.hosts {
            self.check_host(hostname)?;
        }
        Ok(self.report)
    }

    /// Check a single host and everything below it.
    pub fn check_single_host(mut self, hostname: &str) -> RepoResult<FsckReport> {
        self.check_host(hostname)?;
        Ok(self.report)
    }

    fn check_host(&mut self, hostname: &str) -> RepoResult<()> {
        self.checkpoint()?;
        self.status(format!("Checking host {hostname}"));
        let host = match self.store.get_host(hostname) {
            Ok(host) => host,
            Err(e) => {
                let (kind, detail) = classify(e)?;
                self.record(hostname, Some("root"), Some(FieldKind::HostId), kind, detail);
                return Ok(());
            }
        };
        self.report.hosts_checked += 1;
        for generation in &host.generations {
            self.check_generation(hostname, generation)?;
        }
        Ok(())
    }

    fn check_generation(&mut self, hostname: &str, id: &ObjectId) -> RepoResult<()> {
        self.checkpoint()?;
        self.status(format!("Checking generation {id}"));
        if let Some(owner) = self.generation_owner.get(id) {
            let detail = format!("already listed by host {owner}");
            self.record(
                id.as_str(),
                Some(hostname),
                Some(FieldKind::GenRef),
                ProblemKind::DuplicateGeneration,
                detail,
            );
            return Ok(());
        }
        self.generation_owner
            .insert(id.clone(), hostname.to_string());

        let generation: Generation = match self.store.get(id) {
            Ok(generation) => generation,
            Err(e) => {
                let (kind, detail) = classify(e)?;
                self.record(id.as_str(), Some(hostname), Some(FieldKind::GenRef), kind, detail);
                return Ok(());
            }
        };
        self.report.generations_checked += 1;
        self.check_tree(&generation)
    }

    fn check_tree(&mut self, generation: &Generation) -> RepoResult<()> {
        let mut visited = HashSet::new();
        let mut stack = vec![PendingDir {
            id: generation.root.clone(),
            parent: generation.id.to_string(),
            depth: 0,
        }];

        while let Some(PendingDir { id, parent, depth }) = stack.pop() {
            self.checkpoint()?;
            if depth > self.max_depth {
                let detail = format!("deeper than {} levels", self.max_depth);
                self.record(id.as_str(), Some(parent.as_str()), Some(FieldKind::DirRef), ProblemKind::TooDeep, detail);
                continue;
            }
            if !visited.insert(id.clone()) {
                self.record(
                    id.as_str(),
                    Some(parent.as_str()),
                    Some(FieldKind::DirRef),
                    ProblemKind::Cycle,
                    "directory reached more than once".into(),
                );
                continue;
            }

            self.status(format!("Checking directory {id}"));
            let dir: Dir = match self.store.get(&id) {
                Ok(dir) => dir,
                Err(e) => {
                    let (kind, detail) = classify(e)?;
                    self.record(id.as_str(), Some(parent.as_str()), Some(FieldKind::DirRef), kind, detail);
                    continue;
                }
            };
            self.report.dirs_checked += 1;

            for fgref in &dir.fgrefs {
                self.checkpoint()?;
                match self.store.get::<FileGroup>(fgref) {
                    Ok(group) => {
                        self.report.file_groups_checked += 1;
                        self.report.files_seen += group.files.len();
                    }
                    Err(e) => {
                        let (kind, detail) = classify(e)?;
                        self.record(
                            fgref.as_str(),
                            Some(dir.id.as_str()),
                            Some(FieldKind::FileGroupRef),
                            kind,
                            detail,
                        );
                    }
                }
            }

            for dirref in dir.dirrefs.iter().rev() {
                stack.push(PendingDir {
                    id: dirref.clone(),
                    parent: dir.id.to_string(),
                    depth: depth + 1,
                });
            }
        }
        Ok(())
    }
}

//! Repository-level operations for genvault.
//!
//! [`Repository`] ties a connected [`genvault_vfs::Vfs`] and an
//! [`genvault_store::ObjectStore`] to a [`Config`], and exposes the
//! operations a client runs against a repository: initializing it, backing
//! up a directory tree as a new generation, listing and resolving
//! generations, walking a generation, checking consistency, and forgetting
//! generations.
//!
//! # Modules
//!
//! - [`error`] -- [`RepoError`]
//! - [`config`] -- TOML configuration
//! - [`cancel`] -- [`CancelToken`] for long traversals
//! - [`spec`] -- [`GenerationSpec`] parsing and resolution
//! - [`backup`] -- [`BackupSession`] and the local directory scan
//! - [`walker`] -- Depth-first generation [`Walker`]
//! - [`fsck`] -- Consistency [`Checker`]
//! - [`repository`] -- The [`Repository`] facade

pub mod backup;
pub mod cancel;
pub mod config;
pub mod error;
pub mod fsck;
pub mod repository;
pub mod spec;
pub mod walker;

pub use backup::{BackupSession, BackupStats};
pub use cancel::CancelToken;
pub use config::{local_hostname, Compression, Config};
pub use error::{RepoError, RepoResult};
pub use fsck::{Checker, FsckOutcome, FsckReport, Problem, ProblemKind};
pub use repository::Repository;
pub use spec::GenerationSpec;
pub use walker::{WalkEntry, Walker};

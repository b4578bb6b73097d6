//! Virtual filesystem layer for genvault repositories.
//!
//! A repository never touches a transport directly. Everything it stores goes
//! through the [`Vfs`] trait, which exposes a small set of primitives and
//! builds the repository-level guarantees on top of them.
//!
//! # Architecture
//!
//! - **Primitives** (`stat`, `list_dir`, `make_dir`, `create_exclusive`,
//!   `remove`, `rename`, `read`) are what a backend implements.
//! - **Atomic overwrite** writes a temp file and swaps it in with two
//!   renames, leaving a `.bak` copy that readers fall back to if the swap
//!   was interrupted.
//! - **Locks** are empty files created exclusively; [`LockGuard`] releases
//!   them on drop.
//!
//! # Modules
//!
//! - [`error`] -- [`VfsError`] and native error translation
//! - [`traits`] -- The [`Vfs`] trait and its provided operations
//! - [`local`] -- [`LocalFs`], a directory on the local filesystem
//! - [`memory`] -- [`MemoryFs`] for tests
//! - [`crash`] -- [`CrashingFs`] fault injection
//! - [`lock`] -- [`LockGuard`]
//! - [`path`] -- `/`-separated path helpers

pub mod crash;
pub mod error;
pub mod local;
pub mod lock;
pub mod memory;
pub mod metadata;
pub mod path;
pub mod traits;

pub use crash::CrashingFs;
pub use error::{translate_io, VfsError, VfsResult};
pub use local::LocalFs;
pub use lock::LockGuard;
pub use memory::MemoryFs;
pub use metadata::{FileKind, Metadata};
pub use traits::Vfs;

//! Object storage for genvault.
//!
//! This crate turns the snapshot tree (root, hosts, generations,
//! directories, file groups) into bytes and back, and keeps those bytes in a
//! repository reached through [`genvault_vfs::Vfs`].
//!
//! # Architecture
//!
//! - **Fields** are `(kind, value)` pairs; every stored object is an ordered
//!   field list, so a generic decoder can read any object and a validator can
//!   pull out "all strings of kind K" without the full schema.
//! - **Records** wrap an encoded field list with a magic, a version, the
//!   object type and a CRC32 of the body.
//! - **Entities** are typed views over field lists. References are plain
//!   identifiers resolved on demand through [`ObjectStore::get`].
//! - **Transforms** (such as zstd) run over the encoded record before it
//!   reaches the filesystem.
//!
//! # Modules
//!
//! - [`error`] -- [`StoreError`] and [`CodecError`]
//! - [`field`] -- [`FieldKind`], [`Value`], [`Field`], and projections
//! - [`codec`] -- Binary record encoding
//! - [`object`] -- [`Root`], [`Host`], [`Generation`], [`Dir`], [`FileGroup`], [`File`]
//! - [`transform`] -- The [`Transform`] trait and [`ZstdTransform`]
//! - [`layout`] -- Repository paths
//! - [`store`] -- [`ObjectStore`]

pub mod codec;
pub mod error;
pub mod field;
pub mod layout;
pub mod object;
pub mod store;
pub mod transform;

pub use error::{CodecError, CodecResult, StoreError, StoreResult};
pub use field::{find_composites, find_ints, find_strings, first_string, Field, FieldKind, Value};
pub use object::{Addressable, Dir, Encodable, File, FileGroup, Generation, Host, ObjectType, Root};
pub use store::{ObjectStore, DEFAULT_MAX_OBJECT_SIZE};
pub use transform::{Transform, ZstdTransform};

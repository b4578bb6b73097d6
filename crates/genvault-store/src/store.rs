use std::sync::Arc;
use std::time::Duration;

use genvault_types::{validate_host_name, ObjectId};
use genvault_vfs::{LockGuard, Vfs};
use tracing::debug;

use crate::codec::{decode_object, encode_object};
use crate::error::{StoreError, StoreResult};
use crate::field::Field;
use crate::layout::{host_path, object_path, LOCK_PATH, ROOT_PATH};
use crate::object::{Addressable, Encodable, Host, ObjectType, Root};
use crate::transform::{Transform, MAX_DECODED_SIZE};

/// Default cap on an encoded object, matching what a compressing transform
/// will inflate on read.
pub const DEFAULT_MAX_OBJECT_SIZE: usize = MAX_DECODED_SIZE as usize;

/// Object repository on top of a [`Vfs`].
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written: `put` uses exclusive creation and
///   an existing identifier is never overwritten.
/// - `put` of an identifier that already exists succeeds without touching
///   the stored bytes. With strict put enabled the bytes are compared first
///   and a mismatch is an [`StoreError::IdCollision`].
/// - No caching: every `get` re-reads and re-decodes.
/// - The root and host lists are the only mutable state and are replaced
///   with the VFS atomic overwrite.
/// - No encoded object exceeds the size cap, with or without transforms, so
///   turning compression on never makes a writable object unreadable.
pub struct ObjectStore {
    vfs: Arc<dyn Vfs>,
    transforms: Vec<Box<dyn Transform>>,
    strict_put: bool,
    max_object_size: usize,
}

impl ObjectStore {
    pub fn new(vfs: Arc<dyn Vfs>) -> Self {
        Self {
            vfs,
            transforms: Vec::new(),
            strict_put: false,
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
        }
    }

    /// Append a byte transform. Transforms run in insertion order on write.
    pub fn with_transform(mut self, transform: Box<dyn Transform>) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn with_strict_put(mut self, strict: bool) -> Self {
        self.strict_put = strict;
        self
    }

    /// Lower the encoded object size cap. Values above
    /// [`DEFAULT_MAX_OBJECT_SIZE`] are clamped to it.
    pub fn with_max_object_size(mut self, limit: usize) -> Self {
        self.max_object_size = limit.min(DEFAULT_MAX_OBJECT_SIZE);
        self
    }

    pub fn vfs(&self) -> &Arc<dyn Vfs> {
        &self.vfs
    }

    // -----------------------------------------------------------------------
    // Byte pipeline
    // -----------------------------------------------------------------------

    fn encode<T: Encodable>(&self, value: &T) -> StoreResult<Vec<u8>> {
        let plain = encode_object(T::TYPE, &value.prepare_for_encoding())?;
        if plain.len() > self.max_object_size {
            return Err(StoreError::ObjectTooLarge {
                object_type: T::TYPE,
                size: plain.len(),
                limit: self.max_object_size,
            });
        }
        Ok(plain)
    }

    fn seal(&self, plain: Vec<u8>) -> StoreResult<Vec<u8>> {
        self.transforms
            .iter()
            .try_fold(plain, |data, t| t.to_store(&data))
    }

    fn unseal(&self, stored: Vec<u8>) -> StoreResult<Vec<u8>> {
        self.transforms
            .iter()
            .rev()
            .try_fold(stored, |data, t| t.from_store(&data))
    }

    fn open(&self, label: &str, stored: Vec<u8>) -> StoreResult<(ObjectType, Vec<Field>)> {
        let plain = self.unseal(stored)?;
        decode_object(&plain).map_err(|e| StoreError::CorruptObject {
            id: label.to_string(),
            reason: e.to_string(),
        })
    }

    fn typed<T: Encodable>(&self, label: &str, stored: Vec<u8>) -> StoreResult<T> {
        let (found, fields) = self.open(label, stored)?;
        if found != T::TYPE {
            return Err(StoreError::WrongType {
                id: label.to_string(),
                expected: T::TYPE,
                found,
            });
        }
        T::from_fields(&fields).map_err(|e| StoreError::CorruptObject {
            id: label.to_string(),
            reason: e.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Addressed objects
    // -----------------------------------------------------------------------

    /// Read the raw fields of an object without interpreting them.
    pub fn get_fields(&self, id: &ObjectId) -> StoreResult<(ObjectType, Vec<Field>)> {
        let stored = self.read_object(id)?;
        self.open(id.as_str(), stored)
    }

    fn read_object(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        match self.vfs.read(&object_path(id)) {
            Ok(data) => Ok(data),
            Err(e) if e.is_not_found() => Err(StoreError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Materialize the object stored under `id` as a `T`.
    pub fn get<T: Addressable>(&self, id: &ObjectId) -> StoreResult<T> {
        let stored = self.read_object(id)?;
        let object: T = self.typed(id.as_str(), stored)?;
        if object.id() != id {
            return Err(StoreError::CorruptObject {
                id: id.to_string(),
                reason: format!("record claims identifier {}", object.id()),
            });
        }
        Ok(object)
    }

    /// Store an object under its identifier and return the identifier.
    pub fn put<T: Addressable>(&self, object: &T) -> StoreResult<ObjectId> {
        let id = object.id().clone();
        let plain = self.encode(object)?;
        let stored = self.seal(plain.clone())?;
        let path = object_path(&id);

        match self.vfs.create_exclusive(&path, &stored) {
            Ok(()) => {
                let object_type = T::TYPE.name();
                debug!(id = %id.short(), object_type, bytes = stored.len(), "stored object");
                Ok(id)
            }
            Err(e) if e.is_already_exists() => {
                if self.strict_put {
                    let existing = self.unseal(self.vfs.read(&path)?)?;
                    if existing != plain {
                        return Err(StoreError::IdCollision(id));
                    }
                }
                debug!(id = %id.short(), "object already stored");
                Ok(id)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, id: &ObjectId) -> bool {
        self.vfs.exists(&object_path(id))
    }

    /// Delete an object. Deleting an absent object is a no-op.
    pub fn remove(&self, id: &ObjectId) -> StoreResult<()> {
        match self.vfs.remove(&object_path(id)) {
            Ok(()) => {
                debug!(id = %id.short(), "removed object");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Root and host lists
    // -----------------------------------------------------------------------

    fn read_named(&self, path: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.vfs.read_current(path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_named<T: Encodable>(&self, path: &str, value: &T) -> StoreResult<()> {
        let plain = self.encode(value)?;
        let stored = self.seal(plain)?;
        self.vfs.overwrite_atomic(path, &stored, true)?;
        Ok(())
    }

    /// The host list. A repository with no root yet has no hosts.
    pub fn get_root(&self) -> StoreResult<Root> {
        match self.read_named(ROOT_PATH)? {
            Some(stored) => self.typed(ROOT_PATH, stored),
            None => Ok(Root::default()),
        }
    }

    pub fn put_root(&self, root: &Root) -> StoreResult<()> {
        self.write_named(ROOT_PATH, root)?;
        debug!(hosts = root.hosts.len(), "wrote root");
        Ok(())
    }

    pub fn get_host(&self, hostname: &str) -> StoreResult<Host> {
        validate_host_name(hostname)?;
        let path = host_path(hostname);
        let stored = self
            .read_named(&path)?
            .ok_or_else(|| StoreError::NotFound(path.clone()))?;
        let host: Host = self.typed(&path, stored)?;
        if host.hostname != hostname {
            return Err(StoreError::CorruptObject {
                id: path,
                reason: format!("record names host {:?}", host.hostname),
            });
        }
        Ok(host)
    }

    pub fn put_host(&self, host: &Host) -> StoreResult<()> {
        validate_host_name(&host.hostname)?;
        self.write_named(&host_path(&host.hostname), host)?;
        debug!(host = %host.hostname, generations = host.generations.len(), "wrote host");
        Ok(())
    }

    /// Host identifiers listed in the root.
    pub fn list_hosts(&self) -> StoreResult<Vec<String>> {
        Ok(self.get_root()?.hosts)
    }

    /// Generation identifiers of one host, oldest first.
    pub fn list_generations(&self, hostname: &str) -> StoreResult<Vec<ObjectId>> {
        Ok(self.get_host(hostname)?.generations)
    }

    // -----------------------------------------------------------------------
    // Locking
    // -----------------------------------------------------------------------

    /// Take the repository lock, failing at once if it is held.
    pub fn lock(&self) -> StoreResult<LockGuard> {
        Ok(LockGuard::acquire(self.vfs.clone(), LOCK_PATH)?)
    }

    /// Take the repository lock, waiting up to `timeout` for it.
    pub fn lock_with_timeout(&self, timeout: Duration) -> StoreResult<LockGuard> {
        Ok(LockGuard::acquire_with_timeout(
            self.vfs.clone(),
            LOCK_PATH,
            timeout,
        )?)
    }
}

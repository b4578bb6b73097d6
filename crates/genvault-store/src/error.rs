use genvault_types::{ObjectId, TypeError};
use genvault_vfs::VfsError;

use crate::field::FieldKind;
use crate::object::ObjectType;

/// Errors from decoding or encoding the tagged-field record format.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("bad magic")]
    BadMagic,

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown object type tag {0}")]
    UnknownObjectType(u8),

    #[error("body length mismatch: header says {declared}, found {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("checksum mismatch: header {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    #[error("unknown field kind tag {0}")]
    UnknownFieldKind(u8),

    #[error("unknown value tag {0}")]
    UnknownValueTag(u8),

    #[error("integer payload must be 8 bytes, got {0}")]
    BadInteger(usize),

    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("fields nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("payload of {0} bytes does not fit the length prefix")]
    TooLarge(usize),

    #[error("{object_type} object is missing its {kind} field")]
    MissingField {
        object_type: &'static str,
        kind: FieldKind,
    },

    #[error("{kind} field may appear at most once")]
    DuplicateField { kind: FieldKind },

    #[error("{object_type} object may not contain a {kind} field")]
    UnexpectedField {
        object_type: &'static str,
        kind: FieldKind,
    },

    #[error("invalid {kind} value: {reason}")]
    InvalidValue { kind: FieldKind, reason: String },
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Nothing is stored under the identifier or path.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The stored bytes could not be decoded as the expected object.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: String, reason: String },

    /// An object was read back under a different type than requested.
    #[error("object {id} is a {found}, expected a {expected}")]
    WrongType {
        id: String,
        expected: ObjectType,
        found: ObjectType,
    },

    /// Strict put found different bytes already stored under the identifier.
    #[error("identifier {0} already holds different content")]
    IdCollision(ObjectId),

    /// An encoded object is larger than the store accepts.
    #[error("encoded {object_type} object is {size} bytes, limit is {limit}")]
    ObjectTooLarge {
        object_type: ObjectType,
        size: usize,
        limit: usize,
    },

    /// A byte transform failed.
    #[error("{name} transform failed: {reason}")]
    Transform { name: &'static str, reason: String },

    /// An object could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] CodecError),

    /// Failure from the underlying filesystem.
    #[error(transparent)]
    Vfs(#[from] VfsError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Decode-side failures: the bytes exist but are not a usable object.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            Self::CorruptObject { .. } | Self::WrongType { .. } | Self::Transform { .. }
        )
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Vfs(e) if e.is_connection())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

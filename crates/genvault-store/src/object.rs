//! Snapshot tree entities.
//!
//! Each entity is a typed view over a field list. [`Encodable`] flattens an
//! entity into fields (`prepare_for_encoding`) and rebuilds it
//! (`from_fields`); references to children are plain identifiers that the
//! caller resolves through the store when it needs them.

use std::fmt;

use chrono::{DateTime, Utc};
use genvault_types::ObjectId;
use serde::Serialize;

use crate::error::{CodecError, CodecResult};
use crate::field::{Field, FieldKind};

/// Type tag written into every record header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ObjectType {
    Root = 1,
    Host = 2,
    Generation = 3,
    Dir = 4,
    FileGroup = 5,
}

impl ObjectType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Root),
            2 => Some(Self::Host),
            3 => Some(Self::Generation),
            4 => Some(Self::Dir),
            5 => Some(Self::FileGroup),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Host => "host",
            Self::Generation => "generation",
            Self::Dir => "dir",
            Self::FileGroup => "filegroup",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An entity that can be flattened to fields and rebuilt from them.
pub trait Encodable: Sized {
    const TYPE: ObjectType;

    /// Flatten attributes into kinded fields. Reference lists become
    /// repeated fields of a kind specific to the target type.
    fn prepare_for_encoding(&self) -> Vec<Field>;

    /// Rebuild the entity, rejecting kinds the type does not allow.
    fn from_fields(fields: &[Field]) -> CodecResult<Self>;
}

/// An entity stored under its own identifier in the object area.
pub trait Addressable: Encodable {
    fn id(&self) -> &ObjectId;
}

// ---------------------------------------------------------------------------
// Field access helpers
// ---------------------------------------------------------------------------

fn check_kinds(object_type: &'static str, fields: &[Field], allowed: &[FieldKind]) -> CodecResult<()> {
    match fields.iter().find(|f| !allowed.contains(&f.kind)) {
        Some(f) => Err(CodecError::UnexpectedField {
            object_type,
            kind: f.kind,
        }),
        None => Ok(()),
    }
}

fn optional<'a>(fields: &'a [Field], kind: FieldKind) -> CodecResult<Option<&'a Field>> {
    let mut matching = fields.iter().filter(|f| f.kind == kind);
    let first = matching.next();
    if matching.next().is_some() {
        return Err(CodecError::DuplicateField { kind });
    }
    Ok(first)
}

fn required<'a>(object_type: &'static str, fields: &'a [Field], kind: FieldKind) -> CodecResult<&'a Field> {
    optional(fields, kind)?.ok_or(CodecError::MissingField { object_type, kind })
}

fn string_of(field: &Field) -> CodecResult<&str> {
    field.as_str().ok_or_else(|| CodecError::InvalidValue {
        kind: field.kind,
        reason: "expected a string".into(),
    })
}

fn int_of(field: &Field) -> CodecResult<i64> {
    field.as_int().ok_or_else(|| CodecError::InvalidValue {
        kind: field.kind,
        reason: "expected an integer".into(),
    })
}

fn id_of(field: &Field) -> CodecResult<ObjectId> {
    ObjectId::new(string_of(field)?).map_err(|e| CodecError::InvalidValue {
        kind: field.kind,
        reason: e.to_string(),
    })
}

fn ids(fields: &[Field], kind: FieldKind) -> CodecResult<Vec<ObjectId>> {
    fields.iter().filter(|f| f.kind == kind).map(id_of).collect()
}

/// Push a timestamp as whole seconds plus, when non-zero, a separate
/// nanoseconds field.
fn push_timestamp(fields: &mut Vec<Field>, secs: FieldKind, nanos: FieldKind, t: DateTime<Utc>) {
    fields.push(Field::int(secs, t.timestamp()));
    let sub = t.timestamp_subsec_nanos();
    if sub != 0 {
        fields.push(Field::int(nanos, i64::from(sub)));
    }
}

fn timestamp_of(field: &Field, nanos: Option<&Field>) -> CodecResult<DateTime<Utc>> {
    let secs = int_of(field)?;
    let sub = nanos.map(narrow::<u32>).transpose()?.unwrap_or(0);
    DateTime::from_timestamp(secs, sub).ok_or_else(|| CodecError::InvalidValue {
        kind: field.kind,
        reason: format!("timestamp {secs}.{sub:09} out of range"),
    })
}

fn narrow<T: TryFrom<i64>>(field: &Field) -> CodecResult<T> {
    let n = int_of(field)?;
    T::try_from(n).map_err(|_| CodecError::InvalidValue {
        kind: field.kind,
        reason: format!("{n} out of range"),
    })
}

// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

/// Metadata of one file, stored inline in a [`FileGroup`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct File {
    pub name: String,
    /// Full `st_mode`, type bits included.
    pub mode: u32,
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub mtime: i64,
    pub uid: u32,
    pub gid: u32,
    /// Link target, for symlinks.
    pub target: Option<String>,
}

impl File {
    /// A file entry with only a name; all metadata zeroed.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: 0,
            size: 0,
            mtime: 0,
            uid: 0,
            gid: 0,
            target: None,
        }
    }

    fn to_fields(&self) -> Vec<Field> {
        let mut fields = vec![
            Field::string(FieldKind::FileName, &self.name),
            Field::int(FieldKind::Mode, i64::from(self.mode)),
            // Stored as the same 64 bits; sizes past i64::MAX read back negative.
            Field::int(FieldKind::Size, self.size as i64),
            Field::int(FieldKind::Mtime, self.mtime),
            Field::int(FieldKind::Uid, i64::from(self.uid)),
            Field::int(FieldKind::Gid, i64::from(self.gid)),
        ];
        if let Some(target) = &self.target {
            fields.push(Field::string(FieldKind::Target, target));
        }
        fields
    }

    fn from_entry(fields: &[Field]) -> CodecResult<Self> {
        const OBJECT: &str = "file";
        check_kinds(
            OBJECT,
            fields,
            &[
                FieldKind::FileName,
                FieldKind::Mode,
                FieldKind::Size,
                FieldKind::Mtime,
                FieldKind::Uid,
                FieldKind::Gid,
                FieldKind::Target,
            ],
        )?;
        Ok(Self {
            name: string_of(required(OBJECT, fields, FieldKind::FileName)?)?.to_string(),
            mode: optional(fields, FieldKind::Mode)?
                .map(narrow::<u32>)
                .transpose()?
                .unwrap_or(0),
            size: optional(fields, FieldKind::Size)?
                .map(int_of)
                .transpose()?
                .map_or(0, |n| n as u64),
            mtime: optional(fields, FieldKind::Mtime)?
                .map(int_of)
                .transpose()?
                .unwrap_or(0),
            uid: optional(fields, FieldKind::Uid)?
                .map(narrow::<u32>)
                .transpose()?
                .unwrap_or(0),
            gid: optional(fields, FieldKind::Gid)?
                .map(narrow::<u32>)
                .transpose()?
                .unwrap_or(0),
            target: optional(fields, FieldKind::Target)?
                .map(|f| string_of(f).map(str::to_string))
                .transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// FileGroup
// ---------------------------------------------------------------------------

/// A batch of file entries belonging to one directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileGroup {
    pub id: ObjectId,
    pub files: Vec<File>,
}

impl FileGroup {
    pub fn new(id: ObjectId, files: Vec<File>) -> Self {
        Self { id, files }
    }
}

impl Encodable for FileGroup {
    const TYPE: ObjectType = ObjectType::FileGroup;

    fn prepare_for_encoding(&self) -> Vec<Field> {
        let mut fields = vec![Field::string(FieldKind::Id, self.id.as_str())];
        fields.extend(
            self.files
                .iter()
                .map(|file| Field::composite(FieldKind::File, file.to_fields())),
        );
        fields
    }

    fn from_fields(fields: &[Field]) -> CodecResult<Self> {
        const OBJECT: &str = "filegroup";
        check_kinds(OBJECT, fields, &[FieldKind::Id, FieldKind::File])?;
        let id = id_of(required(OBJECT, fields, FieldKind::Id)?)?;
        let files = fields
            .iter()
            .filter(|f| f.kind == FieldKind::File)
            .map(|f| {
                let entry = f.as_composite().ok_or_else(|| CodecError::InvalidValue {
                    kind: FieldKind::File,
                    reason: "expected a composite".into(),
                })?;
                File::from_entry(entry)
            })
            .collect::<CodecResult<Vec<_>>>()?;
        Ok(Self { id, files })
    }
}

impl Addressable for FileGroup {
    fn id(&self) -> &ObjectId {
        &self.id
    }
}

// ---------------------------------------------------------------------------
// Dir
// ---------------------------------------------------------------------------

/// A directory node: its name plus ordered references to subdirectories and
/// file groups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dir {
    pub id: ObjectId,
    pub name: String,
    pub dirrefs: Vec<ObjectId>,
    pub fgrefs: Vec<ObjectId>,
}

impl Dir {
    pub fn new(
        id: ObjectId,
        name: impl Into<String>,
        dirrefs: Vec<ObjectId>,
        fgrefs: Vec<ObjectId>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            dirrefs,
            fgrefs,
        }
    }
}

impl Encodable for Dir {
    const TYPE: ObjectType = ObjectType::Dir;

    fn prepare_for_encoding(&self) -> Vec<Field> {
        let mut fields = vec![
            Field::string(FieldKind::Id, self.id.as_str()),
            Field::string(FieldKind::FileName, &self.name),
        ];
        fields.extend(
            self.dirrefs
                .iter()
                .map(|r| Field::string(FieldKind::DirRef, r.as_str())),
        );
        fields.extend(
            self.fgrefs
                .iter()
                .map(|r| Field::string(FieldKind::FileGroupRef, r.as_str())),
        );
        fields
    }

    fn from_fields(fields: &[Field]) -> CodecResult<Self> {
        const OBJECT: &str = "dir";
        check_kinds(
            OBJECT,
            fields,
            &[
                FieldKind::Id,
                FieldKind::FileName,
                FieldKind::DirRef,
                FieldKind::FileGroupRef,
            ],
        )?;
        Ok(Self {
            id: id_of(required(OBJECT, fields, FieldKind::Id)?)?,
            name: string_of(required(OBJECT, fields, FieldKind::FileName)?)?.to_string(),
            dirrefs: ids(fields, FieldKind::DirRef)?,
            fgrefs: ids(fields, FieldKind::FileGroupRef)?,
        })
    }
}

impl Addressable for Dir {
    fn id(&self) -> &ObjectId {
        &self.id
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// One snapshot of a host: when it was taken and its root directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Generation {
    pub id: ObjectId,
    pub started: DateTime<Utc>,
    pub ended: Option<DateTime<Utc>>,
    pub root: ObjectId,
}

impl Generation {
    pub fn new(id: ObjectId, started: DateTime<Utc>, root: ObjectId) -> Self {
        Self {
            id,
            started,
            ended: None,
            root,
        }
    }
}

impl Encodable for Generation {
    const TYPE: ObjectType = ObjectType::Generation;

    fn prepare_for_encoding(&self) -> Vec<Field> {
        let mut fields = vec![Field::string(FieldKind::Id, self.id.as_str())];
        push_timestamp(&mut fields, FieldKind::Started, FieldKind::StartedNanos, self.started);
        if let Some(ended) = self.ended {
            push_timestamp(&mut fields, FieldKind::Ended, FieldKind::EndedNanos, ended);
        }
        fields.push(Field::string(FieldKind::DirRef, self.root.as_str()));
        fields
    }

    fn from_fields(fields: &[Field]) -> CodecResult<Self> {
        const OBJECT: &str = "generation";
        check_kinds(
            OBJECT,
            fields,
            &[
                FieldKind::Id,
                FieldKind::Started,
                FieldKind::StartedNanos,
                FieldKind::Ended,
                FieldKind::EndedNanos,
                FieldKind::DirRef,
            ],
        )?;
        let ended_nanos = optional(fields, FieldKind::EndedNanos)?;
        let ended = match (optional(fields, FieldKind::Ended)?, ended_nanos) {
            (Some(secs), nanos) => Some(timestamp_of(secs, nanos)?),
            (None, Some(_)) => {
                return Err(CodecError::MissingField {
                    object_type: OBJECT,
                    kind: FieldKind::Ended,
                })
            }
            (None, None) => None,
        };
        Ok(Self {
            id: id_of(required(OBJECT, fields, FieldKind::Id)?)?,
            started: timestamp_of(
                required(OBJECT, fields, FieldKind::Started)?,
                optional(fields, FieldKind::StartedNanos)?,
            )?,
            ended,
            root: id_of(required(OBJECT, fields, FieldKind::DirRef)?)?,
        })
    }
}

impl Addressable for Generation {
    fn id(&self) -> &ObjectId {
        &self.id
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// A backed-up machine and its generations, oldest first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Host {
    pub hostname: String,
    pub generations: Vec<ObjectId>,
}

impl Host {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            generations: Vec::new(),
        }
    }
}

impl Encodable for Host {
    const TYPE: ObjectType = ObjectType::Host;

    fn prepare_for_encoding(&self) -> Vec<Field> {
        let mut fields = vec![Field::string(FieldKind::HostName, &self.hostname)];
        fields.extend(
            self.generations
                .iter()
                .map(|g| Field::string(FieldKind::GenRef, g.as_str())),
        );
        fields
    }

    fn from_fields(fields: &[Field]) -> CodecResult<Self> {
        const OBJECT: &str = "host";
        check_kinds(OBJECT, fields, &[FieldKind::HostName, FieldKind::GenRef])?;
        Ok(Self {
            hostname: string_of(required(OBJECT, fields, FieldKind::HostName)?)?.to_string(),
            generations: ids(fields, FieldKind::GenRef)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

/// The repository entry point: which hosts exist.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Root {
    pub hosts: Vec<String>,
}

impl Encodable for Root {
    const TYPE: ObjectType = ObjectType::Root;

    fn prepare_for_encoding(&self) -> Vec<Field> {
        self.hosts
            .iter()
            .map(|h| Field::string(FieldKind::HostId, h))
            .collect()
    }

    fn from_fields(fields: &[Field]) -> CodecResult<Self> {
        check_kinds("root", fields, &[FieldKind::HostId])?;
        Ok(Self {
            hosts: fields
                .iter()
                .map(|f| string_of(f).map(str::to_string))
                .collect::<CodecResult<_>>()?,
        })
    }
}

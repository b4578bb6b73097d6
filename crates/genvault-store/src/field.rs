//! The field model every stored object is made of.
//!
//! An encoded object is an ordered list of [`Field`]s. Each field pairs a
//! [`FieldKind`], which says what role the value plays (a file name, a
//! reference to a child directory, ...), with a [`Value`]. Several fields may
//! share a kind; their relative order is preserved through encoding.

use std::fmt;

use serde::Serialize;

/// Semantic role of a field value. The discriminant is the on-disk tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FieldKind {
    Id = 1,
    FileName = 2,
    DirRef = 3,
    FileGroupRef = 4,
    GenRef = 5,
    HostId = 6,
    HostName = 7,
    Started = 8,
    Ended = 9,
    File = 10,
    Mode = 11,
    Size = 12,
    Mtime = 13,
    Uid = 14,
    Gid = 15,
    Target = 16,
    /// Sub-second part of `Started`, omitted when zero.
    StartedNanos = 17,
    /// Sub-second part of `Ended`, omitted when zero.
    EndedNanos = 18,
}

impl FieldKind {
    pub const ALL: [FieldKind; 18] = [
        FieldKind::Id,
        FieldKind::FileName,
        FieldKind::DirRef,
        FieldKind::FileGroupRef,
        FieldKind::GenRef,
        FieldKind::HostId,
        FieldKind::HostName,
        FieldKind::Started,
        FieldKind::Ended,
        FieldKind::File,
        FieldKind::Mode,
        FieldKind::Size,
        FieldKind::Mtime,
        FieldKind::Uid,
        FieldKind::Gid,
        FieldKind::Target,
        FieldKind::StartedNanos,
        FieldKind::EndedNanos,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.tag() == tag)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::FileName => "filename",
            Self::DirRef => "dirref",
            Self::FileGroupRef => "fgref",
            Self::GenRef => "genref",
            Self::HostId => "hostid",
            Self::HostName => "hostname",
            Self::Started => "started",
            Self::Ended => "ended",
            Self::File => "file",
            Self::Mode => "mode",
            Self::Size => "size",
            Self::Mtime => "mtime",
            Self::Uid => "uid",
            Self::Gid => "gid",
            Self::Target => "target",
            Self::StartedNanos => "started_ns",
            Self::EndedNanos => "ended_ns",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A field value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
    /// A nested, ordered field list (used for inline file entries).
    Composite(Vec<Field>),
}

/// One `(kind, value)` pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub kind: FieldKind,
    pub value: Value,
}

impl Field {
    pub fn string(kind: FieldKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: Value::Str(value.into()),
        }
    }

    pub fn int(kind: FieldKind, value: i64) -> Self {
        Self {
            kind,
            value: Value::Int(value),
        }
    }

    pub fn composite(kind: FieldKind, fields: Vec<Field>) -> Self {
        Self {
            kind,
            value: Value::Composite(fields),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.value {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_composite(&self) -> Option<&[Field]> {
        match &self.value {
            Value::Composite(fields) => Some(fields),
            _ => None,
        }
    }
}

/// All string values of `kind`, in field order.
///
/// Fields of `kind` that hold a non-string value are skipped.
pub fn find_strings(fields: &[Field], kind: FieldKind) -> Vec<&str> {
    fields
        .iter()
        .filter(|f| f.kind == kind)
        .filter_map(Field::as_str)
        .collect()
}

/// The first string value of `kind`, if any.
pub fn first_string(fields: &[Field], kind: FieldKind) -> Option<&str> {
    fields
        .iter()
        .filter(|f| f.kind == kind)
        .find_map(Field::as_str)
}

/// All integer values of `kind`, in field order.
pub fn find_ints(fields: &[Field], kind: FieldKind) -> Vec<i64> {
    fields
        .iter()
        .filter(|f| f.kind == kind)
        .filter_map(Field::as_int)
        .collect()
}

/// All composite values of `kind`, in field order.
pub fn find_composites(fields: &[Field], kind: FieldKind) -> Vec<&[Field]> {
    fields
        .iter()
        .filter(|f| f.kind == kind)
        .filter_map(Field::as_composite)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_roundtrip() {
        for kind in FieldKind::ALL {
            assert_eq!(FieldKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(FieldKind::from_tag(0), None);
        assert_eq!(FieldKind::from_tag(19), None);
    }

    #[test]
    fn tags_are_unique() {
        let mut tags: Vec<u8> = FieldKind::ALL.iter().map(|k| k.tag()).collect();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), FieldKind::ALL.len());
    }

    #[test]
    fn find_strings_preserves_order_and_skips_other_kinds() {
        let fields = vec![
            Field::string(FieldKind::DirRef, "b"),
            Field::string(FieldKind::FileName, "x"),
            Field::string(FieldKind::DirRef, "a"),
            Field::int(FieldKind::DirRef, 7),
        ];
        assert_eq!(find_strings(&fields, FieldKind::DirRef), vec!["b", "a"]);
        assert_eq!(first_string(&fields, FieldKind::FileName), Some("x"));
        assert_eq!(find_ints(&fields, FieldKind::DirRef), vec![7]);
        assert!(find_strings(&fields, FieldKind::GenRef).is_empty());
    }

    #[test]
    fn composites_are_projected() {
        let inner = vec![Field::string(FieldKind::FileName, "f")];
        let fields = vec![Field::composite(FieldKind::File, inner.clone())];
        assert_eq!(find_composites(&fields, FieldKind::File), vec![&inner[..]]);
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&FieldKind::FileGroupRef).unwrap();
        assert_eq!(json, "\"file_group_ref\"");
        assert_eq!(FieldKind::FileGroupRef.to_string(), "fgref");
    }
}

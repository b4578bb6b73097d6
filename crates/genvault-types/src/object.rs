use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Longest identifier accepted. Identifiers become file names in the
/// repository, so they stay well below common name limits.
pub const MAX_ID_LEN: usize = 128;

/// Opaque identifier naming one stored object.
///
/// An `ObjectId` is assigned when an object is created and is independent of
/// the object's content: two identical directory trees written twice get two
/// different identifiers. Once bytes are stored under an identifier they are
/// never rewritten.
///
/// Identifiers are restricted to `[A-Za-z0-9._-]` and must not start with a
/// dot, because they are used verbatim as path components.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse and validate an identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        validate(&id)?;
        Ok(Self(id))
    }

    /// Allocate a fresh identifier.
    ///
    /// UUID v7 keeps identifiers allocated by one backup run roughly
    /// time-ordered, which helps when eyeballing a repository.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().simple().to_string())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log lines (first 8 characters).
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

fn validate(id: &str) -> Result<(), TypeError> {
    let fail = |reason: &str| TypeError::InvalidObjectId {
        id: id.to_string(),
        reason: reason.to_string(),
    };
    if id.is_empty() {
        return Err(fail("must not be empty"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(fail("too long"));
    }
    if id.starts_with('.') {
        return Err(fail("must not start with '.'"));
    }
    if let Some(ch) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(fail(&format!("contains forbidden character {ch:?}")));
    }
    Ok(())
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

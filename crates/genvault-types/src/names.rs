//! Host name validation.
//!
//! A host name is stored verbatim under `hosts/<name>` in the repository, so
//! it must be a single, non-hidden path component:
//! - Must be non-empty and at most 255 bytes
//! - Must not contain `/`, `\`, NUL, or whitespace
//! - Must not start with `.` or `tmp.`
//! - Must not end with `.bak`
//!
//! The last two rules keep host records apart from the backup copies and
//! temporary files the atomic overwrite leaves next to them in `hosts/`.

use crate::error::TypeError;

const FORBIDDEN_CHARS: &[char] = &['/', '\\', '\0', ' ', '\t', '\n', '\r'];

const RESERVED_PREFIX: &str = "tmp.";
const RESERVED_SUFFIX: &str = ".bak";

/// Validate a host name, returning `Ok(())` if it is usable as a path component.
///
/// # Examples
///
/// ```
/// use genvault_types::validate_host_name;
///
/// assert!(validate_host_name("backup-01.example.org").is_ok());
/// assert!(validate_host_name("").is_err());
/// assert!(validate_host_name("../etc").is_err());
/// ```
pub fn validate_host_name(name: &str) -> Result<(), TypeError> {
    let fail = |reason: String| TypeError::InvalidHostName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(fail("host name must not be empty".into()));
    }
    if name.len() > 255 {
        return Err(fail("host name longer than 255 bytes".into()));
    }
    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return Err(fail(format!("contains forbidden character: {ch:?}")));
        }
    }
    if name.starts_with('.') {
        return Err(fail("must not start with '.'".into()));
    }
    if name.starts_with(RESERVED_PREFIX) {
        return Err(fail(format!("must not start with {RESERVED_PREFIX:?}")));
    }
    if name.ends_with(RESERVED_SUFFIX) {
        return Err(fail(format!("must not end with {RESERVED_SUFFIX:?}")));
    }
    Ok(())
}

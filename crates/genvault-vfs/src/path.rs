//! `/`-separated VFS path helpers.
//!
//! VFS paths are relative to the backend root. The empty string names the
//! root itself.

/// Suffix given to the previous version of a file during an atomic overwrite.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Strip redundant separators and leading `./` components.
pub fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Parent directory of `path`, or `""` for top-level entries.
pub fn parent(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[..idx],
        None => "",
    }
}

/// Final component of `path`.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Join a directory and a name.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

/// Sibling path that holds the previous version during an overwrite.
pub fn backup_path(path: &str) -> String {
    format!("{path}{BACKUP_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(normalize("./a//b/"), "a/b");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("/"), "");
    }

    #[test]
    fn parent_and_file_name() {
        assert_eq!(parent("objects/ab/x"), "objects/ab");
        assert_eq!(parent("root"), "");
        assert_eq!(file_name("objects/ab/x"), "x");
        assert_eq!(file_name("root"), "root");
    }

    #[test]
    fn join_handles_root() {
        assert_eq!(join("", "lock"), "lock");
        assert_eq!(join("hosts", "web"), "hosts/web");
        assert_eq!(join("hosts/", "web"), "hosts/web");
    }

    #[test]
    fn backup_is_sibling() {
        assert_eq!(backup_path("hosts/web"), "hosts/web.bak");
    }
}

use chrono::{DateTime, Utc};
use genvault_vfs::metadata::{S_IFDIR, S_IFLNK, S_IFMT, S_IFREG};

const S_IFCHR: u32 = 0o020000;
const S_IFBLK: u32 = 0o060000;
const S_IFIFO: u32 = 0o010000;
const S_IFSOCK: u32 = 0o140000;

/// Render a raw mode `ls -l` style, e.g. `drwxr-xr-x`.
pub fn permissions(mode: u32) -> String {
    let kind = match mode & S_IFMT {
        S_IFDIR => 'd',
        S_IFREG => '-',
        S_IFLNK => 'l',
        S_IFCHR => 'c',
        S_IFBLK => 'b',
        S_IFIFO => 'p',
        S_IFSOCK => 's',
        _ => '?',
    };
    let mut out = String::with_capacity(10);
    out.push(kind);

    let special = [(0o4000, 's', 'S'), (0o2000, 's', 'S'), (0o1000, 't', 'T')];
    for (i, (bit, exec_set, exec_clear)) in special.into_iter().enumerate() {
        let shift = 6 - 3 * i;
        let triple = (mode >> shift) & 0o7;
        out.push(if triple & 0o4 != 0 { 'r' } else { '-' });
        out.push(if triple & 0o2 != 0 { 'w' } else { '-' });
        let exec = triple & 0o1 != 0;
        out.push(match (mode & bit != 0, exec) {
            (true, true) => exec_set,
            (true, false) => exec_clear,
            (false, true) => 'x',
            (false, false) => '-',
        });
    }
    out
}

pub fn timestamp(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn mtime(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| timestamp(&t))
        .unwrap_or_else(|| secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_and_directory() {
        assert_eq!(permissions(S_IFREG | 0o644), "-rw-r--r--");
        assert_eq!(permissions(S_IFDIR | 0o755), "drwxr-xr-x");
        assert_eq!(permissions(S_IFLNK | 0o777), "lrwxrwxrwx");
    }

    #[test]
    fn special_bits() {
        assert_eq!(permissions(S_IFREG | 0o4755), "-rwsr-xr-x");
        assert_eq!(permissions(S_IFREG | 0o2644), "-rw-r-Sr--");
        assert_eq!(permissions(S_IFDIR | 0o1777), "drwxrwxrwt");
        assert_eq!(permissions(S_IFDIR | 0o1776), "drwxrwxrwT");
    }

    #[test]
    fn unknown_type() {
        assert_eq!(permissions(0), "?---------");
        assert_eq!(permissions(S_IFIFO | 0o600), "prw-------");
    }

    #[test]
    fn formats_times() {
        assert_eq!(mtime(0), "1970-01-01 00:00:00");
        assert_eq!(mtime(1_700_000_000), "2023-11-14 22:13:20");
    }
}

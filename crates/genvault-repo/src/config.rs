use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use genvault_types::validate_host_name;
use serde::{Deserialize, Serialize};

use crate::error::{RepoError, RepoResult};

/// Format accepted by `pretend_time`.
pub const PRETEND_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Byte transform applied to stored objects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Zstd,
}

/// Repository and client settings, usually read from a TOML file.
///
/// Every key is optional; missing keys take the [`Default`] value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory of the repository.
    pub repository: Option<PathBuf>,
    /// Host name backups are recorded under.
    pub client_name: String,
    /// How long to wait for a held repository lock. 0 fails at once.
    pub lock_timeout_secs: u64,
    pub compression: Compression,
    pub zstd_level: i32,
    /// Compare bytes when storing an identifier that already exists.
    pub strict_put: bool,
    /// Most file entries written into a single file group.
    pub files_per_group: usize,
    /// Depth guard for walking and checking directory trees.
    pub max_tree_depth: usize,
    /// Fail every mutating filesystem call after this many (0 = off).
    pub crash_limit: u64,
    /// Fixed UTC time (`YYYY-MM-DD HH:MM:SS`) used instead of the clock.
    pub pretend_time: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repository: None,
            client_name: local_hostname(),
            lock_timeout_secs: 0,
            compression: Compression::None,
            zstd_level: 3,
            strict_put: false,
            files_per_group: 1024,
            max_tree_depth: 4096,
            crash_limit: 0,
            pretend_time: None,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> RepoResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| RepoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> RepoResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RepoError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Reject settings the rest of the system cannot work with.
    pub fn validate(&self) -> RepoResult<()> {
        validate_host_name(&self.client_name)
            .map_err(|e| RepoError::Config(format!("client_name: {e}")))?;
        if self.files_per_group == 0 {
            return Err(RepoError::Config("files_per_group must be at least 1".into()));
        }
        if self.max_tree_depth == 0 {
            return Err(RepoError::Config("max_tree_depth must be at least 1".into()));
        }
        if self.compression == Compression::Zstd && !(1..=22).contains(&self.zstd_level) {
            return Err(RepoError::Config(format!(
                "zstd_level must be between 1 and 22, got {}",
                self.zstd_level
            )));
        }
        self.pretend_time()?;
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// The parsed `pretend_time`, if set.
    pub fn pretend_time(&self) -> RepoResult<Option<DateTime<Utc>>> {
        self.pretend_time
            .as_deref()
            .map(|text| {
                NaiveDateTime::parse_from_str(text, PRETEND_TIME_FORMAT)
                    .map(|naive| naive.and_utc())
                    .map_err(|e| RepoError::Config(format!("pretend_time {text:?}: {e}")))
            })
            .transpose()
    }
}

/// Name of this machine, or `"unknown"`.
pub fn local_hostname() -> String {
    let from_env = std::env::var("HOSTNAME").ok();
    let from_file = || {
        std::fs::read_to_string("/etc/hostname")
            .ok()
            .map(|s| s.trim().to_string())
    };
    from_env
        .or_else(from_file)
        .filter(|name| validate_host_name(name).is_ok())
        .unwrap_or_else(|| "unknown".into())
}

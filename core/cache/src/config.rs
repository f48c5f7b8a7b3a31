//! Engine settings.
//!
//! Defaults point at the historical Go distribution endpoints. They can be
//! overridden per cache root in `<root>/config.toml`:
//!
//! ```toml
//! tags_url = "https://mirror.example.com/go/.hgtags"
//! repository_url = "https://mirror.example.com/go/"
//! archive_host = "https://mirror.example.com/golang"
//! legacy_archive_host = "https://mirror.example.com/files"
//! legacy_threshold = "1.2.2"
//! vcs_binary = "hg"
//! checksum_index_url = ""    # disables the published digest lookup
//! ```
//!
//! `VENGO_TAGS_URL` and `VENGO_ARCHIVE_HOST` take precedence over the file.

use std::path::Path;

use semver::Version;
use serde::Deserialize;
use tracing::debug;

use crate::error::{CacheError, CacheResult};

/// File name of the settings file inside the cache root.
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable overriding the tag feed URL.
pub const TAGS_URL_ENV: &str = "VENGO_TAGS_URL";

/// Environment variable overriding the current archive host.
pub const ARCHIVE_HOST_ENV: &str = "VENGO_ARCHIVE_HOST";

const DEFAULT_TAGS_URL: &str = "https://go.googlecode.com/hg/.hgtags";
const DEFAULT_REPOSITORY_URL: &str = "https://go.googlecode.com/hg/";
const DEFAULT_ARCHIVE_HOST: &str = "https://storage.googleapis.com/golang";
const DEFAULT_LEGACY_ARCHIVE_HOST: &str = "https://go.googlecode.com/files";
const DEFAULT_VCS_BINARY: &str = "hg";
const DEFAULT_CHECKSUM_INDEX_URL: &str = "https://go.dev/dl/?mode=json&include=all";

/// Endpoints and tools the engine talks to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Plain-text `.hgtags` feed listing release tags.
    pub tags_url: String,
    /// Upstream Mercurial repository cloned into the mirror.
    pub repository_url: String,
    /// Host serving release archives from `legacy_threshold` onward.
    pub archive_host: String,
    /// Host serving release archives older than `legacy_threshold`.
    pub legacy_archive_host: String,
    /// First release published on `archive_host`.
    pub legacy_threshold: Version,
    /// Mercurial client executable.
    pub vcs_binary: String,
    /// JSON release index consulted for digests missing from the local
    /// table. Empty disables it.
    pub checksum_index_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tags_url: DEFAULT_TAGS_URL.to_string(),
            repository_url: DEFAULT_REPOSITORY_URL.to_string(),
            archive_host: DEFAULT_ARCHIVE_HOST.to_string(),
            legacy_archive_host: DEFAULT_LEGACY_ARCHIVE_HOST.to_string(),
            legacy_threshold: Version::new(1, 2, 2),
            vcs_binary: DEFAULT_VCS_BINARY.to_string(),
            checksum_index_url: DEFAULT_CHECKSUM_INDEX_URL.to_string(),
        }
    }
}

impl Settings {
    /// Loads `<root>/config.toml` if present and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if the file exists but is malformed.
    pub fn load(root: &Path) -> CacheResult<Self> {
        let path = root.join(CONFIG_FILE);
        let mut settings = match std::fs::read_to_string(&path) {
            Ok(content) => {
                debug!(path = %path.display(), "loading settings");
                Self::from_toml(&content, &path)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(CacheError::io(format!("reading {}", path.display()), e)),
        };
        settings.apply_env();
        Ok(settings)
    }

    /// Parses settings; omitted keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] on malformed TOML or unknown keys.
    pub fn from_toml(content: &str, origin: &Path) -> CacheResult<Self> {
        toml::from_str(content).map_err(|e| CacheError::Config {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn apply_env(&mut self) {
        if let Some(url) = env_override(TAGS_URL_ENV) {
            self.tags_url = url;
        }
        if let Some(host) = env_override(ARCHIVE_HOST_ENV) {
            self.archive_host = host;
        }
    }
}

/// Reads `name`, treating empty or whitespace-only values as unset.
fn env_override(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

//! On-disk cache layout.
//!
//! ## Directory Structure
//!
//! ```text
//! ~/.vengo/                   # Cache root (or VENGO_HOME, or --cache-dir)
//!   go1.4/                    # One entry per version identifier
//!     go/                     # Extracted archive or mirror checkout
//!       src/all.bash          # Bootstrap build script
//!       bin/go                # Present once the build succeeded
//!   mercurial/                # Shared clone of the upstream repository
//!   logs/                     # Transcripts, truncated per operation
//!   locks/                    # Advisory lock files
//!   config.toml               # Optional endpoint overrides
//!   checksums.toml            # Optional checksum overrides
//! ```

use std::path::{Path, PathBuf};

use crate::error::{CacheError, CacheResult};
use crate::lock::CacheLock;
use crate::sink::LogSink;
use crate::version::VersionId;

/// Environment variable overriding the default cache root.
pub const VENGO_HOME_ENV: &str = "VENGO_HOME";

/// Directory holding the shared Mercurial clone.
pub const MIRROR_DIR: &str = "mercurial";

/// Directory holding operation transcripts.
pub const LOGS_DIR: &str = "logs";

/// Directory holding advisory lock files.
pub const LOCKS_DIR: &str = "locks";

/// Lock key guarding the Mercurial clone.
pub const MIRROR_LOCK: &str = "mercurial";

/// Name of the source tree inside each entry.
const SOURCE_DIR: &str = "go";

/// Directories under the root that are not version entries.
const RESERVED: &[&str] = &[MIRROR_DIR, LOGS_DIR, LOCKS_DIR];

/// A version directory found in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Version the directory is keyed by.
    pub version: VersionId,
    /// Path of the entry directory.
    pub path: PathBuf,
    /// Whether the `go` binary has been built.
    pub compiled: bool,
}

/// Path derivation and existence checks over one cache root.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Uses `root` as the cache root, expanding a leading `~`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: expand_tilde(root.as_ref()),
        }
    }

    /// Resolves the cache root.
    ///
    /// Priority: `explicit`, then `VENGO_HOME`, then `~/.vengo`. Empty values
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if no override is given and the home directory cannot
    /// be determined.
    pub fn resolve(explicit: Option<&Path>) -> CacheResult<Self> {
        if let Some(path) = explicit.filter(|p| !p.as_os_str().is_empty()) {
            return Ok(Self::new(path));
        }
        if let Some(home) = std::env::var_os(VENGO_HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(PathBuf::from(home)));
        }
        let home = dirs::home_dir().ok_or_else(|| {
            CacheError::io(
                format!("cannot determine home directory, set {VENGO_HOME_ENV}"),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            )
        })?;
        Ok(Self::new(home.join(".vengo")))
    }

    /// The cache root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<id>`
    #[must_use]
    pub fn entry_dir(&self, id: &VersionId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// `<root>/<id>/go`, where archives are unpacked and checkouts land.
    #[must_use]
    pub fn source_dir(&self, id: &VersionId) -> PathBuf {
        self.entry_dir(id).join(SOURCE_DIR)
    }

    /// `<root>/<id>/go/src`, the bootstrap script's working directory.
    #[must_use]
    pub fn build_dir(&self, id: &VersionId) -> PathBuf {
        self.source_dir(id).join("src")
    }

    /// The compiled `go` binary whose presence marks a finished build.
    #[must_use]
    pub fn artifact_path(&self, id: &VersionId) -> PathBuf {
        self.source_dir(id)
            .join("bin")
            .join(format!("go{}", std::env::consts::EXE_SUFFIX))
    }

    /// `<root>/mercurial`
    #[must_use]
    pub fn mirror_dir(&self) -> PathBuf {
        self.root.join(MIRROR_DIR)
    }

    /// `<root>/logs`
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    /// `<root>/locks`
    #[must_use]
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join(LOCKS_DIR)
    }

    /// Whether an entry exists for `id`.
    #[must_use]
    pub fn exists(&self, id: &VersionId) -> bool {
        self.entry_dir(id).exists()
    }

    /// Whether the build artifact exists for `id`.
    #[must_use]
    pub fn is_compiled(&self, id: &VersionId) -> bool {
        self.artifact_path(id).is_file()
    }

    /// Opens a transcript under `logs/`, creating the directory on first use.
    #[must_use]
    pub fn open_log(&self, name: &str) -> LogSink {
        LogSink::open(&self.logs_dir(), name)
    }

    /// Takes the advisory lock for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Lock`] if the lock cannot be taken.
    pub fn lock(&self, key: &str) -> CacheResult<CacheLock> {
        CacheLock::acquire(&self.locks_dir(), key)
    }

    /// Lists version entries, sorted by identifier.
    ///
    /// A missing root is an empty cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the root exists but cannot be read.
    pub fn entries(&self) -> CacheResult<Vec<CacheEntry>> {
        let read_dir = match std::fs::read_dir(&self.root) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CacheError::io(
                    format!("reading cache root {}", self.root.display()),
                    e,
                ));
            }
        };

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| {
                CacheError::io(format!("reading cache root {}", self.root.display()), e)
            })?;
            let path = dir_entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = dir_entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if RESERVED.contains(&name.as_str()) || name.starts_with('.') {
                continue;
            }

            let version = VersionId::from_tag(name);
            let compiled = self.is_compiled(&version);
            entries.push(CacheEntry {
                version,
                path,
                compiled,
            });
        }

        entries.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(entries)
    }
}

/// Replaces a leading `~` with the user's home directory.
///
/// Paths that do not start with `~`, or `~user` forms, are returned unchanged,
/// as is everything when the home directory is unknown.
#[must_use]
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) if rest.as_os_str().is_empty() => home,
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

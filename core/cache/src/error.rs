//! Error types for the cache engine.
//!
//! Every component returns [`CacheResult`]. Some failures were historically
//! treated as unrecoverable (the upstream feed answering `400`, a missing
//! Mercurial client, an unreadable tag catalog during export). Those are still
//! surfaced as ordinary values; [`CacheError::is_fatal`] tells the caller which
//! ones leave nothing meaningful to continue with.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the engine.
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors the cache engine can produce.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Transport failure or a recoverable non-success HTTP status.
    #[error("network error: {message}")]
    Network {
        /// What was being fetched and what went wrong.
        message: String,
        /// The underlying transport error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The upstream server rejected the request outright (HTTP 400).
    #[error("upstream unavailable: {url} answered {status}")]
    UpstreamUnavailable {
        /// The URL that was requested.
        url: String,
        /// The status line returned by the server.
        status: String,
    },

    /// The tag catalog could not be fetched while resolving a version to export.
    #[error("cannot fetch the Go tag catalog")]
    CatalogUnavailable(#[source] Box<CacheError>),

    /// The tag feed could not be parsed.
    #[error("malformed tag feed at line {line}: {content:?}")]
    UpstreamFormat {
        /// One-based line number in the feed.
        line: usize,
        /// The offending line.
        content: String,
    },

    /// The downloaded payload does not hash to the registered digest.
    #[error("checksum mismatch for {version}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        /// Version whose archive was rejected.
        version: String,
        /// Digest from the checksum registry.
        expected: String,
        /// Digest computed over the downloaded bytes.
        actual: String,
    },

    /// No digest is registered for the version.
    #[error("no checksum registered for {0}")]
    UnknownVersion(String),

    /// The identifier matches neither the `go` nor the `release` naming scheme.
    #[error("{0} is not a recognised Go version identifier")]
    InvalidVersionFormat(String),

    /// The identifier is well formed but absent from the tag catalog.
    #[error("{0} doesn't seem to be a valid Go release")]
    NotFound(String),

    /// Gzip or tar decoding failed while unpacking an archive.
    #[error("failed to extract {version}: {message}")]
    Extraction {
        /// Version being extracted.
        version: String,
        /// Description of the failure.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// `hg clone` of the upstream repository failed.
    #[error("mercurial clone failed: {0}")]
    Clone(String),

    /// `hg pull` into the mirror failed.
    #[error("mercurial pull failed: {0}")]
    Pull(String),

    /// Checking out a revision from the mirror failed.
    #[error("failed to export {version} from mirror: {message}")]
    Export {
        /// Version being exported.
        version: String,
        /// Description of the failure.
        message: String,
    },

    /// A required external program is not on `PATH`.
    #[error("{program} is not installed on your machine")]
    MissingDependency {
        /// Name of the missing executable.
        program: String,
    },

    /// The prepared source tree for a build does not exist.
    #[error("cannot enter source tree {path}")]
    Chdir {
        /// Directory the build should run in.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The bootstrap script could not be started or its output could not be read.
    #[error("build process for {version} failed: {message}")]
    BuildProcess {
        /// Version being compiled.
        version: String,
        /// Description of the failure.
        message: String,
    },

    /// The build finished but the `go` binary was not produced.
    #[error("Go {version} wasn't compiled properly: {} is missing", artifact.display())]
    ArtifactMissing {
        /// Version being compiled.
        version: String,
        /// Expected artifact location.
        artifact: PathBuf,
    },

    /// Could not take the advisory lock guarding a cache entry.
    #[error("failed to lock {path}")]
    Lock {
        /// Lock file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration or checksum table could not be read.
    #[error("invalid configuration in {path}: {message}")]
    Config {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// Local filesystem failure.
    #[error("I/O error: {context}")]
    Io {
        /// Which operation failed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    /// Creates a `Network` error without an underlying source.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a `Network` error wrapping a transport error.
    #[must_use]
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an `Io` error with context.
    #[must_use]
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates an `Extraction` error.
    #[must_use]
    pub fn extraction(
        version: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Extraction {
            version: version.into(),
            message: message.into(),
            source,
        }
    }

    /// Creates an `Export` error.
    #[must_use]
    pub fn export(version: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Export {
            version: version.into(),
            message: message.into(),
        }
    }

    /// Creates a `BuildProcess` error.
    #[must_use]
    pub fn build_process(version: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BuildProcess {
            version: version.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for failures after which no further engine work is meaningful.
    ///
    /// The engine never exits the process itself; the caller decides.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { .. }
                | Self::CatalogUnavailable(_)
                | Self::MissingDependency { .. }
        )
    }
}

#![warn(clippy::pedantic)]

//! Cache engine for Go toolchains.
//!
//! This crate resolves Go version identifiers, materializes their source
//! trees into a local cache and builds them. A version can be obtained in two
//! ways:
//!
//! - **Release archives**: `go<N>.src.tar.gz` is downloaded from the
//!   distribution host, checked against a SHA-256 registry and unpacked.
//!   The registry is a local table backed by the digests go.dev publishes.
//! - **Mercurial mirror**: a single clone of the upstream repository is kept
//!   under the cache root, refreshed on demand, and the requested tag is
//!   checked out into the version's entry.
//!
//! Either way the tree lands in `<root>/<id>/go` and is built by running the
//! distribution's own bootstrap script. A build counts as successful when
//! `go/bin/go` exists afterwards.
//!
//! ## Version identifiers
//!
//! | Input      | Identifier     |
//! |------------|----------------|
//! | `1.4`      | `go1.4`        |
//! | `go1.4`    | `go1.4`        |
//! | `60`       | `release.r60`  |
//! | `release.r60` | `release.r60` |
//! | `tip`      | `tip`          |
//!
//! ## Entry point
//!
//! [`Engine`] bundles a [`CacheStore`], the [`Settings`] and the external
//! collaborators ([`HttpClient`], [`ChecksumRegistry`], [`HgRunner`]) and
//! exposes the top-level operations. Every collaborator is a trait object so
//! it can be replaced in tests.
//!
//! ## Errors
//!
//! All operations return [`CacheResult`]. The engine never terminates the
//! process; [`CacheError::is_fatal`] marks the failures after which a caller
//! should stop.

pub mod archive;
pub mod build;
pub mod catalog;
pub mod checksum;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod lock;
pub mod mirror;
pub mod published;
pub mod sink;
pub mod store;
pub mod version;

pub use archive::{ArchiveFetcher, FetchOutcome};
pub use build::BuildRunner;
pub use checksum::{ChecksumRegistry, Digest, StaticChecksums};
pub use config::Settings;
pub use engine::{Engine, InstallReport, Source};
pub use error::{CacheError, CacheResult};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use mirror::{ExportOutcome, HgCommand, HgOutput, HgRunner, MirrorState, RepositoryMirror};
pub use published::PublishedChecksums;
pub use sink::LogSink;
pub use store::{CacheEntry, CacheStore};
pub use version::{Lookup, VersionId};

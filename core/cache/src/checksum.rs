//! Expected archive digests.
//!
//! Every release archive is checked against a digest that ships with vengo
//! (or that the user placed next to the cache) before a single byte of it is
//! written to disk. Digests are SHA-256, hex encoded. Versions missing from
//! these tables are looked up in the published release index, see
//! [`crate::published`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use sha2::{Digest as _, Sha256};
use tracing::debug;

use crate::error::{CacheError, CacheResult};
use crate::version::VersionId;

/// Checksum table compiled into the binary.
const EMBEDDED_TABLE: &str = include_str!("../data/checksums.toml");

/// File name of the user supplied override table inside the cache root.
pub const OVERRIDE_FILE: &str = "checksums.toml";

/// A lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest(String);

impl Digest {
    /// Wraps an expected digest, normalizing it to lowercase.
    #[must_use]
    pub fn from_hex(hex: &str) -> Self {
        Self(hex.trim().to_ascii_lowercase())
    }

    /// Hashes `data`.
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(data)))
    }

    /// The digest as hex.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of expected digests.
pub trait ChecksumRegistry {
    /// Returns the digest registered for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::UnknownVersion`] if `id` has no entry.
    fn checksum(&self, id: &VersionId) -> CacheResult<Digest>;
}

/// Hashes `data` and compares it with `expected`.
///
/// # Errors
///
/// Returns [`CacheError::IntegrityMismatch`] when the digests differ.
pub fn verify(id: &VersionId, data: &[u8], expected: &Digest) -> CacheResult<()> {
    let actual = Digest::compute(data);
    if actual != *expected {
        return Err(CacheError::IntegrityMismatch {
            version: id.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ChecksumFile {
    #[serde(default)]
    checksums: BTreeMap<String, String>,
}

/// Table-backed [`ChecksumRegistry`].
#[derive(Debug, Clone, Default)]
pub struct StaticChecksums {
    table: BTreeMap<VersionId, Digest>,
}

impl StaticChecksums {
    /// The table compiled into vengo.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if the embedded table does not parse.
    pub fn embedded() -> CacheResult<Self> {
        Self::from_toml(EMBEDDED_TABLE, Path::new("<embedded checksums.toml>"))
    }

    /// The embedded table overlaid with `<root>/checksums.toml` if present.
    ///
    /// # Errors
    ///
    /// Returns an error if either table cannot be read or parsed.
    pub fn load(root: &Path) -> CacheResult<Self> {
        let mut registry = Self::embedded()?;
        let path = root.join(OVERRIDE_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let overrides = Self::from_toml(&content, &path)?;
                debug!(path = %path.display(), entries = overrides.len(), "loaded checksum overrides");
                registry.table.extend(overrides.table);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CacheError::io(
                    format!("reading {}", path.display()),
                    e,
                ));
            }
        }
        Ok(registry)
    }

    /// Parses a `[checksums]` table. Keys are normalized as version strings.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] on malformed TOML.
    pub fn from_toml(content: &str, origin: &Path) -> CacheResult<Self> {
        let file: ChecksumFile = toml::from_str(content).map_err(|e| CacheError::Config {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        let table = file
            .checksums
            .into_iter()
            .map(|(version, digest)| (VersionId::normalize(&version), Digest::from_hex(&digest)))
            .collect();
        Ok(Self { table })
    }

    /// Adds or replaces a single entry.
    pub fn insert(&mut self, id: VersionId, digest: Digest) {
        self.table.insert(id, digest);
    }

    /// Number of registered versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl ChecksumRegistry for StaticChecksums {
    fn checksum(&self, id: &VersionId) -> CacheResult<Digest> {
        self.table
            .get(id)
            .cloned()
            .ok_or_else(|| CacheError::UnknownVersion(id.to_string()))
    }
}

//! Digests taken from the official release index.
//!
//! go.dev publishes every release together with the SHA-256 of each of its
//! files as a JSON array:
//!
//! ```json
//! [
//!   {
//!     "version": "go1.4",
//!     "stable": true,
//!     "files": [
//!       {
//!         "filename": "go1.4.src.tar.gz",
//!         "os": "",
//!         "arch": "",
//!         "version": "go1.4",
//!         "sha256": "<hex digest>",
//!         "size": 10000000,
//!         "kind": "source"
//!       }
//!     ]
//!   }
//! ]
//! ```
//!
//! [`PublishedChecksums`] answers from its local table first and downloads
//! the index only for versions the table lacks. The index is fetched at most
//! once per registry.

use std::cell::OnceCell;
use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, info};

use crate::checksum::{ChecksumRegistry, Digest, StaticChecksums};
use crate::error::{CacheError, CacheResult};
use crate::http::HttpClient;
use crate::version::VersionId;

/// `kind` of source archives in the index.
const SOURCE_KIND: &str = "source";

/// One release in the index.
#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    files: Vec<ReleaseFile>,
}

/// One downloadable file of a release.
#[derive(Debug, Deserialize)]
struct ReleaseFile {
    filename: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    sha256: String,
}

/// Parses the index into a map from source archive file name to digest.
///
/// Binary distributions and files without a digest are skipped.
///
/// # Errors
///
/// Returns the `serde_json` error if `body` is not a release array.
fn parse_index(body: &[u8]) -> Result<BTreeMap<String, Digest>, serde_json::Error> {
    let releases: Vec<Release> = serde_json::from_slice(body)?;
    Ok(releases
        .into_iter()
        .flat_map(|release| release.files)
        .filter(|file| file.kind == SOURCE_KIND && !file.sha256.is_empty())
        .map(|file| (file.filename, Digest::from_hex(&file.sha256)))
        .collect())
}

/// Local checksum table backed by the published release index.
pub struct PublishedChecksums {
    local: StaticChecksums,
    index_url: Option<String>,
    http: Box<dyn HttpClient>,
    index: OnceCell<BTreeMap<String, Digest>>,
}

impl PublishedChecksums {
    /// Wraps `local`, falling back to the index at `index_url`.
    ///
    /// An empty `index_url` disables the fallback.
    #[must_use]
    pub fn new(local: StaticChecksums, index_url: &str, http: Box<dyn HttpClient>) -> Self {
        let index_url = Some(index_url.trim())
            .filter(|url| !url.is_empty())
            .map(str::to_string);
        Self {
            local,
            index_url,
            http,
            index: OnceCell::new(),
        }
    }

    /// Number of entries in the local table.
    #[must_use]
    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    fn index(&self, url: &str) -> CacheResult<&BTreeMap<String, Digest>> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }

        info!(url, "fetching published checksums");
        let response = self.http.get(url)?;
        if !response.is_success() {
            return Err(CacheError::network(format!(
                "{url}: {}",
                response.status_line()
            )));
        }
        let fetched = parse_index(&response.body).map_err(|e| {
            CacheError::network_with_source(format!("malformed release index at {url}"), e)
        })?;
        debug!(entries = fetched.len(), "published checksums loaded");
        Ok(self.index.get_or_init(|| fetched))
    }
}

impl ChecksumRegistry for PublishedChecksums {
    fn checksum(&self, id: &VersionId) -> CacheResult<Digest> {
        let unknown = || CacheError::UnknownVersion(id.to_string());
        match self.local.checksum(id) {
            Err(CacheError::UnknownVersion(_)) => {}
            found => return found,
        }

        let Some(url) = &self.index_url else {
            return Err(unknown());
        };
        let number = id.archive_number().ok_or_else(unknown)?;
        self.index(url)?
            .get(&format!("go{number}.src.tar.gz"))
            .cloned()
            .ok_or_else(unknown)
    }
}

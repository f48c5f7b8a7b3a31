//! Release archive download and extraction.
//!
//! Archives are fetched whole into memory, checked against the checksum
//! registry and only then unpacked into `<root>/<id>/`. Official archives
//! carry a single `go/` top-level folder, so the source lands in
//! `<root>/<id>/go/`.

use std::path::{Component, Path};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info};

use crate::checksum::{self, ChecksumRegistry};
use crate::config::Settings;
use crate::error::{CacheError, CacheResult};
use crate::http::HttpClient;
use crate::sink::{DOWNLOAD_LOG, LogSink};
use crate::store::CacheStore;
use crate::version::VersionId;

/// What [`ArchiveFetcher::fetch`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// An entry already existed; nothing was downloaded.
    AlreadyCached,
    /// The archive was downloaded, verified and unpacked.
    Downloaded {
        /// Size of the compressed archive.
        bytes: usize,
        /// Number of archive entries written.
        entries: usize,
    },
}

/// Builds the download URL for `id`.
///
/// Releases older than `settings.legacy_threshold` were published on the
/// legacy host.
///
/// # Errors
///
/// Returns [`CacheError::InvalidVersionFormat`] for identifiers that have no
/// release archive (`tip`, pre-Go1 `release.*` tags, unrecognised strings).
pub fn archive_url(settings: &Settings, id: &VersionId) -> CacheResult<String> {
    let invalid = || CacheError::InvalidVersionFormat(id.to_string());
    let number = id.archive_number().ok_or_else(invalid)?;
    let release = id.release().ok_or_else(invalid)?;

    let host = if release < settings.legacy_threshold {
        &settings.legacy_archive_host
    } else {
        &settings.archive_host
    };
    Ok(format!(
        "{}/go{number}.src.tar.gz",
        host.trim_end_matches('/')
    ))
}

/// Downloads and unpacks release archives into the cache.
pub struct ArchiveFetcher<'a> {
    store: &'a CacheStore,
    settings: &'a Settings,
    http: &'a dyn HttpClient,
    checksums: &'a dyn ChecksumRegistry,
}

impl<'a> ArchiveFetcher<'a> {
    /// Creates a fetcher over the given collaborators.
    #[must_use]
    pub fn new(
        store: &'a CacheStore,
        settings: &'a Settings,
        http: &'a dyn HttpClient,
        checksums: &'a dyn ChecksumRegistry,
    ) -> Self {
        Self {
            store,
            settings,
            http,
            checksums,
        }
    }

    /// Materializes the release archive for `id`.
    ///
    /// Without `replace`, does nothing, and touches neither the network, the
    /// checksum registry nor the download log, if an entry for `id` already
    /// exists. With `replace`, the existing entry is removed only after the
    /// new archive has been downloaded and verified, so a refused request
    /// leaves the cache as it was.
    ///
    /// # Errors
    ///
    /// - [`CacheError::InvalidVersionFormat`] if `id` has no release archive
    /// - [`CacheError::UnknownVersion`] if no digest is registered for `id`
    /// - [`CacheError::UpstreamUnavailable`] if the server answers `400`
    /// - [`CacheError::Network`] for transport errors and other statuses
    /// - [`CacheError::IntegrityMismatch`] if the payload fails verification;
    ///   nothing is written in that case
    /// - [`CacheError::Extraction`] if unpacking fails part way; the partial
    ///   entry is left on disk
    pub fn fetch(&self, id: &VersionId, replace: bool) -> CacheResult<FetchOutcome> {
        if self.store.exists(id) && !replace {
            debug!(version = %id, "archive already cached");
            return Ok(FetchOutcome::AlreadyCached);
        }

        let mut sink = self.store.open_log(DOWNLOAD_LOG);
        let data = self.download(id, &mut sink)?;
        let entries = self.unpack(id, &data, &mut sink)?;
        Ok(FetchOutcome::Downloaded {
            bytes: data.len(),
            entries,
        })
    }

    /// Downloads the archive for `id` and checks it against the registry.
    ///
    /// No cache entry is modified; only `sink` is written to.
    ///
    /// # Errors
    ///
    /// Same as [`Self::fetch`], minus extraction.
    pub fn download(&self, id: &VersionId, sink: &mut LogSink) -> CacheResult<Vec<u8>> {
        let url = archive_url(self.settings, id)?;
        let expected = self.checksums.checksum(id)?;

        info!(version = %id, url = %url, "downloading release archive");
        sink.write_line(&format!("GET {url}"));
        let response = self.http.get(&url)?;

        if !response.is_success() {
            sink.write_line(&format!("{url}: {}", response.status_line()));
            if response.status == 400 {
                return Err(CacheError::UpstreamUnavailable {
                    url,
                    status: response.status_line(),
                });
            }
            return Err(CacheError::network(response.status_line()));
        }

        sink.write_line(&format!("{} bytes downloaded", response.body.len()));
        checksum::verify(id, &response.body, &expected)?;
        sink.write_line(&format!("sha256 {expected} OK"));
        Ok(response.body)
    }

    /// Replaces any entry for `id` with the contents of verified `data`.
    fn unpack(&self, id: &VersionId, data: &[u8], sink: &mut LogSink) -> CacheResult<usize> {
        let entry = self.store.entry_dir(id);
        if entry.exists() {
            debug!(version = %id, "discarding existing entry");
            std::fs::remove_dir_all(&entry)
                .map_err(|e| CacheError::io(format!("removing {}", entry.display()), e))?;
        }

        info!(version = %id, bytes = data.len(), "decompressing");
        let entries = extract_tar_gz(data, &entry, id)?;
        sink.write_line(&format!("{entries} entries extracted"));
        Ok(entries)
    }
}

/// Unpacks gzip-compressed tar `data` under `prefix`, returning the number
/// of entries written.
///
/// Entries with absolute paths or `..` components are refused. File modes
/// from the archive are applied where the platform supports them.
///
/// # Errors
///
/// Returns [`CacheError::Extraction`] on decoding or filesystem failures.
pub fn extract_tar_gz(data: &[u8], prefix: &Path, id: &VersionId) -> CacheResult<usize> {
    let version = id.as_str();
    std::fs::create_dir_all(prefix.join("go")).map_err(|e| {
        CacheError::extraction(
            version,
            format!("failed to create directory {}", prefix.display()),
            e,
        )
    })?;

    let mut archive = Archive::new(GzDecoder::new(data));
    let mut written = 0;

    let entries = archive
        .entries()
        .map_err(|e| CacheError::extraction(version, "failed to read tar entries", e))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| CacheError::extraction(version, "failed to read tar entry", e))?;

        let entry_path = entry
            .path()
            .map_err(|e| CacheError::extraction(version, "invalid entry path", e))?
            .into_owned();

        if entry_path.is_absolute()
            || entry_path
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(CacheError::extraction(
                version,
                format!(
                    "refusing to extract path with parent directory or absolute reference: {}",
                    entry_path.display()
                ),
                std::io::Error::from(std::io::ErrorKind::InvalidData),
            ));
        }

        let output_path = prefix.join(&entry_path);
        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&output_path).map_err(|e| {
                CacheError::extraction(
                    version,
                    format!("failed to create directory {}", output_path.display()),
                    e,
                )
            })?;
        } else {
            entry.unpack_in(prefix).map_err(|e| {
                CacheError::extraction(
                    version,
                    format!("failed to extract {}", output_path.display()),
                    e,
                )
            })?;
        }
        written += 1;
    }

    Ok(written)
}

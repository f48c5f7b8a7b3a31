//! Top-level operations over one cache root.
//!
//! [`Engine`] wires the store, settings and external collaborators together
//! and owns locking: the mirror lock is always taken before a version lock,
//! and each lock is taken once per operation.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::archive::{ArchiveFetcher, FetchOutcome};
use crate::build::BuildRunner;
use crate::catalog;
use crate::checksum::{ChecksumRegistry, StaticChecksums};
use crate::config::Settings;
use crate::error::{CacheError, CacheResult};
use crate::http::{HttpClient, ReqwestClient};
use crate::lock::CacheLock;
use crate::mirror::{ExportOutcome, HgCommand, HgRunner, RepositoryMirror};
use crate::published::PublishedChecksums;
use crate::sink::{BUILD_LOG, MERCURIAL_LOG};
use crate::store::{CacheEntry, CacheStore, MIRROR_LOCK};
use crate::version::VersionId;

/// Where a version's source tree comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Source {
    /// Official release archive, verified against the checksum registry.
    #[default]
    Archive,
    /// Checkout from the shared Mercurial mirror.
    Mercurial,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive => write!(f, "archive"),
            Self::Mercurial => write!(f, "mercurial"),
        }
    }
}

/// Result of [`Engine::install`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// The resolved version.
    pub version: VersionId,
    /// Where the entry lives.
    pub path: PathBuf,
    /// Whether the source tree was downloaded or checked out by this call.
    pub materialized: bool,
    /// The `go` binary, when a build was requested or already present.
    pub artifact: Option<PathBuf>,
}

/// Cache operations bound to one root.
pub struct Engine {
    store: CacheStore,
    settings: Settings,
    http: Box<dyn HttpClient>,
    checksums: Box<dyn ChecksumRegistry>,
    hg: Box<dyn HgRunner>,
}

impl Engine {
    /// Opens the cache at `root` (or the default root) with the real network
    /// client, the checksum table and the `hg` executable.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings or checksum files are malformed, or
    /// the HTTP client cannot be built.
    pub fn open(root: Option<&Path>) -> CacheResult<Self> {
        let store = CacheStore::resolve(root)?;
        let settings = Settings::load(store.root())?;
        let http = ReqwestClient::new()?;
        let checksums = PublishedChecksums::new(
            StaticChecksums::load(store.root())?,
            &settings.checksum_index_url,
            Box::new(http.clone()),
        );
        let hg = HgCommand::new(settings.vcs_binary.clone());
        debug!(
            root = %store.root().display(),
            checksums = checksums.local_len(),
            "opened cache"
        );

        Ok(Self::with_parts(
            store,
            settings,
            Box::new(http),
            Box::new(checksums),
            Box::new(hg),
        ))
    }

    /// Assembles an engine from explicit collaborators.
    #[must_use]
    pub fn with_parts(
        store: CacheStore,
        settings: Settings,
        http: Box<dyn HttpClient>,
        checksums: Box<dyn ChecksumRegistry>,
        hg: Box<dyn HgRunner>,
    ) -> Self {
        Self {
            store,
            settings,
            http,
            checksums,
            hg,
        }
    }

    #[must_use]
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Release tags published upstream, ascending.
    ///
    /// # Errors
    ///
    /// See [`catalog::fetch_tags`].
    pub fn tags(&self) -> CacheResult<Vec<VersionId>> {
        catalog::fetch_tags(self.http.as_ref(), &self.settings.tags_url)
    }

    /// Downloads and unpacks the release archive for `raw`.
    ///
    /// # Errors
    ///
    /// See [`ArchiveFetcher::fetch`].
    pub fn fetch_archive(&self, raw: &str) -> CacheResult<FetchOutcome> {
        let id = resolve_id(raw)?;
        let _lock = self.store.lock(id.as_str())?;
        self.fetch_locked(&id, false)
    }

    /// Exports `raw` from the Mercurial mirror.
    ///
    /// # Errors
    ///
    /// See [`RepositoryMirror::export`].
    pub fn export(&self, raw: &str, force: bool) -> CacheResult<ExportOutcome> {
        let id = resolve_id(raw)?;
        let _locks = self.lock_for(&id, Source::Mercurial)?;
        self.export_locked(&id, force)
    }

    /// Builds the prepared tree for `raw`.
    ///
    /// # Errors
    ///
    /// See [`BuildRunner::compile`].
    pub fn compile(&self, raw: &str) -> CacheResult<PathBuf> {
        let id = resolve_id(raw)?;
        let _lock = self.store.lock(id.as_str())?;
        self.compile_locked(&id)
    }

    /// Materializes `raw` from `source` and optionally builds it.
    ///
    /// With `force`, an existing entry is replaced: a mirror export removes
    /// it before the checkout, an archive install only once the new archive
    /// has been verified. With `build`, the
    /// bootstrap script runs unless the entry was already present and its
    /// `go` binary exists.
    ///
    /// # Errors
    ///
    /// Any error from the selected backend or the build.
    pub fn install(
        &self,
        raw: &str,
        source: Source,
        force: bool,
        build: bool,
    ) -> CacheResult<InstallReport> {
        let id = resolve_id(raw)?;
        let _locks = self.lock_for(&id, source)?;
        info!(version = %id, %source, force, build, "installing");

        let materialized = match source {
            Source::Archive => {
                matches!(self.fetch_locked(&id, force)?, FetchOutcome::Downloaded { .. })
            }
            Source::Mercurial => {
                matches!(self.export_locked(&id, force)?, ExportOutcome::Exported(_))
            }
        };

        let artifact = if !build {
            self.store
                .is_compiled(&id)
                .then(|| self.store.artifact_path(&id))
        } else if !materialized && self.store.is_compiled(&id) {
            debug!(version = %id, "already compiled");
            Some(self.store.artifact_path(&id))
        } else {
            Some(self.compile_locked(&id)?)
        };

        Ok(InstallReport {
            path: self.store.entry_dir(&id),
            version: id,
            materialized,
            artifact,
        })
    }

    /// Entries currently in the cache.
    ///
    /// # Errors
    ///
    /// See [`CacheStore::entries`].
    pub fn installed(&self) -> CacheResult<Vec<CacheEntry>> {
        self.store.entries()
    }

    fn lock_for(&self, id: &VersionId, source: Source) -> CacheResult<Vec<CacheLock>> {
        let mut locks = Vec::with_capacity(2);
        if source == Source::Mercurial {
            locks.push(self.store.lock(MIRROR_LOCK)?);
        }
        locks.push(self.store.lock(id.as_str())?);
        Ok(locks)
    }

    fn fetch_locked(&self, id: &VersionId, replace: bool) -> CacheResult<FetchOutcome> {
        ArchiveFetcher::new(
            &self.store,
            &self.settings,
            self.http.as_ref(),
            self.checksums.as_ref(),
        )
        .fetch(id, replace)
    }

    fn export_locked(&self, id: &VersionId, force: bool) -> CacheResult<ExportOutcome> {
        let mut sink = self.store.open_log(MERCURIAL_LOG);
        RepositoryMirror::new(&self.store, &self.settings, self.hg.as_ref()).export(
            id.as_str(),
            force,
            self.http.as_ref(),
            &mut sink,
        )
    }

    fn compile_locked(&self, id: &VersionId) -> CacheResult<PathBuf> {
        let mut sink = self.store.open_log(BUILD_LOG);
        BuildRunner::new(&self.store).compile(id, &mut sink)
    }
}

/// Normalizes `raw` and rejects identifiers that cannot name a directory
/// directly under the cache root.
fn resolve_id(raw: &str) -> CacheResult<VersionId> {
    let id = VersionId::normalize(raw);
    let name = id.as_str();
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(CacheError::InvalidVersionFormat(raw.to_string()));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Digest;
    use crate::http::testing::StubHttp;
    use crate::mirror::testing::StubHg;
    use crate::sink::DOWNLOAD_LOG;
    use assert_fs::TempDir;

    const HGTAGS: &str = "f1 go1.2\nf2 go1.3\nf3 release.r60\nf4 weekly.2011-01-01\n";

    fn engine(root: &Path, http: StubHttp, checksums: StaticChecksums, hg: StubHg) -> Engine {
        Engine::with_parts(
            CacheStore::new(root),
            Settings::default(),
            Box::new(http),
            Box::new(checksums),
            Box::new(hg),
        )
    }

    fn tags_feed() -> StubHttp {
        StubHttp::new().ok(&Settings::default().tags_url, HGTAGS)
    }

    #[test]
    fn resolve_id_rejects_path_like_input() {
        assert!(resolve_id("1.4").is_ok());
        for raw in ["", "../etc", "go1.4/../../x", ".hidden", "go1\\4"] {
            assert!(
                matches!(resolve_id(raw), Err(CacheError::InvalidVersionFormat(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn tags_lists_release_tags_only() {
        let temp = TempDir::new().unwrap();
        let engine = engine(
            temp.path(),
            tags_feed(),
            StaticChecksums::default(),
            StubHg::new(),
        );

        let tags: Vec<_> = engine
            .tags()
            .unwrap()
            .into_iter()
            .map(|t| t.to_string())
            .collect();
        assert_eq!(tags, vec!["go1.2", "go1.3", "release.r60"]);
    }

    #[test]
    fn mercurial_install_of_short_version() {
        let temp = TempDir::new().unwrap();
        let engine = engine(
            temp.path(),
            tags_feed(),
            StaticChecksums::default(),
            StubHg::new(),
        );

        let report = engine
            .install("1.3", Source::Mercurial, false, false)
            .unwrap();

        assert_eq!(report.version.as_str(), "go1.3");
        assert!(report.materialized);
        assert_eq!(report.artifact, None);
        assert_eq!(report.path, temp.path().join("go1.3"));
        assert!(temp.path().join("go1.3/go/REVISION").exists());
        assert!(temp.path().join("logs").join(MERCURIAL_LOG).exists());
    }

    #[test]
    fn mercurial_export_of_tip_skips_catalog() {
        let temp = TempDir::new().unwrap();
        let engine = engine(
            temp.path(),
            StubHttp::new(),
            StaticChecksums::default(),
            StubHg::new(),
        );

        let outcome = engine.export("tip", false).unwrap();

        assert_eq!(outcome, ExportOutcome::Exported(VersionId::normalize("tip")));
        assert_eq!(
            std::fs::read_to_string(temp.path().join("tip/go/REVISION")).unwrap(),
            "tip"
        );
    }

    #[test]
    fn pre_go1_release_resolves_to_release_tag() {
        let temp = TempDir::new().unwrap();
        let engine = engine(
            temp.path(),
            tags_feed(),
            StaticChecksums::default(),
            StubHg::new(),
        );

        let outcome = engine.export("60", false).unwrap();
        assert_eq!(outcome.version().as_str(), "release.r60");
    }

    #[test]
    fn archive_install_requires_registered_checksum() {
        let temp = TempDir::new().unwrap();
        let engine = engine(
            temp.path(),
            StubHttp::new(),
            StaticChecksums::default(),
            StubHg::new(),
        );

        let err = engine
            .install("1.4", Source::Archive, false, false)
            .unwrap_err();
        assert!(matches!(err, CacheError::UnknownVersion(v) if v == "go1.4"));
        assert!(!temp.path().join("go1.4").exists());
    }

    #[test]
    fn archive_install_uses_published_digest() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::default();
        let id = VersionId::normalize("1.4");
        let url = crate::archive::archive_url(&settings, &id).unwrap();
        let payload = {
            use flate2::Compression;
            use flate2::write::GzEncoder;
            let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
            let mut header = tar::Header::new_gnu();
            header.set_size(0);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "go/README", std::io::empty())
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap()
        };
        let index = format!(
            r#"[{{"version":"go1.4","stable":true,"files":[{{"filename":"go1.4.src.tar.gz","kind":"source","sha256":"{}"}}]}}]"#,
            Digest::compute(&payload)
        );
        let checksums = PublishedChecksums::new(
            StaticChecksums::default(),
            &settings.checksum_index_url,
            Box::new(StubHttp::new().ok(&settings.checksum_index_url, index)),
        );
        let engine = Engine::with_parts(
            CacheStore::new(temp.path()),
            settings,
            Box::new(StubHttp::new().ok(&url, payload)),
            Box::new(checksums),
            Box::new(StubHg::new()),
        );

        let report = engine.install("1.4", Source::Archive, false, false).unwrap();

        assert!(report.materialized);
        assert!(temp.path().join("go1.4/go/README").is_file());
    }

    #[test]
    fn forced_archive_install_of_unregistered_version_keeps_entry() {
        let temp = TempDir::new().unwrap();
        let engine = engine(
            temp.path(),
            StubHttp::new(),
            StaticChecksums::default(),
            StubHg::new(),
        );
        let id = VersionId::normalize("1.4");
        let artifact = engine.store().artifact_path(&id);
        std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        std::fs::write(&artifact, b"").unwrap();

        let err = engine
            .install("1.4", Source::Archive, true, false)
            .unwrap_err();

        assert!(matches!(err, CacheError::UnknownVersion(v) if v == "go1.4"));
        assert!(artifact.is_file());
        assert!(engine.store().is_compiled(&id));
    }

    #[test]
    fn cached_fetch_leaves_download_log_alone() {
        let temp = TempDir::new().unwrap();
        let engine = engine(
            temp.path(),
            StubHttp::new(),
            StaticChecksums::default(),
            StubHg::new(),
        );
        std::fs::create_dir_all(temp.path().join("go1.4/go/src")).unwrap();
        let log = temp.path().join("logs").join(DOWNLOAD_LOG);
        std::fs::create_dir_all(log.parent().unwrap()).unwrap();
        std::fs::write(&log, "previous download\n").unwrap();

        let outcome = engine.fetch_archive("1.4").unwrap();

        assert_eq!(outcome, FetchOutcome::AlreadyCached);
        assert_eq!(
            std::fs::read_to_string(&log).unwrap(),
            "previous download\n"
        );
    }

    #[test]
    fn installed_reflects_cache_contents() {
        let temp = TempDir::new().unwrap();
        let engine = engine(
            temp.path(),
            tags_feed(),
            StaticChecksums::default(),
            StubHg::new(),
        );

        engine.export("1.2", false).unwrap();
        engine.export("1.3", false).unwrap();

        let names: Vec<_> = engine
            .installed()
            .unwrap()
            .into_iter()
            .map(|e| e.version.to_string())
            .collect();
        assert_eq!(names, vec!["go1.2", "go1.3"]);
    }

    #[cfg(unix)]
    mod build {
        use super::*;
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use tar::{Builder, Header};

        /// Release archive whose bootstrap script produces `bin/go`.
        fn buildable_archive() -> Vec<u8> {
            let encoder = GzEncoder::new(Vec::new(), Compression::default());
            let mut builder = Builder::new(encoder);

            let script = b"#!/bin/sh\necho building\nmkdir -p ../bin && touch ../bin/go\n";
            let mut header = Header::new_gnu();
            header.set_size(script.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, "go/src/all.bash", script.as_slice())
                .unwrap();

            builder.into_inner().unwrap().finish().unwrap()
        }

        fn archive_engine(root: &Path, payload: &[u8]) -> Engine {
            let settings = Settings::default();
            let id = VersionId::normalize("1.4");
            let url = crate::archive::archive_url(&settings, &id).unwrap();
            let mut checksums = StaticChecksums::default();
            checksums.insert(id, Digest::compute(payload));
            engine(
                root,
                StubHttp::new().ok(&url, payload.to_vec()),
                checksums,
                StubHg::new(),
            )
        }

        #[test]
        #[serial_test::serial]
        fn archive_install_downloads_and_builds() {
            let temp = TempDir::new().unwrap();
            let payload = buildable_archive();
            let engine = archive_engine(temp.path(), &payload);

            let report = engine.install("1.4", Source::Archive, false, true).unwrap();

            assert!(report.materialized);
            assert_eq!(
                report.artifact,
                Some(engine.store().artifact_path(&report.version))
            );
            assert!(temp.path().join("logs").join(DOWNLOAD_LOG).exists());
            assert!(temp.path().join("logs").join(BUILD_LOG).exists());
        }

        #[test]
        #[serial_test::serial]
        fn reinstall_without_force_reuses_compiled_entry() {
            let temp = TempDir::new().unwrap();
            let payload = buildable_archive();
            let engine = archive_engine(temp.path(), &payload);
            engine.install("1.4", Source::Archive, false, true).unwrap();

            let marker = temp.path().join("go1.4/go/marker");
            std::fs::write(&marker, "kept").unwrap();
            let report = engine.install("go1.4", Source::Archive, false, true).unwrap();

            assert!(!report.materialized);
            assert!(report.artifact.is_some());
            assert!(marker.exists());
        }

        #[test]
        #[serial_test::serial]
        fn forced_reinstall_replaces_entry() {
            let temp = TempDir::new().unwrap();
            let payload = buildable_archive();
            let engine = archive_engine(temp.path(), &payload);
            engine.install("1.4", Source::Archive, false, false).unwrap();

            let marker = temp.path().join("go1.4/go/marker");
            std::fs::write(&marker, "stale").unwrap();
            let report = engine.install("1.4", Source::Archive, true, false).unwrap();

            assert!(report.materialized);
            assert!(!marker.exists());
            assert_eq!(report.artifact, None);
        }

        #[test]
        #[serial_test::serial]
        fn compile_after_fetch() {
            let temp = TempDir::new().unwrap();
            let payload = buildable_archive();
            let engine = archive_engine(temp.path(), &payload);

            assert!(matches!(
                engine.fetch_archive("1.4").unwrap(),
                FetchOutcome::Downloaded { .. }
            ));
            let artifact = engine.compile("1.4").unwrap();
            assert!(artifact.is_file());
        }
    }
}

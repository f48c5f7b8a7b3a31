//! Mercurial mirror of the upstream Go repository.
//!
//! A single clone lives at `<root>/mercurial`. It is created on first use,
//! refreshed with `hg pull` before every export and never deleted. Versions
//! are exported by cloning the mirror at the requested revision into the
//! version's cache entry.
//!
//! ```text
//!  Absent ──ensure_cloned──▶ Cloning ──ok──▶ Ready ──refresh/checkout──▶ Ready
//!     ▲                         │
//!     └──────────error──────────┘
//! ```

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Command;

use tracing::{debug, info, warn};

use crate::catalog;
use crate::config::Settings;
use crate::error::{CacheError, CacheResult};
use crate::http::HttpClient;
use crate::sink::LogSink;
use crate::store::CacheStore;
use crate::version::{self, VersionId};

/// Combined result of one Mercurial invocation.
#[derive(Debug, Clone, Default)]
pub struct HgOutput {
    /// Whether the process exited successfully.
    pub success: bool,
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Standard output followed by standard error.
    pub output: Vec<u8>,
}

impl HgOutput {
    /// Short description of a failed invocation for error messages.
    #[must_use]
    pub fn failure_summary(&self) -> String {
        let status = self
            .code
            .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit code {c}"));
        let text = String::from_utf8_lossy(&self.output);
        match text.trim().lines().last() {
            Some(last) if !last.is_empty() => format!("{status}: {last}"),
            _ => status,
        }
    }
}

/// Runs the Mercurial client.
pub trait HgRunner {
    /// Checks that the client is installed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::MissingDependency`] if it is not on `PATH`.
    fn locate(&self) -> CacheResult<()>;

    /// Runs the client with `args` and captures its output.
    ///
    /// # Errors
    ///
    /// Returns an error only if the process could not be started.
    fn run(&self, args: &[&OsStr]) -> std::io::Result<HgOutput>;
}

/// [`HgRunner`] that spawns the real `hg` executable.
#[derive(Debug, Clone)]
pub struct HgCommand {
    program: String,
}

impl HgCommand {
    /// Uses `program` as the Mercurial client.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl HgRunner for HgCommand {
    fn locate(&self) -> CacheResult<()> {
        which::which(&self.program)
            .map(|path| debug!(hg = %path.display(), "found mercurial client"))
            .map_err(|_| CacheError::MissingDependency {
                program: self.program.clone(),
            })
    }

    fn run(&self, args: &[&OsStr]) -> std::io::Result<HgOutput> {
        let output = Command::new(&self.program).args(args).output()?;
        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        Ok(HgOutput {
            success: output.status.success(),
            code: output.status.code(),
            output: combined,
        })
    }
}

/// Whether the shared clone is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    /// No clone, or the remains of a failed one.
    Absent,
    /// A complete clone exists.
    Ready,
}

/// What [`RepositoryMirror::export`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The entry already existed and `force` was not set; no checkout ran.
    AlreadyExported(VersionId),
    /// The revision was checked out into a fresh entry.
    Exported(VersionId),
}

impl ExportOutcome {
    /// The version the export resolved to.
    #[must_use]
    pub fn version(&self) -> &VersionId {
        match self {
            Self::AlreadyExported(id) | Self::Exported(id) => id,
        }
    }
}

/// The shared Mercurial clone and the exports made from it.
pub struct RepositoryMirror<'a> {
    store: &'a CacheStore,
    settings: &'a Settings,
    hg: &'a dyn HgRunner,
}

impl<'a> RepositoryMirror<'a> {
    /// Creates a mirror handle over the given collaborators.
    #[must_use]
    pub fn new(store: &'a CacheStore, settings: &'a Settings, hg: &'a dyn HgRunner) -> Self {
        Self {
            store,
            settings,
            hg,
        }
    }

    /// Current state of the shared clone.
    #[must_use]
    pub fn state(&self) -> MirrorState {
        if self.store.mirror_dir().join(".hg").is_dir() {
            MirrorState::Ready
        } else {
            MirrorState::Absent
        }
    }

    /// Clones the upstream repository unless the mirror is already ready.
    ///
    /// Returns `true` if a clone was made.
    ///
    /// # Errors
    ///
    /// - [`CacheError::MissingDependency`] if Mercurial is not installed
    /// - [`CacheError::Clone`] if the clone fails; the mirror stays absent
    pub fn ensure_cloned(&self, sink: &mut LogSink) -> CacheResult<bool> {
        if self.state() == MirrorState::Ready {
            return Ok(false);
        }

        self.hg.locate()?;

        let target = self.store.mirror_dir();
        if target.exists() {
            debug!(path = %target.display(), "removing incomplete mirror");
            std::fs::remove_dir_all(&target)
                .map_err(|e| CacheError::Clone(format!("cannot remove {}: {e}", target.display())))?;
        }
        std::fs::create_dir_all(self.store.root()).map_err(|e| {
            CacheError::Clone(format!("cannot create {}: {e}", self.store.root().display()))
        })?;

        info!(url = %self.settings.repository_url, "downloading Go source from mercurial");
        let url = OsString::from(&self.settings.repository_url);
        let output = self
            .invoke(&[OsStr::new("clone"), &url, target.as_os_str()], sink)
            .map_err(|e| CacheError::Clone(e.to_string()))?;

        if !output.success {
            // hg normally cleans up after itself; make sure the state is Absent.
            if let Err(e) = remove_entry(&target) {
                warn!(path = %target.display(), error = %e, "failed to remove partial mirror");
            }
            return Err(CacheError::Clone(output.failure_summary()));
        }
        Ok(true)
    }

    /// Pulls new history into the mirror before `revision` is exported.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Pull`] if `hg pull` fails.
    pub fn refresh(&self, revision: &str, sink: &mut LogSink) -> CacheResult<()> {
        info!(revision, "checking mirror for revision");
        let target = self.store.mirror_dir();
        let output = self
            .invoke(&[OsStr::new("pull"), OsStr::new("-R"), target.as_os_str()], sink)
            .map_err(|e| CacheError::Pull(e.to_string()))?;

        if !output.success {
            return Err(CacheError::Pull(output.failure_summary()));
        }
        Ok(())
    }

    /// Replaces the entry for `id` with a checkout of `revision`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Export`] if the old entry cannot be removed or the
    /// checkout fails. A failed checkout may leave a partial entry behind.
    pub fn checkout(&self, id: &VersionId, revision: &str, sink: &mut LogSink) -> CacheResult<()> {
        let entry = self.store.entry_dir(id);
        remove_entry(&entry).map_err(|e| CacheError::export(id.as_str(), e.to_string()))?;
        std::fs::create_dir_all(&entry).map_err(|e| {
            CacheError::export(id.as_str(), format!("cannot create {}: {e}", entry.display()))
        })?;

        info!(version = %id, revision, "copying source");
        let source = self.store.mirror_dir();
        let destination = self.store.source_dir(id);
        let output = self
            .invoke(
                &[
                    OsStr::new("clone"),
                    OsStr::new("-u"),
                    OsStr::new(revision),
                    source.as_os_str(),
                    destination.as_os_str(),
                ],
                sink,
            )
            .map_err(|e| CacheError::export(id.as_str(), e.to_string()))?;

        if !output.success {
            return Err(CacheError::export(id.as_str(), output.failure_summary()));
        }
        Ok(())
    }

    /// Resolves `raw` and exports it from the mirror.
    ///
    /// `tip` bypasses the tag catalog. Any other version must be listed in
    /// the catalog at `settings.tags_url`. With `force` unset an existing
    /// entry is left untouched; with `force` set it is deleted and checked
    /// out again.
    ///
    /// # Errors
    ///
    /// - [`CacheError::CatalogUnavailable`] if the tag feed cannot be fetched
    /// - [`CacheError::InvalidVersionFormat`] / [`CacheError::NotFound`] if
    ///   `raw` does not resolve
    /// - any error from [`Self::ensure_cloned`], [`Self::refresh`] or
    ///   [`Self::checkout`]
    pub fn export(
        &self,
        raw: &str,
        force: bool,
        http: &dyn HttpClient,
        sink: &mut LogSink,
    ) -> CacheResult<ExportOutcome> {
        let id = VersionId::normalize(raw);

        let revision = if id.is_tip() {
            version::TIP.to_string()
        } else {
            let tags = catalog::fetch_tags(http, &self.settings.tags_url)
                .map_err(|e| CacheError::CatalogUnavailable(Box::new(e)))?;
            version::lookup(&id, &tags)?.revision(&tags).to_string()
        };

        self.ensure_cloned(sink)?;
        self.refresh(&revision, sink)?;

        if self.store.exists(&id) && !force {
            debug!(version = %id, "already exported, skipping checkout");
            return Ok(ExportOutcome::AlreadyExported(id));
        }

        self.checkout(&id, &revision, sink)?;
        Ok(ExportOutcome::Exported(id))
    }

    /// Runs hg, appending the command line and its output to `sink`.
    fn invoke(&self, args: &[&OsStr], sink: &mut LogSink) -> std::io::Result<HgOutput> {
        let line = args
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        debug!(command = %line, "running hg");
        sink.write_line(&format!("$ hg {line}"));

        let output = self.hg.run(args)?;
        sink.write(&output.output);
        Ok(output)
    }
}

fn remove_entry(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted stand-in for the Mercurial client.

    use std::cell::RefCell;
    use std::ffi::OsStr;
    use std::path::Path;

    use super::{HgOutput, HgRunner};
    use crate::error::{CacheError, CacheResult};

    /// Records invocations and simulates clone/pull on the filesystem.
    /// A failing mirror clone leaves a partial directory behind.
    #[derive(Default)]
    pub struct StubHg {
        pub calls: RefCell<Vec<Vec<String>>>,
        pub missing: bool,
        pub fail: Option<&'static str>,
    }

    impl StubHg {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(subcommand: &'static str) -> Self {
            Self {
                fail: Some(subcommand),
                ..Self::default()
            }
        }

        /// Invocations whose first argument is `subcommand`.
        pub fn calls_to(&self, subcommand: &str) -> Vec<Vec<String>> {
            self.calls
                .borrow()
                .iter()
                .filter(|c| c.first().is_some_and(|s| s == subcommand))
                .cloned()
                .collect()
        }

        /// `clone -u <rev> <src> <dest>` invocations.
        pub fn checkouts(&self) -> Vec<Vec<String>> {
            self.calls_to("clone")
                .into_iter()
                .filter(|c| c.get(1).is_some_and(|a| a == "-u"))
                .collect()
        }
    }

    impl HgRunner for StubHg {
        fn locate(&self) -> CacheResult<()> {
            if self.missing {
                return Err(CacheError::MissingDependency {
                    program: "hg".to_string(),
                });
            }
            Ok(())
        }

        fn run(&self, args: &[&OsStr]) -> std::io::Result<HgOutput> {
            let args: Vec<String> = args
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect();
            self.calls.borrow_mut().push(args.clone());

            if self.fail == args.first().map(String::as_str) {
                if let [cmd, _url, dest] = args.as_slice()
                    && cmd == "clone"
                {
                    std::fs::create_dir_all(Path::new(dest).join("partial"))?;
                }
                return Ok(HgOutput {
                    success: false,
                    code: Some(255),
                    output: b"abort: repository not found\n".to_vec(),
                });
            }

            match args.as_slice() {
                [cmd, _url, dest] if cmd == "clone" => {
                    std::fs::create_dir_all(Path::new(dest).join(".hg"))?;
                }
                [cmd, flag, rev, _src, dest] if cmd == "clone" && flag == "-u" => {
                    let dest = Path::new(dest);
                    std::fs::create_dir_all(dest.join("src"))?;
                    std::fs::write(dest.join("REVISION"), rev)?;
                }
                _ => {}
            }

            Ok(HgOutput {
                success: true,
                code: Some(0),
                output: format!("{}\n", args.join(" ")).into_bytes(),
            })
        }
    }
}

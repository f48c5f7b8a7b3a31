//! Bootstrap build of a prepared source tree.
//!
//! The Go distribution builds itself with `src/all.bash` (`all.bat` on
//! Windows). Its exit status is unreliable across historical releases: test
//! failures after a complete toolchain build still exit non-zero. Success is
//! therefore decided by the presence of `go/bin/go` alone.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{info, warn};

use crate::error::{CacheError, CacheResult};
use crate::sink::LogSink;
use crate::store::CacheStore;
use crate::version::VersionId;

#[cfg(not(windows))]
const BOOTSTRAP_SCRIPT: &str = "./all.bash";
#[cfg(windows)]
const BOOTSTRAP_SCRIPT: &str = "all.bat";

/// Runs the bootstrap script for cache entries.
#[derive(Debug, Clone, Copy)]
pub struct BuildRunner<'a> {
    store: &'a CacheStore,
}

impl<'a> BuildRunner<'a> {
    #[must_use]
    pub fn new(store: &'a CacheStore) -> Self {
        Self { store }
    }

    /// Builds the tree at `<root>/<id>/go` and returns the artifact path.
    ///
    /// The script runs with `<root>/<id>/go/src` as its working directory;
    /// the working directory of this process is never changed. Standard
    /// output is streamed line by line to `sink` and to the `info` log.
    /// Standard error goes to `sink` when it is enabled.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Chdir`] if the source tree does not exist
    /// - [`CacheError::BuildProcess`] if the script cannot be started or its
    ///   output cannot be read
    /// - [`CacheError::ArtifactMissing`] if no `go` binary was produced
    pub fn compile(&self, id: &VersionId, sink: &mut LogSink) -> CacheResult<PathBuf> {
        let dir = self.store.build_dir(id);
        match std::fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(CacheError::Chdir {
                    path: dir,
                    source: std::io::Error::other("not a directory"),
                });
            }
            Err(source) => return Err(CacheError::Chdir { path: dir, source }),
        }

        info!(version = %id, "compiling");
        sink.write_line(&format!("$ cd {} && {BOOTSTRAP_SCRIPT}", dir.display()));

        let stderr = sink
            .try_clone_file()
            .map_or_else(Stdio::inherit, Stdio::from);
        let mut child = bootstrap_command()
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(stderr)
            .spawn()
            .map_err(|e| CacheError::build_process(id.as_str(), e.to_string()))?;

        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(CacheError::build_process(
                            id.as_str(),
                            format!("reading build output: {e}"),
                        ));
                    }
                };
                info!(target: "vengo_cache::build::output", "{line}");
                sink.write_line(&line);
            }
        }

        let status = child
            .wait()
            .map_err(|e| CacheError::build_process(id.as_str(), e.to_string()))?;
        sink.write_line(&format!("bootstrap finished: {status}"));
        if !status.success() {
            warn!(version = %id, %status, "bootstrap script exited unsuccessfully");
        }

        let artifact = self.store.artifact_path(id);
        if !artifact.is_file() {
            return Err(CacheError::ArtifactMissing {
                version: id.to_string(),
                artifact,
            });
        }

        info!(version = %id, artifact = %artifact.display(), "compiled");
        Ok(artifact)
    }
}

#[cfg(not(windows))]
fn bootstrap_command() -> Command {
    Command::new(BOOTSTRAP_SCRIPT)
}

#[cfg(windows)]
fn bootstrap_command() -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", BOOTSTRAP_SCRIPT]);
    command
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use std::os::unix::fs::PermissionsExt;

    fn prepare(store: &CacheStore, id: &VersionId, script: &str) {
        let dir = store.build_dir(id);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("all.bash");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    const PRODUCES_BINARY: &str = "#!/bin/sh\n\
        echo building toolchain\n\
        echo warning from tests >&2\n\
        mkdir -p ../bin && touch ../bin/go\n\
        exit 1\n";

    #[test]
    #[serial_test::serial]
    fn artifact_decides_success_despite_exit_status() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());
        let id = VersionId::normalize("1.4");
        prepare(&store, &id, PRODUCES_BINARY);

        let artifact = BuildRunner::new(&store)
            .compile(&id, &mut LogSink::disabled())
            .unwrap();
        assert_eq!(artifact, store.artifact_path(&id));
    }

    #[test]
    #[serial_test::serial]
    fn clean_exit_without_binary_is_artifact_missing() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());
        let id = VersionId::normalize("1.4");
        prepare(&store, &id, "#!/bin/sh\necho nothing to do\nexit 0\n");

        let err = BuildRunner::new(&store)
            .compile(&id, &mut LogSink::disabled())
            .unwrap_err();
        assert!(matches!(err, CacheError::ArtifactMissing { ref version, .. } if version == "go1.4"));
    }

    #[test]
    fn missing_tree_is_chdir_error() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());
        let id = VersionId::normalize("1.2");

        let err = BuildRunner::new(&store)
            .compile(&id, &mut LogSink::disabled())
            .unwrap_err();
        assert!(matches!(err, CacheError::Chdir { ref path, .. } if *path == store.build_dir(&id)));
    }

    #[test]
    #[serial_test::serial]
    fn output_is_recorded_in_log() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());
        let id = VersionId::normalize("1.4");
        prepare(&store, &id, PRODUCES_BINARY);

        let mut sink = store.open_log(crate::sink::BUILD_LOG);
        BuildRunner::new(&store).compile(&id, &mut sink).unwrap();
        drop(sink);

        let log = std::fs::read_to_string(store.logs_dir().join(crate::sink::BUILD_LOG)).unwrap();
        assert!(log.contains("building toolchain"));
        assert!(log.contains("warning from tests"));
        assert!(log.contains("bootstrap finished"));
    }

    #[test]
    #[serial_test::serial]
    fn script_runs_in_source_directory() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path());
        let id = VersionId::normalize("1.3");
        prepare(
            &store,
            &id,
            "#!/bin/sh\npwd > ../cwd.txt\nmkdir -p ../bin && touch ../bin/go\n",
        );
        let before = std::env::current_dir().unwrap();

        BuildRunner::new(&store)
            .compile(&id, &mut LogSink::disabled())
            .unwrap();

        let recorded = std::fs::read_to_string(store.source_dir(&id).join("cwd.txt")).unwrap();
        let expected = std::fs::canonicalize(store.build_dir(&id)).unwrap();
        assert_eq!(std::fs::canonicalize(recorded.trim()).unwrap(), expected);
        assert_eq!(std::env::current_dir().unwrap(), before);
    }
}

//! Per-operation transcript files.
//!
//! Each top-level operation opens its own [`LogSink`] and passes it down to
//! the components it drives. Failing to open a log is not an error: the sink
//! is simply disabled and the operation carries on.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

/// Transcript written by the Mercurial mirror.
pub const MERCURIAL_LOG: &str = "mercurial-go.log";

/// Transcript written while downloading and unpacking archives.
pub const DOWNLOAD_LOG: &str = "download-go.log";

/// Transcript of the bootstrap build.
pub const BUILD_LOG: &str = "build-go.log";

/// Append-only log file, possibly disabled.
#[derive(Debug, Default)]
pub struct LogSink {
    file: Option<File>,
    path: Option<PathBuf>,
}

impl LogSink {
    /// A sink that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Opens `dir/name` truncated, creating `dir` on first use.
    ///
    /// Never fails; on error the returned sink is disabled.
    #[must_use]
    pub fn open(dir: &Path, name: &str) -> Self {
        let path = dir.join(name);
        let file = match open_truncated(&path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                std::fs::create_dir_all(dir).and_then(|()| open_truncated(&path))
            }
            other => other,
        };

        match file {
            Ok(file) => Self {
                file: Some(file),
                path: Some(path),
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "can't open log file, logging disabled");
                Self::disabled()
            }
        }
    }

    /// Whether output is actually being recorded.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    /// Location of the log file, if open.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends raw bytes.
    pub fn write(&mut self, data: &[u8]) {
        if let Some(file) = self.file.as_mut()
            && let Err(e) = file.write_all(data)
        {
            warn!(error = %e, "failed writing to log file, logging disabled");
            self.file = None;
        }
    }

    /// Appends `line` followed by a newline.
    pub fn write_line(&mut self, line: &str) {
        self.write(line.as_bytes());
        self.write(b"\n");
    }

    /// A second handle on the same file, e.g. to hand to a child's stderr.
    #[must_use]
    pub fn try_clone_file(&self) -> Option<File> {
        self.file.as_ref().and_then(|f| f.try_clone().ok())
    }
}

fn open_truncated(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

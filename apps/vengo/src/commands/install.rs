//! Install command for the vengo CLI.
//!
//! ## Usage
//!
//! ```bash
//! vengo install 1.4                       # archive, then build
//! vengo install go1.3 --no-build          # source tree only
//! vengo install tip --source mercurial    # export from the mirror
//! vengo install 1.4 --force               # discard the existing entry first
//! ```

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use vengo_cache::{Engine, Source};

/// Where to take the source tree from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    /// Official source archive, checksum verified.
    Archive,
    /// Checkout from the Mercurial mirror.
    Mercurial,
}

impl From<SourceArg> for Source {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Archive => Source::Archive,
            SourceArg::Mercurial => Source::Mercurial,
        }
    }
}

/// Arguments for the install command.
#[derive(Args)]
pub struct InstallArgs {
    /// Version to install (e.g. "1.4", "go1.3", "60" or "tip").
    pub version: String,

    /// Source backend.
    #[arg(long, value_enum, default_value_t = SourceArg::Archive)]
    pub source: SourceArg,

    /// Replace an existing entry instead of reusing it.
    #[arg(short, long)]
    pub force: bool,

    /// Prepare the source tree without building it.
    #[arg(long)]
    pub no_build: bool,
}

/// Executes the install command.
///
/// # Errors
///
/// Returns the engine error if resolution, download, export or the build
/// fails.
pub fn execute(engine: &Engine, args: &InstallArgs) -> Result<()> {
    let source = Source::from(args.source);
    println!("Installing Go {} from {source}...", args.version);

    let report = engine
        .install(&args.version, source, args.force, !args.no_build)
        .with_context(|| format!("failed to install Go {}", args.version))?;

    if report.materialized {
        println!("Prepared {} in {}", report.version, report.path.display());
    } else {
        println!("{} is already in the cache", report.version);
    }

    match report.artifact {
        Some(artifact) => println!("Go {} is ready: {}", report.version, artifact.display()),
        None if args.no_build => {
            println!(
                "Build skipped. Run 'vengo install {}' to build it.",
                report.version
            );
        }
        None => {}
    }
    Ok(())
}

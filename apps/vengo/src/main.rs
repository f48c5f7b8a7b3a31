#![warn(clippy::pedantic)]

//! # vengo
//!
//! Command-line front end over the `vengo-cache` engine. It installs Go
//! toolchains into a per-version cache, either from the official source
//! archives or from a Mercurial mirror of the Go repository, and builds them.
//!
//! ## Subcommands
//!
//! - `install` - Download or export a version and build it
//! - `tags` - List release tags published upstream
//! - `list` - List installed and available versions
//!
//! ## Examples
//!
//! ```bash
//! vengo install 1.4
//! vengo install tip --source mercurial
//! vengo list --all --json
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{install, list, tags};
use tracing_subscriber::EnvFilter;
use vengo_cache::{CacheError, Engine};

/// Exit code for failures after which the engine cannot continue.
const FATAL_EXIT_CODE: i32 = 2;

/// Go toolchain version manager.
#[derive(Parser)]
#[command(
    name = "vengo",
    author,
    version,
    about = "Install and build Go toolchains in a local cache",
    after_help = "\
ENVIRONMENT VARIABLES:
    VENGO_HOME              Cache root (default: ~/.vengo)
    VENGO_TAGS_URL          Release tag feed URL
    VENGO_ARCHIVE_HOST      Host serving source archives
    RUST_LOG                Log filter, overrides -v"
)]
pub struct Cli {
    /// Cache root, overriding `VENGO_HOME`.
    #[arg(long = "cache-dir", global = true, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for the vengo CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// Install a Go version.
    ///
    /// Materializes the source tree from a release archive (default) or the
    /// Mercurial mirror, then runs the bootstrap build.
    Install(install::InstallArgs),

    /// List release tags published upstream.
    Tags,

    /// List installed and available Go versions.
    List(list::ListArgs),
}

fn main() {
    if let Err(e) = run() {
        let exit_code = handle_error(&e);
        std::process::exit(exit_code);
    }
}

/// Prints the error and picks the exit code.
///
/// Engine errors classified as fatal exit with [`FATAL_EXIT_CODE`]; all other
/// failures exit with 1.
fn handle_error(e: &anyhow::Error) -> i32 {
    eprintln!("Error: {e:?}");
    match e.downcast_ref::<CacheError>() {
        Some(err) if err.is_fatal() => FATAL_EXIT_CODE,
        _ => 1,
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let engine = Engine::open(cli.cache_dir.as_deref())?;
    tracing::debug!(root = %engine.store().root().display(), "using cache root");

    match cli.command {
        Commands::Install(args) => install::execute(&engine, &args),
        Commands::Tags => tags::execute(&engine),
        Commands::List(args) => list::execute(&engine, &args),
    }
}

/// Logs go to stderr so `list --json` output stays machine readable.
fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("vengo=warn,vengo_cache=warn"),
        1 => EnvFilter::new("vengo=info,vengo_cache=info"),
        _ => EnvFilter::new("vengo=debug,vengo_cache=debug"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

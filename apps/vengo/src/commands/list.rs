//! List command for the vengo CLI.
//!
//! ## Usage
//!
//! ```bash
//! vengo list                      # installed versions
//! vengo list -n                   # installed, then available upstream
//! vengo list -n --installed=false # available upstream only
//! vengo list -a -j                # both, as JSON
//! ```
//!
//! ## Output Format
//!
//! ```text
//! Installed Go versions:
//!   go1.3
//!   go1.4    (compiled)
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args};
use serde::Serialize;
use vengo_cache::{CacheEntry, Engine};

/// Arguments for the list command.
#[derive(Args)]
pub struct ListArgs {
    /// Show installed and available versions.
    #[arg(short, long)]
    pub all: bool,

    /// Show installed versions (on by default; `--installed=false` hides them).
    #[arg(
        short,
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = true,
        default_missing_value = "true"
    )]
    pub installed: bool,

    /// Show available versions that are not installed.
    #[arg(short, long = "non-installed")]
    pub non_installed: bool,

    /// Print JSON instead of text.
    #[arg(short, long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct InstalledVersion {
    version: String,
    path: PathBuf,
    compiled: bool,
}

impl From<CacheEntry> for InstalledVersion {
    fn from(entry: CacheEntry) -> Self {
        Self {
            version: entry.version.to_string(),
            path: entry.path,
            compiled: entry.compiled,
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct Listing {
    #[serde(skip_serializing_if = "Option::is_none")]
    installed: Option<Vec<InstalledVersion>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<Vec<String>>,
}

/// Executes the list command.
///
/// Only the available listing needs the network.
///
/// # Errors
///
/// Returns an error if the cache root cannot be read or, when available
/// versions are requested, the tag feed cannot be fetched.
pub fn execute(engine: &Engine, args: &ListArgs) -> Result<()> {
    let show_installed = args.all || args.installed;
    let show_available = args.all || args.non_installed;

    let entries = engine.installed().context("failed to read the cache")?;

    let mut listing = Listing::default();
    if show_available {
        let tags = engine.tags().context("failed to fetch available versions")?;
        listing.available = Some(
            tags.into_iter()
                .filter(|tag| !entries.iter().any(|e| &e.version == tag))
                .map(|tag| tag.to_string())
                .collect(),
        );
    }
    if show_installed {
        listing.installed = Some(entries.into_iter().map(InstalledVersion::from).collect());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        print_text(&listing);
    }
    Ok(())
}

fn print_text(listing: &Listing) {
    if let Some(installed) = &listing.installed {
        if installed.is_empty() {
            println!("No Go versions installed.");
            println!();
            println!("Run 'vengo install <version>' to install one.");
        } else {
            println!("Installed Go versions:");
            for item in installed {
                if item.compiled {
                    println!("  {:<12} (compiled)", item.version);
                } else {
                    println!("  {}", item.version);
                }
            }
        }
    }

    if let Some(available) = &listing.available {
        if listing.installed.is_some() {
            println!();
        }
        println!("Available Go versions:");
        for version in available {
            println!("  {version}");
        }
    }
}

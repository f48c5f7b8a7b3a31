//! Command modules for the vengo CLI.
//!
//! - [`install`] - Install and build a Go version
//! - [`tags`] - List upstream release tags
//! - [`list`] - List installed and available versions

pub mod install;
pub mod list;
pub mod tags;

//! Go version identifiers.
//!
//! Users spell releases in several ways (`1.3`, `go1.3`, `60`, `release.r60`).
//! [`VersionId::normalize`] maps them onto the tag names used upstream by
//! running an ordered rule table; the first matching rule wins.
//!
//! | # | Input starts with   | Result                |
//! |---|---------------------|-----------------------|
//! | 1 | `go`                | unchanged             |
//! | 2 | `1`                 | `go` + input          |
//! | 3 | `release`           | unchanged             |
//! | 4 | `5` or `6`          | `release.r` + input   |
//! | - | anything else       | unchanged             |
//!
//! Every rewritten value matches rule 1 or rule 3, so normalization is
//! idempotent.

use std::fmt;

use semver::{Prerelease, Version};

use crate::error::{CacheError, CacheResult};

/// Sentinel request for the newest revision in the mirror.
pub const TIP: &str = "tip";

/// Prefix of tags from the `go1` series onward.
pub const GO_PREFIX: &str = "go";

/// Prefix of the pre-Go1 weekly/release tags.
pub const RELEASE_PREFIX: &str = "release";

/// What a matching rule does to its input.
#[derive(Debug, Clone, Copy)]
enum Rewrite {
    Keep,
    Prefix(&'static str),
}

/// A single normalization rule.
#[derive(Debug)]
struct Rule {
    starts_with: &'static [&'static str],
    rewrite: Rewrite,
}

impl Rule {
    fn matches(&self, raw: &str) -> bool {
        self.starts_with.iter().any(|p| raw.starts_with(p))
    }

    fn apply(&self, raw: &str) -> String {
        match self.rewrite {
            Rewrite::Keep => raw.to_string(),
            Rewrite::Prefix(prefix) => format!("{prefix}{raw}"),
        }
    }
}

/// Normalization rules in precedence order.
const RULES: &[Rule] = &[
    Rule {
        starts_with: &[GO_PREFIX],
        rewrite: Rewrite::Keep,
    },
    Rule {
        starts_with: &["1"],
        rewrite: Rewrite::Prefix(GO_PREFIX),
    },
    Rule {
        starts_with: &[RELEASE_PREFIX],
        rewrite: Rewrite::Keep,
    },
    Rule {
        starts_with: &["5", "6"],
        rewrite: Rewrite::Prefix("release.r"),
    },
];

/// A normalized Go release identifier, e.g. `go1.3` or `release.r60`.
///
/// Ordering is plain string ordering, which is the order the tag catalog is
/// sorted in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionId(String);

impl VersionId {
    /// Normalizes a user supplied version string.
    ///
    /// Inputs no rule recognises are kept as they are; [`lookup`] rejects
    /// them later if they lack a known prefix.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        let normalized = RULES
            .iter()
            .find(|rule| rule.matches(raw))
            .map_or_else(|| raw.to_string(), |rule| rule.apply(raw));
        Self(normalized)
    }

    /// Wraps a tag taken verbatim from the upstream feed.
    #[must_use]
    pub fn from_tag(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the tip sentinel.
    #[must_use]
    pub fn is_tip(&self) -> bool {
        self.0 == TIP
    }

    /// Whether the identifier uses the `go` or `release` naming scheme.
    #[must_use]
    pub fn has_known_prefix(&self) -> bool {
        self.0.starts_with(GO_PREFIX) || self.0.starts_with(RELEASE_PREFIX)
    }

    /// The numeric part used in release archive names (`go1.4rc1` → `1.4rc1`).
    ///
    /// Pre-Go1 `release` tags were never published as archives and yield `None`.
    #[must_use]
    pub fn archive_number(&self) -> Option<&str> {
        self.0
            .strip_prefix(GO_PREFIX)
            .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
    }

    /// Parses the archive number as a semantic version.
    ///
    /// Missing components are padded with zeros and an alphabetic suffix
    /// (`rc1`, `beta2`) becomes the pre-release, so `go1.4rc1` sorts before
    /// `go1.4`.
    #[must_use]
    pub fn release(&self) -> Option<Version> {
        let number = self.archive_number()?;
        let split = number
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(number.len());
        let (numeric, suffix) = number.split_at(split);

        let mut parts = [0u64; 3];
        for (slot, part) in parts.iter_mut().zip(numeric.split('.')) {
            *slot = part.parse().ok()?;
        }
        if numeric.split('.').count() > 3 {
            return None;
        }

        let mut version = Version::new(parts[0], parts[1], parts[2]);
        if !suffix.is_empty() {
            version.pre = Prerelease::new(suffix).ok()?;
        }
        Some(version)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VersionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Result of resolving a version against the tag catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Position of the matching tag in the catalog.
    ByIndex(usize),
    /// The tip sentinel; the catalog was not consulted.
    Tip,
}

impl Lookup {
    /// The revision name to hand to Mercurial.
    ///
    /// # Panics
    ///
    /// Panics if `catalog` is not the slice this lookup was computed from.
    #[must_use]
    pub fn revision<'a>(&self, catalog: &'a [VersionId]) -> &'a str {
        match self {
            Self::ByIndex(index) => catalog[*index].as_str(),
            Self::Tip => TIP,
        }
    }
}

/// Finds `id` in `catalog` by exact match.
///
/// # Errors
///
/// - [`CacheError::InvalidVersionFormat`] if `id` is neither `tip` nor uses a
///   known naming prefix
/// - [`CacheError::NotFound`] if the catalog has no such tag
pub fn lookup(id: &VersionId, catalog: &[VersionId]) -> CacheResult<Lookup> {
    if id.is_tip() {
        return Ok(Lookup::Tip);
    }
    if !id.has_known_prefix() {
        return Err(CacheError::InvalidVersionFormat(id.to_string()));
    }
    catalog
        .iter()
        .position(|tag| tag == id)
        .map(Lookup::ByIndex)
        .ok_or_else(|| CacheError::NotFound(id.to_string()))
}

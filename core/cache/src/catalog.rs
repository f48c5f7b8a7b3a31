//! Release tag catalog.
//!
//! The upstream repository publishes its `.hgtags` file, one
//! `<changeset> <tag>` pair per line. Only release tags (`go1*` and the
//! pre-Go1 `release.*` series) are kept; weekly snapshots and other tags are
//! ignored.

use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};
use crate::http::HttpClient;
use crate::version::{RELEASE_PREFIX, VersionId};

/// Prefix shared by every Go1-era release tag.
const GO1_PREFIX: &str = "go1";

/// Fetches the tag feed at `url` and returns the release tags in ascending
/// string order.
///
/// A `400` is treated as the upstream being unusable. Any other non-success
/// status yields an empty catalog, so a later lookup reports the version as
/// not found instead of failing on the network.
///
/// # Errors
///
/// - [`CacheError::Network`] if the request cannot be made
/// - [`CacheError::UpstreamUnavailable`] if the server answers `400`
/// - [`CacheError::UpstreamFormat`] if a line lacks a tag field
pub fn fetch_tags(http: &dyn HttpClient, url: &str) -> CacheResult<Vec<VersionId>> {
    debug!(url, "fetching tag catalog");
    let response = http.get(url)?;

    if !response.is_success() {
        if response.status == 400 {
            return Err(CacheError::UpstreamUnavailable {
                url: url.to_string(),
                status: response.status_line(),
            });
        }
        warn!(url, status = %response.status_line(), "tag feed unavailable, treating as empty");
        return Ok(Vec::new());
    }

    let tags = parse_tags(&String::from_utf8_lossy(&response.body))?;
    debug!(count = tags.len(), "parsed release tags");
    Ok(tags)
}

/// Extracts the release tags from `.hgtags` content, sorted ascending.
///
/// # Errors
///
/// Returns [`CacheError::UpstreamFormat`] for a non-blank line with fewer
/// than two fields.
pub fn parse_tags(feed: &str) -> CacheResult<Vec<VersionId>> {
    let mut tags = Vec::new();

    for (number, line) in feed.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let tag = line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| CacheError::UpstreamFormat {
                line: number + 1,
                content: line.to_string(),
            })?;

        if tag.starts_with(RELEASE_PREFIX) || tag.starts_with(GO1_PREFIX) {
            tags.push(VersionId::from_tag(tag));
        }
    }

    tags.sort();
    tags.dedup();
    Ok(tags)
}

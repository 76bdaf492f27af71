//! Policy version ordering helpers.
//!
//! Publish requires the new version to be strictly greater than the lineage's
//! `previous_version` by semantic-version compare. An empty previous version
//! (nothing published yet) orders below every valid version.

use semver::Version;

/// True when `version` is a well-formed `major.minor.patch` version.
pub fn check_version_format(version: &str) -> bool {
    Version::parse(version).is_ok()
}

/// Three-way semantic compare: 1 if `a > b`, 0 if equal, -1 if `a < b`.
///
/// An empty or unparseable `b` is treated as the lowest possible version so
/// a first publish always passes the strictly-greater gate.
pub fn version_compare(a: &str, b: &str) -> i32 {
    let a = Version::parse(a).ok();
    let b = Version::parse(b).ok();
    match (a, b) {
        (Some(a), Some(b)) => {
            if a > b {
                1
            } else if a < b {
                -1
            } else {
                0
            }
        }
        (Some(_), None) => 1,
        (None, Some(_)) => -1,
        (None, None) => 0,
    }
}

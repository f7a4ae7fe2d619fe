//! Platform versioning utilities
//!
//! Access manager releases use up to four numeric components (`6.5.2.3`),
//! optionally followed by a build qualifier (`7.2.0-2022-6-SNAPSHOT`).

use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A platform release as reported by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformVersion {
    /// Numeric release, e.g. "6.5.2.3"
    pub release: String,
    /// First three components as a semantic version
    pub version: Version,
    /// Fourth component, 0 when absent
    pub hotfix: u64,
}

impl PlatformVersion {
    /// Create from a version string
    pub fn parse(version_str: &str) -> Result<Self, semver::Error> {
        // Strip leading 'v' if present
        let version_str = version_str.trim();
        let version_str = version_str.strip_prefix('v').unwrap_or(version_str);

        let release: String = version_str
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let release = release.trim_end_matches('.').to_string();

        let mut components: Vec<&str> = release.split('.').collect();
        let hotfix = if components.len() > 3 {
            components[3..].join("").parse().unwrap_or(0)
        } else {
            0
        };
        components.truncate(3);
        while components.len() < 3 {
            components.push("0");
        }
        let version = Version::parse(&components.join("."))?;

        Ok(Self {
            release,
            version,
            hotfix,
        })
    }

    /// Key used to look up the stock node catalog
    pub fn release(&self) -> &str {
        &self.release
    }

    /// Check if both versions share major and minor
    pub fn same_minor(&self, other: &PlatformVersion) -> bool {
        self.version.major == other.version.major && self.version.minor == other.version.minor
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.release)
    }
}

impl PartialEq for PlatformVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PlatformVersion {}

impl PartialOrd for PlatformVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PlatformVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version
            .cmp(&other.version)
            .then(self.hotfix.cmp(&other.hotfix))
    }
}

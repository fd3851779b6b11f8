//! Version parsing and ordering.
//!
//! Upstream release ids ("2.54.0") and bundle patch directories ("4.19.5")
//! are semver-like. Ordering matters in two places: picking the highest
//! patch directory under a minor-version track, and ranking candidate
//! filenames when a listing matches more than one.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VersionError {
    #[error("invalid version format: {0}")]
    InvalidFormat(String),
}

/// A semantic version with major, minor, patch, and optional prerelease.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
        }
    }

    /// Check if this version is on the same major.minor track as another.
    pub fn is_compatible_with(&self, other: &Version) -> bool {
        self.major == other.major && self.minor == other.minor
    }

    /// Extract the first dotted numeric run embedded in a string.
    ///
    /// Filenames like `crc_libvirt_4.19.5_amd64.crcbundle` embed their
    /// version mid-string; this finds `4.19.5`. Returns `None` when no
    /// dotted run exists.
    pub fn find_in(s: &str) -> Option<Version> {
        let bytes = s.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i].is_ascii_digit() {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let run = s[start..i].trim_matches('.');
                if run.contains('.') {
                    if let Ok(v) = run.parse() {
                        return Some(v);
                    }
                }
            } else {
                i += 1;
            }
        }
        None
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionError::InvalidFormat("empty version".to_string()));
        }

        // Split off prerelease (-alpha, -beta, -rc1, etc.)
        let (version_part, prerelease) = if let Some(idx) = s.find('-') {
            (&s[..idx], Some(s[idx + 1..].to_string()))
        } else {
            (s, None)
        };

        let parts: Vec<&str> = version_part.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(VersionError::InvalidFormat(s.to_string()));
        }

        let major = parts[0]
            .parse()
            .map_err(|_| VersionError::InvalidFormat(s.to_string()))?;

        let minor = parts
            .get(1)
            .map(|p| p.parse())
            .transpose()
            .map_err(|_| VersionError::InvalidFormat(s.to_string()))?
            .unwrap_or(0);

        let patch = parts
            .get(2)
            .map(|p| p.parse())
            .transpose()
            .map_err(|_| VersionError::InvalidFormat(s.to_string()))?
            .unwrap_or(0);

        Ok(Version {
            major,
            minor,
            patch,
            prerelease,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.major.cmp(&other.major) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.minor.cmp(&other.minor) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.patch.cmp(&other.patch) {
            Ordering::Equal => {}
            ord => return ord,
        }
        // Prerelease versions sort before release versions
        match (&self.prerelease, &other.prerelease) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,    // 1.0.0-alpha < 1.0.0
            (None, Some(_)) => Ordering::Greater, // 1.0.0 > 1.0.0-alpha
            (Some(a), Some(b)) => a.cmp(b),       // Lexicographic for prereleases
        }
    }
}

//! Mirror probing: release id + artifact kind -> confirmed download URL.
//!
//! Mirrors are tried in priority order. A location only wins when its
//! listing actually contains a filename matching the kind/platform pattern;
//! "directory exists but file absent" means continue to the next mirror,
//! never a fabricated URL.
//!
//! Bundles are bucketed by full patch version while callers only know the
//! minor-version track, so bundle probing is two-level: enumerate the patch
//! directories under the track prefix, take the highest, then match
//! filenames inside it.

use glob::Pattern;

use crate::config::{MirrorConfig, MirrorLocation};
use crate::error::MirrorError;
use crate::output;
use crate::platform::{ArtifactKind, Platform};
use crate::transport::Transport;
use crate::version::Version;

/// A confirmed artifact location: the listing at `mirror` contained
/// `filename`, and `url` points at it.
#[derive(Debug, Clone)]
pub struct Located {
    pub url: String,
    pub filename: String,
    pub mirror: String,
}

pub struct MirrorProber<'a> {
    config: &'a MirrorConfig,
    transport: &'a dyn Transport,
}

impl<'a> MirrorProber<'a> {
    pub fn new(config: &'a MirrorConfig, transport: &'a dyn Transport) -> Self {
        MirrorProber { config, transport }
    }

    /// Locate an artifact across all configured mirrors, first confirmed
    /// match wins. `track` is the logical minor version bundles are bucketed
    /// under; binaries ignore it.
    pub fn locate(
        &self,
        release: &str,
        track: &str,
        kind: ArtifactKind,
        platform: Platform,
    ) -> Result<Located, MirrorError> {
        let mut last_detail = "no mirrors configured".to_string();

        for location in &self.config.mirrors {
            match self.probe_mirror(location, release, track, kind, platform) {
                Ok(located) => return Ok(located),
                Err(detail) => {
                    output::detail(&format!("{}: {}", location.name, detail));
                    last_detail = format!("{}: {}", location.name, detail);
                }
            }
        }

        Err(MirrorError::NotFound {
            kind,
            release: release.to_string(),
            platform: platform.key(),
            detail: last_detail,
        })
    }

    /// Probe a single mirror location. The error is a human-readable detail;
    /// every failure here means "try the next mirror", not "abort".
    pub fn probe_mirror(
        &self,
        location: &MirrorLocation,
        release: &str,
        track: &str,
        kind: ArtifactKind,
        platform: Platform,
    ) -> Result<Located, String> {
        match kind {
            ArtifactKind::Binary => {
                let dir = location.binary_dir_url(release);
                let names = self.listing(&dir)?;
                let pattern = platform.binary_pattern();
                let filename = best_match(&names, &pattern)
                    .ok_or_else(|| format!("no file matching {} under {}", pattern, dir))?;
                Ok(Located {
                    url: join(&dir, &filename),
                    filename,
                    mirror: location.name.clone(),
                })
            }
            ArtifactKind::Bundle => {
                let root = location.bundle_root_url(track);
                let track_version: Version = track
                    .parse()
                    .map_err(|e| format!("bad track {}: {}", track, e))?;

                let entries = self.listing(&root)?;
                let patch_dir = entries
                    .iter()
                    .filter(|name| {
                        Version::find_in(name)
                            .is_some_and(|v| v.is_compatible_with(&track_version))
                    })
                    .max_by_key(|name| Version::find_in(name))
                    .ok_or_else(|| format!("no {}.x patch directory under {}", track, root))?;

                let dir = join(&root, patch_dir.trim_end_matches('/'));
                let names = self.listing(&dir)?;
                let pattern = platform.bundle_pattern(track);
                let filename = best_match(&names, &pattern)
                    .ok_or_else(|| format!("no file matching {} under {}", pattern, dir))?;
                Ok(Located {
                    url: join(&dir, &filename),
                    filename,
                    mirror: location.name.clone(),
                })
            }
        }
    }

    /// Fetch and parse a directory listing into entry names.
    fn listing(&self, dir: &str) -> Result<Vec<String>, String> {
        let url = format!("{}/", dir.trim_end_matches('/'));
        let body = self
            .transport
            .fetch_text(&url)
            .map_err(|e| e.to_string())?;
        Ok(listing_entries(&body))
    }
}

/// Extract entry names from a directory index.
///
/// Handles two upstream shapes: a JSON array (bare names or objects with a
/// `name` field) and an HTML index with `href` attributes. Directory entries
/// keep their trailing slash.
pub fn listing_entries(body: &str) -> Vec<String> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('[') {
        if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(trimmed) {
            return values
                .iter()
                .filter_map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .or_else(|| v.get("name")?.as_str().map(str::to_string))
                })
                .collect();
        }
    }

    let mut entries = Vec::new();
    let mut rest = body;
    while let Some(idx) = rest.find("href=\"") {
        rest = &rest[idx + 6..];
        let Some(end) = rest.find('"') else { break };
        let value = &rest[..end];
        rest = &rest[end..];

        // Strip query string and fragment
        let value = value.split('?').next().unwrap_or(value);
        let value = value.split('#').next().unwrap_or(value);

        let is_dir = value.ends_with('/');
        let segment = value
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("");
        if segment.is_empty() || segment == ".." {
            continue;
        }

        if is_dir {
            entries.push(format!("{}/", segment));
        } else {
            entries.push(segment.to_string());
        }
    }
    entries
}

/// Select the best name matching a glob pattern: highest embedded version
/// first, lexicographic order as the tie-break.
pub fn best_match(names: &[String], pattern: &str) -> Option<String> {
    let pattern = Pattern::new(pattern).ok()?;
    names
        .iter()
        .filter(|name| pattern.matches(name))
        .max_by(|a, b| {
            Version::find_in(a)
                .cmp(&Version::find_in(b))
                .then_with(|| a.cmp(b))
        })
        .cloned()
}

fn join(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}

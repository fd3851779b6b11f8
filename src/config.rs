//! Mirror configuration.
//!
//! Everything the pipeline touches (mirror layouts, pin endpoints, the
//! reuse cache directory, size thresholds, retry policy) lives in one
//! [`MirrorConfig`] value that callers pass explicitly into each component.
//! Tests point it at temp directories and a mock server; production loads it
//! from a TOML file with sensible defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::platform::ArtifactKind;

/// Default minimum plausible sizes. Anything smaller is a truncated download
/// or an HTML error page served with a 200 status, not a real artifact.
const DEFAULT_MIN_BINARY_SIZE: u64 = 30 * 1024 * 1024;
const DEFAULT_MIN_BUNDLE_SIZE: u64 = 1024 * 1024 * 1024;

const DEFAULT_DOWNLOAD_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// One candidate upstream layout to probe for artifacts.
///
/// Upstream migrates directory schemes without notice, and old and new
/// layouts may be live simultaneously for different releases. Each location
/// carries URL templates; adding a third layout generation is a config entry,
/// not a code change.
///
/// Template placeholders: `{release}` (concrete release id, binary dirs) and
/// `{track}` (logical minor version, bundle roots).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MirrorLocation {
    /// Short name used in logs and the check-mirrors report.
    pub name: String,
    /// Directory holding the tool binary archives for one release.
    pub binary_dir: String,
    /// Directory holding the per-patch bundle subdirectories for one track.
    pub bundle_root: String,
}

impl MirrorLocation {
    /// Render the binary directory URL for a release.
    pub fn binary_dir_url(&self, release: &str) -> String {
        self.binary_dir.replace("{release}", release)
    }

    /// Render the bundle root URL for a logical version track.
    pub fn bundle_root_url(&self, track: &str) -> String {
        self.bundle_root.replace("{track}", track)
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Reuse cache directory for downloaded artifacts.
    pub cache_dir: PathBuf,
    /// Root of the filesystem-backed unit store.
    pub store_dir: PathBuf,
    /// Remote pin document URL (JSON with a `version_pins` mapping).
    pub pin_url: String,
    /// Upstream release index URL (array of `{tag_name, name}` entries,
    /// newest first).
    pub release_index_url: String,
    /// Mirror locations in priority order. All are tried; the first whose
    /// listing confirms a matching filename wins.
    pub mirrors: Vec<MirrorLocation>,
    /// Explicit logical-version -> release-id pins. Authoritative when a key
    /// is present.
    pub pins: BTreeMap<String, String>,
    /// Logical versions covered by `build-all`.
    pub versions: Vec<String>,
    /// Platform keys covered by `build-all` (e.g. "linux-amd64").
    pub platforms: Vec<String>,
    pub min_binary_size: u64,
    pub min_bundle_size: u64,
    pub download_attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        MirrorConfig {
            cache_dir: default_cache_root().join("artifacts"),
            store_dir: default_cache_root().join("units"),
            pin_url: "https://raw.githubusercontent.com/crc-mirror/pins/main/version-pins.json"
                .to_string(),
            release_index_url: "https://api.github.com/repos/crc-org/crc/releases".to_string(),
            mirrors: vec![
                MirrorLocation {
                    name: "openshift-mirror".to_string(),
                    binary_dir: "https://mirror.openshift.com/pub/openshift-v4/clients/crc/{release}"
                        .to_string(),
                    bundle_root: "https://mirror.openshift.com/pub/openshift-v4/clients/crc-bundles/{track}"
                        .to_string(),
                },
                MirrorLocation {
                    name: "developers-redhat".to_string(),
                    binary_dir: "https://developers.redhat.com/content-gateway/rest/mirror/pub/openshift-v4/clients/crc/{release}"
                        .to_string(),
                    bundle_root: "https://developers.redhat.com/content-gateway/rest/mirror/pub/openshift-v4/clients/crc-bundles/{track}"
                        .to_string(),
                },
            ],
            pins: BTreeMap::new(),
            versions: vec!["4.19".to_string()],
            platforms: vec!["linux-amd64".to_string()],
            min_binary_size: DEFAULT_MIN_BINARY_SIZE,
            min_bundle_size: DEFAULT_MIN_BUNDLE_SIZE,
            download_attempts: DEFAULT_DOWNLOAD_ATTEMPTS,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

impl MirrorConfig {
    /// Load configuration from a TOML file, or defaults when `path` is None.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config: {}", p.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config: {}", p.display()))
            }
            None => Ok(MirrorConfig::default()),
        }
    }

    /// Minimum plausible byte size for an artifact kind.
    pub fn min_size(&self, kind: ArtifactKind) -> u64 {
        match kind {
            ArtifactKind::Binary => self.min_binary_size,
            ArtifactKind::Bundle => self.min_bundle_size,
        }
    }

    /// Fixed delay between download attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Default cache root (XDG compliant, env overridable).
fn default_cache_root() -> PathBuf {
    if let Ok(path) = std::env::var("CRC_MIRROR_CACHE") {
        return PathBuf::from(path);
    }

    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("crc-mirror")
}

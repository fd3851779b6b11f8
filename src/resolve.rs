//! Logical version resolution.
//!
//! Maps a logical track ("4.19") to a concrete upstream release id
//! ("2.54.0") through a tiered lookup: explicit config pins, a shared remote
//! pin document, an embedded fallback table, and finally (when a pin says
//! `"auto"`) the upstream release index. Tiers are an ordered strategy list
//! evaluated with short-circuit iteration; each signals hit, miss, or "go
//! ask upstream".

use glob::Pattern;
use serde::Deserialize;

use crate::config::MirrorConfig;
use crate::error::MirrorError;
use crate::output;
use crate::transport::{Transport, fetch_text_with_retry};

/// Pin value that defers to the upstream release index.
const AUTO_SENTINEL: &str = "auto";

/// Attempts for the remote pin document before falling through.
const PIN_FETCH_ATTEMPTS: u32 = 3;

/// Known-good pins used when both the config and the remote document are
/// unavailable. Kept short; the remote document is the maintained source.
const FALLBACK_PINS: &[(&str, &str)] = &[
    ("4.17", "2.42.0"),
    ("4.18", "2.48.0"),
    ("4.19", "2.52.0"),
];

/// Outcome of a single resolution tier.
enum TierOutcome {
    /// Concrete release id; resolution stops here.
    Resolved(String),
    /// The tier found the key but it defers to the upstream index.
    Auto,
    /// The tier has nothing for this key; try the next one.
    Miss,
}

/// Shape of the remote pin document.
#[derive(Debug, Deserialize)]
struct PinDocument {
    #[serde(default)]
    version_pins: std::collections::BTreeMap<String, String>,
}

/// One entry of the upstream release index, newest first.
#[derive(Debug, Deserialize)]
struct ReleaseEntry {
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    name: String,
}

pub struct VersionResolver<'a> {
    config: &'a MirrorConfig,
    transport: &'a dyn Transport,
}

impl<'a> VersionResolver<'a> {
    pub fn new(config: &'a MirrorConfig, transport: &'a dyn Transport) -> Self {
        VersionResolver { config, transport }
    }

    /// Resolve a logical version to a concrete release id.
    ///
    /// Deterministic for a given upstream/pin state: the builder calls this
    /// once per build and threads the result everywhere.
    pub fn resolve(&self, logical: &str) -> Result<String, MirrorError> {
        let tiers: [&dyn Fn() -> TierOutcome; 3] = [
            &|| self.pinned(logical),
            &|| self.remote_pin(logical),
            &|| self.fallback(logical),
        ];

        for tier in tiers {
            match tier() {
                TierOutcome::Resolved(release) => return Ok(release),
                TierOutcome::Auto => return self.latest_for_track(logical),
                TierOutcome::Miss => continue,
            }
        }

        Err(MirrorError::Resolution {
            logical: logical.to_string(),
            reason: "no pin found in config, remote document, or fallback table".to_string(),
        })
    }

    /// Tier 1: explicit pins from the config file. Authoritative when present.
    fn pinned(&self, logical: &str) -> TierOutcome {
        match self.config.pins.get(logical) {
            Some(value) => classify(value),
            None => TierOutcome::Miss,
        }
    }

    /// Tier 2: shared remote pin document. Transient fetch or parse failures
    /// fall through to the next tier rather than failing the build.
    fn remote_pin(&self, logical: &str) -> TierOutcome {
        let body = match fetch_text_with_retry(
            self.transport,
            &self.config.pin_url,
            PIN_FETCH_ATTEMPTS,
            self.config.retry_delay(),
        ) {
            Ok(body) => body,
            Err(e) => {
                output::warning(&format!("pin document unreachable: {}", e));
                return TierOutcome::Miss;
            }
        };

        let doc: PinDocument = match serde_json::from_str(&body) {
            Ok(doc) => doc,
            Err(e) => {
                output::warning(&format!("pin document unparsable: {}", e));
                return TierOutcome::Miss;
            }
        };

        match doc.version_pins.get(logical) {
            Some(value) => classify(value),
            None => TierOutcome::Miss,
        }
    }

    /// Tier 3: embedded fallback table.
    fn fallback(&self, logical: &str) -> TierOutcome {
        match FALLBACK_PINS.iter().find(|(track, _)| *track == logical) {
            Some((_, release)) => classify(release),
            None => TierOutcome::Miss,
        }
    }

    /// Tier 4: query the upstream release index.
    ///
    /// Release display names embed the track as a suffix pattern
    /// ("{release}-{track}.{patch}", e.g. "2.54.0-4.19.3"). The index is
    /// newest-first, so the first match is the most recent. When nothing
    /// matches, degrade to the most recent release overall with a warning;
    /// the suffix heuristic is best-effort, not a hard gate.
    fn latest_for_track(&self, logical: &str) -> Result<String, MirrorError> {
        let url = &self.config.release_index_url;
        let body = self.transport.fetch_text(url).map_err(|e| MirrorError::Resolution {
            logical: logical.to_string(),
            reason: format!("release index unavailable: {}", e),
        })?;

        let releases: Vec<ReleaseEntry> =
            serde_json::from_str(&body).map_err(|e| MirrorError::Resolution {
                logical: logical.to_string(),
                reason: format!("release index unparsable: {}", e),
            })?;

        let newest = releases.first().ok_or_else(|| MirrorError::Resolution {
            logical: logical.to_string(),
            reason: format!("release index at {} is empty", url),
        })?;

        let suffix = Pattern::new(&format!("*-{}.*", logical)).ok();
        let matched = suffix
            .as_ref()
            .and_then(|p| releases.iter().find(|r| p.matches(&r.name)));

        match matched {
            Some(entry) => Ok(strip_tag(&entry.tag_name)),
            None => {
                output::warning(&format!(
                    "no release name matches track {}; falling back to latest overall ({})",
                    logical, newest.tag_name
                ));
                Ok(strip_tag(&newest.tag_name))
            }
        }
    }
}

/// Interpret a pin value: concrete release id or the auto sentinel.
fn classify(value: &str) -> TierOutcome {
    if value == AUTO_SENTINEL {
        TierOutcome::Auto
    } else {
        TierOutcome::Resolved(value.to_string())
    }
}

/// Release tags sometimes carry a "v" prefix; release ids never do.
fn strip_tag(tag: &str) -> String {
    tag.trim_start_matches('v').to_string()
}

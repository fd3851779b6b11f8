//! Cache unit assembly and the smart-rebuild decision.
//!
//! The builder is the pipeline's conductor: resolve once, compare against
//! the published unit, and only when the release actually changed (or the
//! caller forces it) acquire both artifacts and publish a fresh unit. The
//! batch runner drives the builder over every configured (version, platform)
//! tuple and keeps going when one of them fails.

use chrono::Utc;

use crate::acquire::{Acquired, ArtifactAcquirer};
use crate::config::MirrorConfig;
use crate::error::MirrorError;
use crate::output;
use crate::platform::{ArtifactKind, Platform};
use crate::probe::MirrorProber;
use crate::resolve::VersionResolver;
use crate::transport::Transport;
use crate::unit::{CacheUnit, PublishedRef, UnitStore};

/// Result of one build request.
#[derive(Debug)]
pub enum BuildOutcome {
    Built {
        unit: CacheUnit,
        published: PublishedRef,
    },
    /// The published unit already carries the freshly-resolved release;
    /// nothing was fetched.
    Skipped { release: String },
}

pub struct CacheUnitBuilder<'a> {
    config: &'a MirrorConfig,
    transport: &'a dyn Transport,
    store: &'a dyn UnitStore,
}

impl<'a> CacheUnitBuilder<'a> {
    pub fn new(
        config: &'a MirrorConfig,
        transport: &'a dyn Transport,
        store: &'a dyn UnitStore,
    ) -> Self {
        CacheUnitBuilder {
            config,
            transport,
            store,
        }
    }

    /// Build and publish the unit for one (logical version, platform) key.
    pub fn build(
        &self,
        logical: &str,
        platform: Platform,
        force: bool,
    ) -> Result<BuildOutcome, MirrorError> {
        output::sub_action("resolve");
        let release = VersionResolver::new(self.config, self.transport).resolve(logical)?;
        output::detail(&format!("{} resolves to release {}", logical, release));

        if !force {
            match self.store.pull(logical, platform) {
                Ok(Some(existing)) if existing.unit.release_id == release => {
                    return Ok(BuildOutcome::Skipped { release });
                }
                Ok(_) => {}
                Err(e) => {
                    // A malformed published unit is a reason to rebuild it,
                    // not to abort.
                    output::warning(&format!("existing unit unreadable: {}", e));
                }
            }
        }

        let prober = MirrorProber::new(self.config, self.transport);
        let acquirer = ArtifactAcquirer::new(self.config, self.transport);

        output::sub_action("acquire binary");
        let binary_loc = prober.locate(&release, logical, ArtifactKind::Binary, platform)?;
        let binary = acquirer.acquire(&binary_loc, ArtifactKind::Binary, &release, platform)?;

        output::sub_action("acquire bundle");
        let bundle_loc = prober.locate(&release, logical, ArtifactKind::Bundle, platform)?;
        let bundle = acquirer.acquire(&bundle_loc, ArtifactKind::Bundle, &release, platform)?;

        // Re-check both artifacts on disk before anything is published; a
        // partially-assembled unit must never become visible.
        let binary_size = self.verify_on_disk(&binary, ArtifactKind::Binary)?;
        let bundle_size = self.verify_on_disk(&bundle, ArtifactKind::Bundle)?;

        let unit = CacheUnit {
            logical_version: logical.to_string(),
            release_id: release,
            platform: platform.key(),
            binary_name: binary.filename.clone(),
            bundle_name: bundle.filename.clone(),
            binary_size,
            bundle_size,
            build_date: Utc::now(),
            mirror_url: binary.url.clone(),
            bundle_url: bundle.url.clone(),
        };

        output::sub_action("publish");
        let published = self.store.publish(&unit, &binary.path, &bundle.path)?;
        Ok(BuildOutcome::Built { unit, published })
    }

    fn verify_on_disk(
        &self,
        acquired: &Acquired,
        kind: ArtifactKind,
    ) -> Result<u64, MirrorError> {
        let min_size = self.config.min_size(kind);
        let meta =
            std::fs::metadata(&acquired.path).map_err(|e| MirrorError::Integrity {
                path: acquired.path.clone(),
                detail: format!("{} artifact missing before publish: {}", kind, e),
            })?;
        if meta.len() < min_size {
            return Err(MirrorError::Integrity {
                path: acquired.path.clone(),
                detail: format!(
                    "{} is {} bytes, below the {} minimum of {} bytes",
                    kind,
                    meta.len(),
                    kind,
                    min_size
                ),
            });
        }
        Ok(meta.len())
    }

    /// Build every configured (version, platform) tuple.
    ///
    /// Failures are local to their tuple: the run continues and the summary
    /// carries the per-tuple outcome. Platforms of a version that all
    /// succeeded are grouped into a manifest.
    pub fn build_all(&self, force: bool) -> BatchSummary {
        let mut results = Vec::new();

        for logical in &self.config.versions {
            let mut refs: Vec<PublishedRef> = Vec::new();
            let mut version_failed = false;

            for platform_key in &self.config.platforms {
                let platform: Platform = match platform_key.parse() {
                    Ok(p) => p,
                    Err(e) => {
                        output::error(&format!("{} {}: {}", logical, platform_key, e));
                        version_failed = true;
                        results.push(BatchResult {
                            logical: logical.clone(),
                            platform: platform_key.clone(),
                            outcome: TupleOutcome::Failed { error: e },
                        });
                        continue;
                    }
                };

                output::action(&format!("Building {} {}", logical, platform));
                let outcome = match self.build(logical, platform, force) {
                    Ok(BuildOutcome::Built { unit, published }) => {
                        output::success(&format!(
                            "{} {} published at release {}",
                            logical, platform, unit.release_id
                        ));
                        refs.push(published.clone());
                        TupleOutcome::Built {
                            release: unit.release_id,
                            location: published.location,
                        }
                    }
                    Ok(BuildOutcome::Skipped { release }) => {
                        output::skip(&format!(
                            "{} {} unchanged at {}, skipping",
                            logical, platform, release
                        ));
                        TupleOutcome::Skipped { release }
                    }
                    Err(e) => {
                        output::error(&format!("{} {}: {}", logical, platform, e));
                        version_failed = true;
                        TupleOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                };

                results.push(BatchResult {
                    logical: logical.clone(),
                    platform: platform_key.clone(),
                    outcome,
                });
            }

            if !version_failed && !refs.is_empty() {
                if let Err(e) = self.store.group(logical, &refs) {
                    output::warning(&format!("cannot group {} manifest: {}", logical, e));
                }
            }
        }

        BatchSummary { results }
    }
}

/// Per-tuple outcome inside a batch run.
#[derive(Debug)]
pub enum TupleOutcome {
    Built { release: String, location: String },
    Skipped { release: String },
    Failed { error: String },
}

#[derive(Debug)]
pub struct BatchResult {
    pub logical: String,
    pub platform: String,
    pub outcome: TupleOutcome,
}

#[derive(Debug)]
pub struct BatchSummary {
    pub results: Vec<BatchResult>,
}

impl BatchSummary {
    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, TupleOutcome::Failed { .. }))
            .count()
    }

    pub fn built(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, TupleOutcome::Built { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, TupleOutcome::Skipped { .. }))
            .count()
    }

    pub fn ok(&self) -> bool {
        self.failed() == 0
    }
}

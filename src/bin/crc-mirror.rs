//! crc-mirror CLI - failover cache keeper for CRC artifacts
//!
//! Usage:
//!   crc-mirror build <version>     Build one logical version
//!   crc-mirror build-all           Build all configured versions
//!   crc-mirror check-mirrors       Probe every configured mirror layout
//!   crc-mirror test <version>      Validate a published cache unit
//!   crc-mirror prefetch <version>  Pre-populate the reuse cache
//!   crc-mirror list                Show cached artifacts and published units

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crc_mirror::acquire::ArtifactAcquirer;
use crc_mirror::build::{BatchSummary, BuildOutcome, CacheUnitBuilder, TupleOutcome};
use crc_mirror::config::MirrorConfig;
use crc_mirror::output;
use crc_mirror::platform::{ArtifactKind, Platform};
use crc_mirror::probe::MirrorProber;
use crc_mirror::resolve::VersionResolver;
use crc_mirror::transport::HttpTransport;
use crc_mirror::unit::FsUnitStore;
use crc_mirror::validate::CacheValidator;

#[derive(Parser)]
#[command(name = "crc-mirror")]
#[command(about = "Failover mirror cache for CRC binary and bundle artifacts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the mirror configuration file (TOML)
    #[arg(short, long, global = true, env = "CRC_MIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// Override the reuse cache directory
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Override the unit store directory
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the cache unit for one logical version
    Build {
        /// Logical version track (e.g. "4.19")
        version: String,

        /// Platform key (e.g. "linux-amd64"); all configured if omitted
        #[arg(short, long)]
        platform: Option<String>,

        /// Rebuild even when the resolved release is unchanged
        #[arg(short, long)]
        force: bool,
    },

    /// Build every configured (version, platform) tuple
    BuildAll {
        /// Rebuild even when resolved releases are unchanged
        #[arg(short, long)]
        force: bool,
    },

    /// Probe each configured mirror layout for a release
    CheckMirrors {
        /// Logical version to probe with; first configured if omitted
        version: Option<String>,

        /// Platform key to probe with
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// Validate a published cache unit
    Test {
        /// Logical version track
        version: String,

        /// Platform key; all configured if omitted
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// Download artifacts into the reuse cache without publishing
    Prefetch {
        /// Logical version track
        version: String,

        /// Platform key; all configured if omitted
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// List cached artifacts and published units
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = MirrorConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = dir;
    }
    if let Some(dir) = cli.store_dir {
        config.store_dir = dir;
    }

    let transport = HttpTransport::new();
    let store = FsUnitStore::new(&config.store_dir);

    match cli.command {
        Commands::Build {
            version,
            platform,
            force,
        } => {
            let builder = CacheUnitBuilder::new(&config, &transport, &store);
            let mut failed = 0usize;
            for target in platforms_for(&config, platform.as_deref())? {
                output::action(&format!("Building {} {}", version, target));
                match builder.build(&version, target, force) {
                    Ok(BuildOutcome::Built { unit, published }) => {
                        output::success(&format!(
                            "{} {} published at release {} ({})",
                            version, target, unit.release_id, published.location
                        ));
                    }
                    Ok(BuildOutcome::Skipped { release }) => {
                        output::skip(&format!(
                            "{} {} unchanged at {}, skipping",
                            version, target, release
                        ));
                    }
                    Err(e) => {
                        output::error(&format!("{} {}: {}", version, target, e));
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                bail!("{} build(s) failed", failed);
            }
        }

        Commands::BuildAll { force } => {
            let builder = CacheUnitBuilder::new(&config, &transport, &store);
            let summary = builder.build_all(force);
            print_summary(&summary)?;
        }

        Commands::CheckMirrors { version, platform } => {
            let version = match version.or_else(|| config.versions.first().cloned()) {
                Some(v) => v,
                None => bail!("no logical version given and none configured"),
            };
            let target = platforms_for(&config, platform.as_deref())?
                .into_iter()
                .next()
                .context("no platforms configured")?;

            output::action(&format!("Checking mirrors for {} {}", version, target));
            let release = VersionResolver::new(&config, &transport).resolve(&version)?;
            output::info(&format!("{} resolves to release {}", version, release));

            let prober = MirrorProber::new(&config, &transport);
            let mut reachable = 0usize;
            for location in &config.mirrors {
                for kind in [ArtifactKind::Binary, ArtifactKind::Bundle] {
                    match prober.probe_mirror(location, &release, &version, kind, target) {
                        Ok(located) => {
                            reachable += 1;
                            output::info(&format!("{} {}: {}", location.name, kind, located.url));
                        }
                        Err(detail) => {
                            output::warning(&format!("{} {}: {}", location.name, kind, detail));
                        }
                    }
                }
            }
            if reachable == 0 {
                bail!("no mirror serves {} for release {}", version, release);
            }
        }

        Commands::Test { version, platform } => {
            let validator = CacheValidator::new(&config, &store);
            let mut failed = 0usize;
            for target in platforms_for(&config, platform.as_deref())? {
                output::action(&format!("Testing {} {}", version, target));
                let report = validator.validate(&version, target);
                for line in &report.pass {
                    output::info(&format!("PASS {}", line));
                }
                for line in &report.warn {
                    output::warning(line);
                }
                for line in &report.fail {
                    output::error(&format!("FAIL {}", line));
                }
                if report.passed() {
                    output::success(&format!(
                        "{} {}: {} checks passed",
                        version,
                        target,
                        report.pass.len()
                    ));
                } else {
                    failed += 1;
                }
            }
            if failed > 0 {
                bail!("{} validation(s) failed", failed);
            }
        }

        Commands::Prefetch { version, platform } => {
            let release = VersionResolver::new(&config, &transport).resolve(&version)?;
            output::info(&format!("{} resolves to release {}", version, release));

            let prober = MirrorProber::new(&config, &transport);
            let acquirer = ArtifactAcquirer::new(&config, &transport);
            for target in platforms_for(&config, platform.as_deref())? {
                output::action(&format!("Prefetching {} {}", version, target));
                for kind in [ArtifactKind::Binary, ArtifactKind::Bundle] {
                    let located = prober.locate(&release, &version, kind, target)?;
                    let acquired = acquirer.acquire(&located, kind, &release, target)?;
                    let source = if acquired.from_cache {
                        "already cached"
                    } else {
                        "downloaded"
                    };
                    output::info(&format!(
                        "{} {} ({} bytes, {})",
                        kind, acquired.filename, acquired.size, source
                    ));
                }
            }
        }

        Commands::List => {
            let acquirer = ArtifactAcquirer::new(&config, &transport);
            output::action("Reuse cache");
            let entries = acquirer.cache().entries()?;
            if entries.is_empty() {
                output::info("empty");
            }
            for (name, size) in entries {
                output::info(&format!("{} ({} bytes)", name, size));
            }

            output::action("Published units");
            let units = store.published()?;
            if units.is_empty() {
                output::info("none");
            }
            for unit in units {
                output::info(&format!(
                    "{} {} -> release {} (built {})",
                    unit.logical_version, unit.platform, unit.release_id, unit.build_date
                ));
            }
        }
    }

    Ok(())
}

/// Resolve the target platforms: an explicit key, or everything configured.
fn platforms_for(config: &MirrorConfig, explicit: Option<&str>) -> Result<Vec<Platform>> {
    let keys: Vec<&str> = match explicit {
        Some(key) => vec![key],
        None => config.platforms.iter().map(String::as_str).collect(),
    };
    if keys.is_empty() {
        bail!("no platforms configured");
    }
    keys.into_iter()
        .map(|key| {
            key.parse::<Platform>()
                .map_err(|e| anyhow::anyhow!("invalid platform {}: {}", key, e))
        })
        .collect()
}

fn print_summary(summary: &BatchSummary) -> Result<()> {
    output::action("Summary");
    for result in &summary.results {
        match &result.outcome {
            TupleOutcome::Built { release, .. } => {
                output::info(&format!(
                    "{} {}: built at release {}",
                    result.logical, result.platform, release
                ));
            }
            TupleOutcome::Skipped { release } => {
                output::info(&format!(
                    "{} {}: unchanged at release {}",
                    result.logical, result.platform, release
                ));
            }
            TupleOutcome::Failed { error } => {
                output::error(&format!("{} {}: {}", result.logical, result.platform, error));
            }
        }
    }
    output::info(&format!(
        "{} built, {} skipped, {} failed",
        summary.built(),
        summary.skipped(),
        summary.failed()
    ));
    if !summary.ok() {
        bail!("{} of {} builds failed", summary.failed(), summary.results.len());
    }
    Ok(())
}

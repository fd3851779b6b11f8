//! Independent validation of a published cache unit.
//!
//! Runs as a consumer: the unit is pulled fresh from the store, never reusing
//! builder state. Checks are independent (one failure does not stop the
//! rest) and the aggregate report is the unit of pass/fail. Used both as a
//! post-publish gate and as the `test` CLI command.

use std::io::Read;
use std::path::Path;

use chrono::Utc;
use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

use crate::config::MirrorConfig;
use crate::error::MirrorError;
use crate::platform::Platform;
use crate::unit::UnitStore;

/// Aggregate validation outcome.
#[derive(Debug, Default)]
pub struct Report {
    pub pass: Vec<String>,
    pub fail: Vec<String>,
    pub warn: Vec<String>,
}

impl Report {
    fn pass(&mut self, msg: impl Into<String>) {
        self.pass.push(msg.into());
    }

    fn fail(&mut self, msg: impl Into<String>) {
        self.fail.push(msg.into());
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warn.push(msg.into());
    }

    /// Record a named check: pass when `ok`, otherwise fail with the detail.
    fn check(&mut self, name: &str, ok: bool, detail: String) {
        if ok {
            self.pass(name);
        } else {
            self.fail(format!("{}: {}", name, detail));
        }
    }

    pub fn passed(&self) -> bool {
        self.fail.is_empty()
    }
}

pub struct CacheValidator<'a> {
    config: &'a MirrorConfig,
    store: &'a dyn UnitStore,
}

impl<'a> CacheValidator<'a> {
    pub fn new(config: &'a MirrorConfig, store: &'a dyn UnitStore) -> Self {
        CacheValidator { config, store }
    }

    /// Validate the published unit for one (logical version, platform) key.
    pub fn validate(&self, logical: &str, platform: Platform) -> Report {
        let mut report = Report::default();

        let pulled = match self.store.pull(logical, platform) {
            Ok(Some(pulled)) => {
                report.pass("unit is retrievable");
                report.pass("metadata is well-formed");
                pulled
            }
            Ok(None) => {
                report.fail(format!(
                    "unit is retrievable: no published unit for {} {}",
                    logical, platform
                ));
                return report;
            }
            Err(MirrorError::Integrity { path, detail }) => {
                report.pass("unit is retrievable");
                report.fail(format!(
                    "metadata is well-formed: {}: {}",
                    path.display(),
                    detail
                ));
                return report;
            }
            Err(e) => {
                report.fail(format!("unit is retrievable: {}", e));
                return report;
            }
        };

        let unit = &pulled.unit;

        report.check(
            "declared logical version matches request",
            unit.logical_version == logical,
            format!("declared {}, requested {}", unit.logical_version, logical),
        );
        report.check(
            "release id is non-empty",
            !unit.release_id.is_empty(),
            "empty release id".to_string(),
        );

        let min_binary = self.config.min_binary_size;
        report.check(
            "binary size exceeds minimum",
            unit.binary_size >= min_binary,
            format!("{} bytes < {} bytes", unit.binary_size, min_binary),
        );
        let min_bundle = self.config.min_bundle_size;
        report.check(
            "bundle size exceeds minimum",
            unit.bundle_size >= min_bundle,
            format!("{} bytes < {} bytes", unit.bundle_size, min_bundle),
        );

        match probe_archive(&pulled.binary_path) {
            Ok(Probe::Entries(names)) => {
                let has_tool = names
                    .iter()
                    .any(|n| n == "crc" || n.ends_with("/crc") || n.ends_with("/crc.exe"));
                report.check(
                    "binary archive unpacks and contains the tool",
                    has_tool,
                    format!("no crc entry among {} archive members", names.len()),
                );
            }
            Ok(Probe::Unsupported) => {
                report.warn(format!(
                    "cannot probe {}: unsupported archive format",
                    unit.binary_name
                ));
            }
            Err(detail) => {
                report.fail(format!("binary archive unpacks: {}", detail));
            }
        }

        self.check_observed_size(&mut report, "binary", &pulled.binary_path, unit.binary_size);
        self.check_observed_size(&mut report, "bundle", &pulled.bundle_path, unit.bundle_size);

        if unit.build_date > Utc::now() {
            report.warn(format!("build date {} is in the future", unit.build_date));
        }

        report
    }

    fn check_observed_size(&self, report: &mut Report, label: &str, path: &Path, declared: u64) {
        match std::fs::metadata(path) {
            Ok(meta) => report.check(
                &format!("declared {} size matches artifact", label),
                meta.len() == declared,
                format!("declared {} bytes, observed {} bytes", declared, meta.len()),
            ),
            Err(e) => report.fail(format!(
                "declared {} size matches artifact: cannot stat {}: {}",
                label,
                path.display(),
                e
            )),
        }
    }
}

enum Probe {
    Entries(Vec<String>),
    Unsupported,
}

/// Walk the entries of a tool binary archive without extracting to disk.
fn probe_archive(path: &Path) -> Result<Probe, String> {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let file = std::fs::File::open(path)
        .map_err(|e| format!("cannot open {}: {}", path.display(), e))?;

    if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        entry_names(tar::Archive::new(XzDecoder::new(file)))
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        entry_names(tar::Archive::new(GzDecoder::new(file)))
    } else {
        Ok(Probe::Unsupported)
    }
}

fn entry_names<R: Read>(mut archive: tar::Archive<R>) -> Result<Probe, String> {
    let mut names = Vec::new();
    let entries = archive
        .entries()
        .map_err(|e| format!("not a tar archive: {}", e))?;
    for entry in entries {
        let entry = entry.map_err(|e| format!("corrupt archive entry: {}", e))?;
        let path = entry
            .path()
            .map_err(|e| format!("unreadable entry path: {}", e))?;
        names.push(path.to_string_lossy().to_string());
    }
    Ok(Probe::Entries(names))
}

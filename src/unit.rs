//! Cache units and the packaging store.
//!
//! A `CacheUnit` is the published product: both artifacts plus a small
//! metadata document describing exactly what was mirrored and from where.
//! The packaging side is deliberately opaque: a `UnitStore` only needs
//! pull, publish, and group, so the pipeline neither knows nor cares
//! whether units land in a registry or a directory. `FsUnitStore` is the
//! directory-backed implementation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;
use crate::platform::Platform;

/// Metadata document persisted alongside the artifacts of one unit.
/// Immutable once published; a release change produces a superseding unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheUnit {
    pub logical_version: String,
    pub release_id: String,
    pub platform: String,
    pub binary_name: String,
    pub bundle_name: String,
    pub binary_size: u64,
    pub bundle_size: u64,
    pub build_date: DateTime<Utc>,
    pub mirror_url: String,
    pub bundle_url: String,
}

/// Address of a published unit inside its store.
#[derive(Debug, Clone)]
pub struct PublishedRef {
    pub location: String,
}

/// A unit pulled back out of the store, artifacts included.
#[derive(Debug)]
pub struct PulledUnit {
    pub unit: CacheUnit,
    pub binary_path: PathBuf,
    pub bundle_path: PathBuf,
}

/// Opaque packaging collaborator: key-value storage for artifact bytes plus
/// the metadata document.
pub trait UnitStore {
    /// Fetch the currently-published unit for a key, if any.
    fn pull(&self, logical: &str, platform: Platform) -> Result<Option<PulledUnit>, MirrorError>;

    /// Publish a unit. Replaces (supersedes) any existing unit for the same
    /// (logical version, platform) key.
    fn publish(
        &self,
        unit: &CacheUnit,
        binary: &Path,
        bundle: &Path,
    ) -> Result<PublishedRef, MirrorError>;

    /// Group per-platform refs of one logical version into a manifest.
    fn group(&self, logical: &str, refs: &[PublishedRef]) -> Result<PublishedRef, MirrorError>;
}

const METADATA_FILE: &str = "metadata.json";

/// Directory-backed unit store: `<root>/<logical>/<platform>/` holds the two
/// artifacts plus `metadata.json`.
pub struct FsUnitStore {
    root: PathBuf,
}

impl FsUnitStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsUnitStore { root: root.into() }
    }

    fn unit_dir(&self, logical: &str, platform: Platform) -> PathBuf {
        self.root.join(logical).join(platform.key())
    }

    /// Published (logical, platform, release) triples, for the list command.
    pub fn published(&self) -> Result<Vec<CacheUnit>, MirrorError> {
        let mut out = Vec::new();
        if !self.root.exists() {
            return Ok(out);
        }
        for logical in std::fs::read_dir(&self.root)? {
            let logical = logical?;
            if !logical.file_type()?.is_dir() {
                continue;
            }
            for platform in std::fs::read_dir(logical.path())? {
                let meta_path = platform?.path().join(METADATA_FILE);
                if let Ok(content) = std::fs::read_to_string(&meta_path) {
                    if let Ok(unit) = serde_json::from_str(&content) {
                        out.push(unit);
                    }
                }
            }
        }
        out.sort_by(|a: &CacheUnit, b: &CacheUnit| {
            (&a.logical_version, &a.platform).cmp(&(&b.logical_version, &b.platform))
        });
        Ok(out)
    }
}

impl UnitStore for FsUnitStore {
    fn pull(&self, logical: &str, platform: Platform) -> Result<Option<PulledUnit>, MirrorError> {
        let dir = self.unit_dir(logical, platform);
        let meta_path = dir.join(METADATA_FILE);
        let content = match std::fs::read_to_string(&meta_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let unit: CacheUnit =
            serde_json::from_str(&content).map_err(|e| MirrorError::Integrity {
                path: meta_path.clone(),
                detail: format!("metadata unparsable: {}", e),
            })?;

        Ok(Some(PulledUnit {
            binary_path: dir.join(&unit.binary_name),
            bundle_path: dir.join(&unit.bundle_name),
            unit,
        }))
    }

    fn publish(
        &self,
        unit: &CacheUnit,
        binary: &Path,
        bundle: &Path,
    ) -> Result<PublishedRef, MirrorError> {
        let publish_err = |detail: String| MirrorError::Publish {
            logical: unit.logical_version.clone(),
            platform: unit.platform.clone(),
            detail,
        };

        let parent = self.root.join(&unit.logical_version);
        std::fs::create_dir_all(&parent)
            .map_err(|e| publish_err(format!("cannot create {}: {}", parent.display(), e)))?;

        // One writer at a time per (logical, platform); concurrent platforms
        // of the same version take independent locks.
        let lock_path = parent.join(format!(".{}.lock", unit.platform));
        let lock = std::fs::File::create(&lock_path)
            .map_err(|e| publish_err(format!("cannot open lock {}: {}", lock_path.display(), e)))?;
        lock.lock_exclusive()
            .map_err(|e| publish_err(format!("cannot lock {}: {}", lock_path.display(), e)))?;

        let staging = parent.join(format!(".{}.staging.{}", unit.platform, std::process::id()));
        let result = stage_unit(&staging, unit, binary, bundle);

        // lock releases when the handle drops, on every return path
        match result {
            Ok(()) => {
                let dest = parent.join(&unit.platform);
                if dest.exists() {
                    std::fs::remove_dir_all(&dest)
                        .map_err(|e| publish_err(format!("cannot supersede old unit: {}", e)))?;
                }
                std::fs::rename(&staging, &dest)
                    .map_err(|e| publish_err(format!("cannot promote staging dir: {}", e)))?;
                Ok(PublishedRef {
                    location: dest.display().to_string(),
                })
            }
            Err(e) => {
                let _ = std::fs::remove_dir_all(&staging);
                Err(publish_err(e.to_string()))
            }
        }
    }

    fn group(&self, logical: &str, refs: &[PublishedRef]) -> Result<PublishedRef, MirrorError> {
        let manifest = serde_json::json!({
            "logical_version": logical,
            "grouped_at": Utc::now(),
            "units": refs.iter().map(|r| r.location.as_str()).collect::<Vec<_>>(),
        });

        let path = self.root.join(logical).join("manifest.json");
        std::fs::create_dir_all(self.root.join(logical))?;
        std::fs::write(&path, serde_json::to_string_pretty(&manifest).unwrap_or_default())?;
        Ok(PublishedRef {
            location: path.display().to_string(),
        })
    }
}

/// Copy artifacts and metadata into a staging directory. A failure leaves
/// the final location untouched; a partially-assembled unit is never
/// visible under the published path.
fn stage_unit(
    staging: &Path,
    unit: &CacheUnit,
    binary: &Path,
    bundle: &Path,
) -> std::io::Result<()> {
    std::fs::create_dir_all(staging)?;
    std::fs::copy(binary, staging.join(&unit.binary_name))?;
    std::fs::copy(bundle, staging.join(&unit.bundle_name))?;
    let metadata = serde_json::to_string_pretty(unit)
        .map_err(|e| std::io::Error::other(format!("metadata serialization: {}", e)))?;
    std::fs::write(staging.join(METADATA_FILE), metadata)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Os};
    use tempfile::TempDir;

    const AMD64: Platform = Platform::new(Os::Linux, Arch::Amd64);

    fn sample_unit(release: &str) -> CacheUnit {
        CacheUnit {
            logical_version: "4.19".to_string(),
            release_id: release.to_string(),
            platform: "linux-amd64".to_string(),
            binary_name: "crc-linux-amd64.tar.xz".to_string(),
            bundle_name: "crc_libvirt_4.19.5_amd64.crcbundle".to_string(),
            binary_size: 7,
            bundle_size: 9,
            build_date: Utc::now(),
            mirror_url: "https://m/crc/2.54.0/crc-linux-amd64.tar.xz".to_string(),
            bundle_url: "https://m/bundles/4.19/4.19.5/crc_libvirt_4.19.5_amd64.crcbundle"
                .to_string(),
        }
    }

    fn write_artifacts(dir: &TempDir) -> (PathBuf, PathBuf) {
        let binary = dir.path().join("binary.tar.xz");
        let bundle = dir.path().join("bundle.crcbundle");
        std::fs::write(&binary, b"binary!").unwrap();
        std::fs::write(&bundle, b"bundle!!!").unwrap();
        (binary, bundle)
    }

    #[test]
    fn test_publish_pull_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FsUnitStore::new(dir.path().join("units"));
        let (binary, bundle) = write_artifacts(&dir);
        let unit = sample_unit("2.54.0");

        store.publish(&unit, &binary, &bundle).unwrap();
        let pulled = store.pull("4.19", AMD64).unwrap().unwrap();

        assert_eq!(pulled.unit, unit);
        assert_eq!(std::fs::read(&pulled.binary_path).unwrap(), b"binary!");
        assert_eq!(std::fs::read(&pulled.bundle_path).unwrap(), b"bundle!!!");
    }

    #[test]
    fn test_pull_absent_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FsUnitStore::new(dir.path());
        assert!(store.pull("4.19", AMD64).unwrap().is_none());
    }

    #[test]
    fn test_publish_supersedes_existing_unit() {
        let dir = TempDir::new().unwrap();
        let store = FsUnitStore::new(dir.path().join("units"));
        let (binary, bundle) = write_artifacts(&dir);

        store.publish(&sample_unit("2.54.0"), &binary, &bundle).unwrap();
        store.publish(&sample_unit("2.55.0"), &binary, &bundle).unwrap();

        let pulled = store.pull("4.19", AMD64).unwrap().unwrap();
        assert_eq!(pulled.unit.release_id, "2.55.0");
    }

    #[test]
    fn test_publish_missing_artifact_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let store = FsUnitStore::new(dir.path().join("units"));
        let (binary, _) = write_artifacts(&dir);

        let err = store
            .publish(&sample_unit("2.54.0"), &binary, Path::new("/nonexistent/bundle"))
            .unwrap_err();
        assert!(matches!(err, MirrorError::Publish { .. }));
        assert!(store.pull("4.19", AMD64).unwrap().is_none());
    }

    #[test]
    fn test_malformed_metadata_is_integrity_error() {
        let dir = TempDir::new().unwrap();
        let store = FsUnitStore::new(dir.path());
        let unit_dir = dir.path().join("4.19/linux-amd64");
        std::fs::create_dir_all(&unit_dir).unwrap();
        std::fs::write(unit_dir.join("metadata.json"), "{not json").unwrap();

        let err = store.pull("4.19", AMD64).unwrap_err();
        assert!(matches!(err, MirrorError::Integrity { .. }));
    }

    #[test]
    fn test_group_writes_manifest() {
        let dir = TempDir::new().unwrap();
        let store = FsUnitStore::new(dir.path().join("units"));
        let refs = vec![
            PublishedRef { location: "a".to_string() },
            PublishedRef { location: "b".to_string() },
        ];

        let grouped = store.group("4.19", &refs).unwrap();
        let content = std::fs::read_to_string(&grouped.location).unwrap();
        let manifest: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(manifest["logical_version"], "4.19");
        assert_eq!(manifest["units"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_published_lists_units_sorted() {
        let dir = TempDir::new().unwrap();
        let store = FsUnitStore::new(dir.path().join("units"));
        let (binary, bundle) = write_artifacts(&dir);

        let mut unit = sample_unit("2.54.0");
        store.publish(&unit, &binary, &bundle).unwrap();
        unit.logical_version = "4.18".to_string();
        store.publish(&unit, &binary, &bundle).unwrap();

        let all = store.published().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].logical_version, "4.18");
        assert_eq!(all[1].logical_version, "4.19");
    }
}

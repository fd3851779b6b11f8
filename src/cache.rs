//! Local reuse cache for downloaded artifacts.
//!
//! A flat directory of files named `<kind>_<release>_<platform>.<ext>`.
//! Presence of a correctly-named file meeting the size threshold is a valid
//! hit regardless of which build produced it. Re-downloading a
//! multi-gigabyte bundle is the single most expensive operation in the
//! system, so this cache is consulted before every network fetch.
//!
//! Entries are never evicted automatically; retention is the operator's.
//! In-flight downloads live as dotted `.partial.` siblings and are renamed
//! into place only on full success, so concurrent writers for the same key
//! are wasteful but never corrupting.

use std::io;
use std::path::{Path, PathBuf};

use crate::platform::{ArtifactKind, Platform};

pub struct ReuseCache {
    root: PathBuf,
}

impl ReuseCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ReuseCache { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical cache filename for a key.
    pub fn entry_name(kind: ArtifactKind, release: &str, platform: Platform, ext: &str) -> String {
        format!(
            "{}_{}_{}.{}",
            kind.label(),
            release,
            platform.cache_key(kind),
            ext
        )
    }

    pub fn entry_path(
        &self,
        kind: ArtifactKind,
        release: &str,
        platform: Platform,
        ext: &str,
    ) -> PathBuf {
        self.root.join(Self::entry_name(kind, release, platform, ext))
    }

    /// Look up a cached artifact. A hit requires the file to exist and to
    /// meet the minimum plausible size; undersized leftovers are ignored.
    pub fn lookup(
        &self,
        kind: ArtifactKind,
        release: &str,
        platform: Platform,
        ext: &str,
        min_size: u64,
    ) -> Option<(PathBuf, u64)> {
        let path = self.entry_path(kind, release, platform, ext);
        let meta = std::fs::metadata(&path).ok()?;
        if !meta.is_file() || meta.len() < min_size {
            return None;
        }
        Some((path, meta.len()))
    }

    /// Temporary download destination for an entry. Dotted so listings skip
    /// it, pid-suffixed so concurrent processes never collide.
    pub fn partial_path(&self, entry_name: &str) -> PathBuf {
        self.root
            .join(format!(".{}.partial.{}", entry_name, std::process::id()))
    }

    /// Promote a fully-downloaded partial file to its final name.
    /// The rename is atomic on the same filesystem.
    pub fn commit(&self, partial: &Path, entry_name: &str) -> io::Result<PathBuf> {
        let dest = self.root.join(entry_name);
        std::fs::rename(partial, &dest)?;
        Ok(dest)
    }

    /// Completed entries with their sizes, partials excluded.
    pub fn entries(&self) -> io::Result<Vec<(String, u64)>> {
        let mut out = Vec::new();
        if !self.root.exists() {
            return Ok(out);
        }
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let meta = entry.metadata()?;
            if meta.is_file() {
                out.push((name, meta.len()));
            }
        }
        out.sort();
        Ok(out)
    }
}

/// Extension part of an artifact filename. Compound tar extensions stay
/// whole; otherwise the last dot segment wins, so dotted versions embedded
/// mid-name ("crc_libvirt_4.19.5_amd64.crcbundle") don't leak into it.
pub fn file_ext(name: &str) -> &str {
    for compound in ["tar.xz", "tar.gz", "tar.bz2"] {
        if name.len() > compound.len() + 1
            && name.ends_with(compound)
            && name.as_bytes()[name.len() - compound.len() - 1] == b'.'
        {
            return compound;
        }
    }
    name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("bin")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Os};
    use tempfile::TempDir;

    const AMD64: Platform = Platform::new(Os::Linux, Arch::Amd64);

    #[test]
    fn test_entry_name_layout() {
        assert_eq!(
            ReuseCache::entry_name(ArtifactKind::Binary, "2.54.0", AMD64, "tar.xz"),
            "binary_2.54.0_linux-amd64.tar.xz"
        );
        // bundles key on the family, not the os
        assert_eq!(
            ReuseCache::entry_name(ArtifactKind::Bundle, "2.54.0", AMD64, "crcbundle"),
            "bundle_2.54.0_libvirt-amd64.crcbundle"
        );
    }

    #[test]
    fn test_lookup_requires_min_size() {
        let dir = TempDir::new().unwrap();
        let cache = ReuseCache::new(dir.path());
        let path = cache.entry_path(ArtifactKind::Binary, "2.54.0", AMD64, "tar.xz");
        std::fs::write(&path, vec![0u8; 100]).unwrap();

        assert!(cache
            .lookup(ArtifactKind::Binary, "2.54.0", AMD64, "tar.xz", 1000)
            .is_none());
        let (hit, size) = cache
            .lookup(ArtifactKind::Binary, "2.54.0", AMD64, "tar.xz", 50)
            .unwrap();
        assert_eq!(hit, path);
        assert_eq!(size, 100);
    }

    #[test]
    fn test_lookup_misses_on_absent_entry() {
        let dir = TempDir::new().unwrap();
        let cache = ReuseCache::new(dir.path());
        assert!(cache
            .lookup(ArtifactKind::Bundle, "2.54.0", AMD64, "crcbundle", 1)
            .is_none());
    }

    #[test]
    fn test_commit_promotes_partial() {
        let dir = TempDir::new().unwrap();
        let cache = ReuseCache::new(dir.path());
        let name = ReuseCache::entry_name(ArtifactKind::Binary, "2.54.0", AMD64, "tar.xz");

        let partial = cache.partial_path(&name);
        std::fs::write(&partial, b"payload").unwrap();
        let dest = cache.commit(&partial, &name).unwrap();

        assert!(!partial.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn test_entries_skip_partials() {
        let dir = TempDir::new().unwrap();
        let cache = ReuseCache::new(dir.path());
        std::fs::write(dir.path().join("binary_2.54.0_linux-amd64.tar.xz"), b"x").unwrap();
        std::fs::write(cache.partial_path("bundle_x.crcbundle"), b"y").unwrap();

        let entries = cache.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "binary_2.54.0_linux-amd64.tar.xz");
    }

    #[test]
    fn test_file_ext() {
        assert_eq!(file_ext("crc-linux-amd64.tar.xz"), "tar.xz");
        assert_eq!(file_ext("crc_libvirt_4.19.5_amd64.crcbundle"), "crcbundle");
        assert_eq!(file_ext("noext"), "bin");
    }
}

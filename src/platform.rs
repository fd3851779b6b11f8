//! Target platforms and artifact kinds.
//!
//! A `Platform` is the (os, arch) pair a tool binary is built for. Bundles
//! are coarser: one bundle variant per hypervisor family serves every
//! platform of that family, so `bundle_variant()` collapses the os.

use std::fmt;
use std::str::FromStr;

/// Class of payload within a cache unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Small single-file executable archive, per (release, platform).
    Binary,
    /// Large data archive, per (release, bundle variant).
    Bundle,
}

impl ArtifactKind {
    /// Stable lowercase label, used in cache filenames and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactKind::Binary => "binary",
            ArtifactKind::Bundle => "bundle",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    Macos,
    Windows,
}

impl Os {
    pub fn name(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Macos => "macos",
            Os::Windows => "windows",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Amd64,
    Arm64,
}

impl Arch {
    pub fn name(&self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
        }
    }
}

/// One (os, arch) build target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub const fn new(os: Os, arch: Arch) -> Self {
        Platform { os, arch }
    }

    /// Stable key used in cache unit metadata and store paths.
    pub fn key(&self) -> String {
        format!("{}-{}", self.os.name(), self.arch.name())
    }

    /// Bundle variant serving this platform. Coarser than the platform
    /// itself: every linux target shares the libvirt bundle.
    pub fn bundle_variant(&self) -> &'static str {
        match self.os {
            Os::Linux => "libvirt",
            Os::Macos => "vfkit",
            Os::Windows => "hyperv",
        }
    }

    /// Cache key for an artifact kind. Bundles key on (variant, arch) so one
    /// cached bundle satisfies every platform of the family.
    pub fn cache_key(&self, kind: ArtifactKind) -> String {
        match kind {
            ArtifactKind::Binary => self.key(),
            ArtifactKind::Bundle => format!("{}-{}", self.bundle_variant(), self.arch.name()),
        }
    }

    /// Filename pattern for the tool binary archive on the mirrors.
    pub fn binary_pattern(&self) -> String {
        let ext = match self.os {
            Os::Windows => "zip",
            _ => "tar.xz",
        };
        format!("crc-{}-{}.{}", self.os.name(), self.arch.name(), ext)
    }

    /// Filename pattern for the data bundle, glob-matched inside the patch
    /// directory. The track is the minor version ("4.19"), the patch digit
    /// is whatever the mirror carries.
    pub fn bundle_pattern(&self, track: &str) -> String {
        format!(
            "crc_{}_{}.*_{}.crcbundle",
            self.bundle_variant(),
            track,
            self.arch.name()
        )
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.name(), self.arch.name())
    }
}

impl FromStr for Platform {
    type Err = String;

    /// Parses "linux-amd64" style keys. A bare arch ("amd64") defaults to
    /// linux, matching what the build triggers send.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (os_part, arch_part) = match s.split_once('-') {
            Some((os, arch)) => (os, arch),
            None => ("linux", s),
        };

        let os = match os_part {
            "linux" => Os::Linux,
            "macos" | "darwin" => Os::Macos,
            "windows" => Os::Windows,
            other => return Err(format!("unknown os: {}", other)),
        };
        let arch = match arch_part {
            "amd64" | "x86_64" => Arch::Amd64,
            "arm64" | "aarch64" => Arch::Arm64,
            other => return Err(format!("unknown arch: {}", other)),
        };

        Ok(Platform { os, arch })
    }
}

//! Failover mirror cache for CRC binary and bundle artifacts
//!
//! Upstream publishes a small per-platform tool binary and a multi-gigabyte
//! companion data bundle for every release, spread across mirror layouts that
//! change over time and occasionally disappear. This crate resolves a logical
//! version track (e.g. "4.19") to a concrete release, locates both artifacts
//! across the known layouts, reuses already-downloaded payloads from a local
//! cache, and publishes a verified, metadata-annotated cache unit, skipping
//! the whole pipeline when nothing changed upstream.
//!
//! # Pipeline
//!
//! ```text
//! (logical version, platform)
//!     -> resolve::VersionResolver   logical track -> release id
//!     -> probe::MirrorProber        release id    -> artifact URL
//!     -> acquire::ArtifactAcquirer  URL           -> local file (cache first)
//!     -> build::CacheUnitBuilder    files         -> published CacheUnit
//!     -> validate::CacheValidator   published unit -> pass/fail report
//! ```
//!
//! The reuse cache directory and all mirror/pin endpoints come from an
//! explicit [`config::MirrorConfig`] value; nothing reads ambient paths, so
//! the whole pipeline runs against temporary directories and mock servers in
//! tests.

pub mod acquire;
pub mod build;
pub mod cache;
pub mod config;
pub mod error;
pub mod output;
pub mod platform;
pub mod probe;
pub mod resolve;
pub mod transport;
pub mod unit;
pub mod validate;
pub mod version;

pub use build::{BuildOutcome, CacheUnitBuilder};
pub use config::MirrorConfig;
pub use error::MirrorError;
pub use platform::{ArtifactKind, Platform};
pub use transport::{HttpTransport, Transport};
pub use unit::{CacheUnit, FsUnitStore, UnitStore};
pub use validate::CacheValidator;

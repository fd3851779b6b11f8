//! Error taxonomy for the mirror pipeline.
//!
//! Every failure names the tuple it belongs to and the last concrete detail
//! observed (URL, HTTP status, byte count); callers never see a bare
//! "something failed".

use std::path::PathBuf;

use thiserror::Error;

use crate::platform::ArtifactKind;

/// Errors that can occur while resolving, acquiring, or publishing a unit.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// No version-resolution tier produced a release id. Fatal for the key.
    #[error("cannot resolve version {logical}: {reason}")]
    Resolution { logical: String, reason: String },

    /// No configured mirror layout yielded a matching artifact filename.
    #[error("no mirror has {kind} for release {release} ({platform}): {detail}")]
    NotFound {
        kind: ArtifactKind,
        release: String,
        platform: String,
        detail: String,
    },

    /// Network fetch exhausted its retries.
    #[error("transfer failed: {url}: {detail}")]
    Transfer { url: String, detail: String },

    /// The payload is below its minimum plausible size or failed the
    /// extraction probe. The bad artifact is discarded, never cached.
    #[error("integrity check failed for {}: {detail}", .path.display())]
    Integrity { path: PathBuf, detail: String },

    /// The packaging store rejected the unit.
    #[error("publish failed for {logical}/{platform}: {detail}")]
    Publish {
        logical: String,
        platform: String,
        detail: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MirrorError {
    /// Transfer error from a URL plus a human-readable cause.
    pub fn transfer(url: impl Into<String>, detail: impl Into<String>) -> Self {
        MirrorError::Transfer {
            url: url.into(),
            detail: detail.into(),
        }
    }
}

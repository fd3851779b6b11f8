//! Artifact acquisition: confirmed URL -> local file, reuse cache first.
//!
//! The cache is consulted before any network call. On a miss the payload is
//! streamed to a dotted partial file and renamed into the cache only when
//! the transfer completed and the size is plausible; a failed or undersized
//! attempt leaves nothing behind. Every successful download is written
//! through to the cache, so later builds for the same key skip the network
//! entirely.

use std::path::PathBuf;

use crate::cache::{ReuseCache, file_ext};
use crate::config::MirrorConfig;
use crate::error::MirrorError;
use crate::output;
use crate::platform::{ArtifactKind, Platform};
use crate::probe::Located;
use crate::transport::Transport;

/// A locally-available artifact plus its provenance.
#[derive(Debug, Clone)]
pub struct Acquired {
    pub path: PathBuf,
    pub size: u64,
    pub filename: String,
    pub url: String,
    pub from_cache: bool,
}

pub struct ArtifactAcquirer<'a> {
    config: &'a MirrorConfig,
    transport: &'a dyn Transport,
    cache: ReuseCache,
}

impl<'a> ArtifactAcquirer<'a> {
    pub fn new(config: &'a MirrorConfig, transport: &'a dyn Transport) -> Self {
        ArtifactAcquirer {
            config,
            transport,
            cache: ReuseCache::new(&config.cache_dir),
        }
    }

    pub fn cache(&self) -> &ReuseCache {
        &self.cache
    }

    /// Fetch an artifact into the reuse cache, or hand back the cached copy.
    pub fn acquire(
        &self,
        located: &Located,
        kind: ArtifactKind,
        release: &str,
        platform: Platform,
    ) -> Result<Acquired, MirrorError> {
        let min_size = self.config.min_size(kind);
        let ext = file_ext(&located.filename);

        if let Some((path, size)) = self.cache.lookup(kind, release, platform, ext, min_size) {
            output::detail(&format!(
                "reusing cached {} ({} bytes)",
                path.file_name().unwrap_or_default().to_string_lossy(),
                size
            ));
            return Ok(Acquired {
                path,
                size,
                filename: located.filename.clone(),
                url: located.url.clone(),
                from_cache: true,
            });
        }

        std::fs::create_dir_all(self.cache.root())?;
        let entry_name = ReuseCache::entry_name(kind, release, platform, ext);
        let partial = self.cache.partial_path(&entry_name);

        let attempts = self.config.download_attempts.max(1);
        let mut last_err = MirrorError::transfer(&located.url, "no download attempts configured");

        for attempt in 1..=attempts {
            match self.transport.fetch_file(&located.url, &partial) {
                Ok(size) => {
                    // A 200 with a tiny body is an HTML error page or a
                    // truncated payload, not the artifact. Discard, don't
                    // cache, don't retry: the server will keep serving it.
                    if size < min_size {
                        let _ = std::fs::remove_file(&partial);
                        return Err(MirrorError::Integrity {
                            path: self.cache.root().join(&entry_name),
                            detail: format!(
                                "{} bytes from {} is below the {} minimum of {} bytes",
                                size, located.url, kind, min_size
                            ),
                        });
                    }

                    let path = self.cache.commit(&partial, &entry_name)?;
                    output::detail(&format!("downloaded {} ({} bytes)", entry_name, size));
                    return Ok(Acquired {
                        path,
                        size,
                        filename: located.filename.clone(),
                        url: located.url.clone(),
                        from_cache: false,
                    });
                }
                Err(e) => {
                    let _ = std::fs::remove_file(&partial);
                    if attempt < attempts {
                        output::detail(&format!(
                            "download attempt {}/{} failed: {}, retrying",
                            attempt, attempts, e
                        ));
                        std::thread::sleep(self.config.retry_delay());
                    }
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }
}

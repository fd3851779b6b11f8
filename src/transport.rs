//! Byte-level HTTP transfer capability.
//!
//! The pipeline treats transfer as a capability: "fetch(url) -> bytes, or
//! fail". Components hold a `&dyn Transport`, so tests can count calls or
//! serve canned listings without a network. The production implementation
//! streams through ureq.
//!
//! Set `CRC_MIRROR_HTTP_TIMEOUT` to adjust the listing/metadata timeout.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::MirrorError;
use crate::output;

/// Default HTTP timeout in seconds for listings and small documents.
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Timeout for artifact downloads. Bundles are multi-gigabyte; the generous
/// fixed value covers slow mirrors without hanging forever.
const DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// Get HTTP timeout from environment variable or use default.
/// Cached for performance (only reads env var once).
fn get_http_timeout() -> Duration {
    static TIMEOUT: OnceLock<Duration> = OnceLock::new();
    *TIMEOUT.get_or_init(|| {
        let secs = std::env::var("CRC_MIRROR_HTTP_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
        // Clamp to reasonable range (5-300 seconds)
        Duration::from_secs(secs.clamp(5, 300))
    })
}

/// Plain byte-level transfer. Everything above this trait is resolution and
/// caching logic; everything below it is the network.
pub trait Transport {
    /// Fetch a URL body as text (directory listings, pin documents).
    fn fetch_text(&self, url: &str) -> Result<String, MirrorError>;

    /// Fetch a URL body into a local file, returning the byte count.
    ///
    /// Implementations must either write the complete payload or fail; a
    /// partial file left at `dest` on error is the caller's to discard.
    fn fetch_file(&self, url: &str, dest: &Path) -> Result<u64, MirrorError>;
}

/// ureq-backed production transport.
#[derive(Debug, Default)]
pub struct HttpTransport;

impl HttpTransport {
    pub fn new() -> Self {
        HttpTransport
    }
}

impl Transport for HttpTransport {
    fn fetch_text(&self, url: &str) -> Result<String, MirrorError> {
        let response = ureq::get(url)
            .timeout(get_http_timeout())
            .set("User-Agent", "crc-mirror")
            .call()
            .map_err(|e| MirrorError::transfer(url, describe(&e)))?;

        response
            .into_string()
            .map_err(|e| MirrorError::transfer(url, format!("failed to read response: {}", e)))
    }

    fn fetch_file(&self, url: &str, dest: &Path) -> Result<u64, MirrorError> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let filename = dest
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "download".to_string());
        let pb = output::download_spinner(&format!("downloading {}", filename));

        let response = ureq::get(url)
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .set("User-Agent", "crc-mirror")
            .call()
            .map_err(|e| MirrorError::transfer(url, describe(&e)))?;

        if let Some(len) = response
            .header("content-length")
            .and_then(|s| s.parse().ok())
        {
            output::upgrade_to_bytes(&pb, len);
        }

        let mut file = std::fs::File::create(dest)?;
        let mut reader = response.into_reader();
        let mut buffer = [0u8; 8192];
        let mut total_bytes = 0u64;

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| MirrorError::transfer(url, format!("read error: {}", e)))?;

            if bytes_read == 0 {
                break;
            }

            file.write_all(&buffer[..bytes_read])?;

            total_bytes += bytes_read as u64;
            pb.set_position(total_bytes);
        }

        pb.finish_and_clear();
        Ok(total_bytes)
    }
}

/// Human-readable cause including the HTTP status when there is one.
fn describe(e: &ureq::Error) -> String {
    match e {
        ureq::Error::Status(code, _) => format!("HTTP status {}", code),
        other => other.to_string(),
    }
}

/// Fetch text with bounded retries and doubling backoff.
///
/// Used for the remote pin document, where a transient failure should fall
/// through to the next resolution tier rather than abort the build.
pub fn fetch_text_with_retry(
    transport: &dyn Transport,
    url: &str,
    attempts: u32,
    base_delay: Duration,
) -> Result<String, MirrorError> {
    let mut delay = base_delay;
    let mut last_err = MirrorError::transfer(url, "no attempts configured");

    for attempt in 1..=attempts.max(1) {
        match transport.fetch_text(url) {
            Ok(body) => return Ok(body),
            Err(e) => {
                if attempt < attempts {
                    output::detail(&format!(
                        "fetch attempt {}/{} failed: {}, retrying",
                        attempt, attempts, e
                    ));
                    std::thread::sleep(delay);
                    delay *= 2;
                }
                last_err = e;
            }
        }
    }

    Err(last_err)
}

//! Shared fixtures: a wiremock upstream serving pins, listings, and
//! artifacts, plus a config pointed at it and at temp directories.

#![allow(dead_code)]

use std::path::Path;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crc_mirror::config::{MirrorConfig, MirrorLocation};

/// Test thresholds, small enough to exercise with in-memory payloads.
pub const MIN_BINARY: u64 = 64;
pub const MIN_BUNDLE: u64 = 256;

pub const BINARY_NAME: &str = "crc-linux-amd64.tar.xz";
pub const BUNDLE_NAME: &str = "crc_libvirt_4.19.5_amd64.crcbundle";

/// Config with one mirror layout rooted at the mock server.
pub fn test_config(server_uri: &str, root: &Path) -> MirrorConfig {
    MirrorConfig {
        cache_dir: root.join("artifacts"),
        store_dir: root.join("units"),
        pin_url: format!("{}/pins.json", server_uri),
        release_index_url: format!("{}/releases", server_uri),
        mirrors: vec![MirrorLocation {
            name: "mock".to_string(),
            binary_dir: format!("{}/pub/crc/{{release}}", server_uri),
            bundle_root: format!("{}/pub/bundles/{{track}}", server_uri),
        }],
        versions: vec!["4.19".to_string()],
        platforms: vec!["linux-amd64".to_string()],
        min_binary_size: MIN_BINARY,
        min_bundle_size: MIN_BUNDLE,
        retry_delay_secs: 0,
        ..MirrorConfig::default()
    }
}

/// A real tar.xz archive holding a fake `crc` tool, padded with
/// incompressible bytes so it comfortably clears [`MIN_BINARY`].
pub fn tool_archive() -> Vec<u8> {
    let encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    let mut builder = tar::Builder::new(encoder);

    let data: Vec<u8> = (0..4096u32)
        .map(|i| (i.wrapping_mul(2654435761) >> 24) as u8)
        .collect();
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder
        .append_data(&mut header, "crc-linux-2.54.0-amd64/crc", data.as_slice())
        .unwrap();

    builder.into_inner().unwrap().finish().unwrap()
}

/// Bundle payload above [`MIN_BUNDLE`].
pub fn bundle_bytes() -> Vec<u8> {
    vec![0xb5; 512]
}

pub async fn mount_body(server: &MockServer, route: &str, body: impl Into<Vec<u8>>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.into()))
        .mount(server)
        .await;
}

pub async fn mount_listing(server: &MockServer, route: &str, hrefs: &[&str]) {
    let body: String = hrefs
        .iter()
        .map(|h| format!("<a href=\"{}\">{}</a>\n", h, h))
        .collect();
    mount_body(server, route, body.into_bytes()).await;
}

/// Mount a complete healthy upstream for track 4.19 at release 2.54.0:
/// binary under the release directory, bundle behind the two-level patch
/// layout with 4.19.5 as the highest patch.
pub async fn mount_healthy_upstream(server: &MockServer) {
    mount_listing(
        server,
        "/pub/crc/2.54.0/",
        &["../", BINARY_NAME, "sha256sum.txt"],
    )
    .await;
    mount_body(
        server,
        &format!("/pub/crc/2.54.0/{}", BINARY_NAME),
        tool_archive(),
    )
    .await;

    mount_listing(server, "/pub/bundles/4.19/", &["../", "4.19.3/", "4.19.5/"]).await;
    mount_listing(
        server,
        "/pub/bundles/4.19/4.19.5/",
        &[BUNDLE_NAME, "crc_libvirt_4.19.5_arm64.crcbundle"],
    )
    .await;
    mount_body(
        server,
        &format!("/pub/bundles/4.19/4.19.5/{}", BUNDLE_NAME),
        bundle_bytes(),
    )
    .await;
}

/// How many requests the server has seen for a given path.
pub async fn requests_for(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == route)
        .count()
}

/// Total requests the server has seen.
pub async fn total_requests(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

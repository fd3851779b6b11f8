//! End-to-end pipeline tests against a mock upstream.
//!
//! These drive the real HTTP transport through resolution, probing,
//! acquisition, publication, and validation, with wiremock standing in for
//! the mirror network.

mod common;

use chrono::Utc;
use tempfile::TempDir;
use wiremock::MockServer;

use crc_mirror::build::{BuildOutcome, CacheUnitBuilder};
use crc_mirror::config::MirrorLocation;
use crc_mirror::error::MirrorError;
use crc_mirror::platform::Platform;
use crc_mirror::resolve::VersionResolver;
use crc_mirror::transport::HttpTransport;
use crc_mirror::unit::{FsUnitStore, UnitStore};
use crc_mirror::validate::CacheValidator;

use common::{
    BINARY_NAME, BUNDLE_NAME, bundle_bytes, mount_body, mount_healthy_upstream, mount_listing,
    requests_for, test_config, tool_archive, total_requests,
};

#[tokio::test]
async fn test_end_to_end_build_and_validate() {
    let server = MockServer::start().await;
    mount_healthy_upstream(&server).await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), dir.path());
    config.pins.insert("4.19".to_string(), "2.54.0".to_string());

    let start = Utc::now();
    let transport = HttpTransport::new();
    let store = FsUnitStore::new(&config.store_dir);
    let platform: Platform = "amd64".parse().unwrap();

    let builder = CacheUnitBuilder::new(&config, &transport, &store);
    let outcome = builder.build("4.19", platform, false).unwrap();

    let BuildOutcome::Built { unit, .. } = outcome else {
        panic!("expected a freshly built unit");
    };
    assert_eq!(unit.release_id, "2.54.0");
    assert_eq!(unit.binary_name, BINARY_NAME);
    assert_eq!(unit.bundle_name, BUNDLE_NAME);
    assert!(unit.binary_size >= common::MIN_BINARY);
    assert!(unit.bundle_size >= common::MIN_BUNDLE);
    assert!(unit.build_date >= start);
    assert!(unit.mirror_url.ends_with("/pub/crc/2.54.0/crc-linux-amd64.tar.xz"));
    assert!(unit
        .bundle_url
        .ends_with("/pub/bundles/4.19/4.19.5/crc_libvirt_4.19.5_amd64.crcbundle"));

    // The validator pulls the published unit fresh and signs off on it.
    let report = CacheValidator::new(&config, &store).validate("4.19", platform);
    assert!(report.passed(), "validation failed: {:?}", report.fail);
}

#[tokio::test]
async fn test_second_build_is_skipped_without_network() {
    let server = MockServer::start().await;
    mount_healthy_upstream(&server).await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), dir.path());
    config.pins.insert("4.19".to_string(), "2.54.0".to_string());

    let transport = HttpTransport::new();
    let store = FsUnitStore::new(&config.store_dir);
    let platform: Platform = "linux-amd64".parse().unwrap();
    let builder = CacheUnitBuilder::new(&config, &transport, &store);

    builder.build("4.19", platform, false).unwrap();
    let before = total_requests(&server).await;

    let outcome = builder.build("4.19", platform, false).unwrap();
    assert!(matches!(outcome, BuildOutcome::Skipped { ref release } if release == "2.54.0"));
    assert_eq!(total_requests(&server).await, before);
}

#[tokio::test]
async fn test_force_rebuild_reuses_cached_artifacts() {
    let server = MockServer::start().await;
    mount_healthy_upstream(&server).await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), dir.path());
    config.pins.insert("4.19".to_string(), "2.54.0".to_string());

    let transport = HttpTransport::new();
    let store = FsUnitStore::new(&config.store_dir);
    let platform: Platform = "linux-amd64".parse().unwrap();
    let builder = CacheUnitBuilder::new(&config, &transport, &store);

    builder.build("4.19", platform, false).unwrap();
    let binary_route = format!("/pub/crc/2.54.0/{}", BINARY_NAME);
    let fetched_once = requests_for(&server, &binary_route).await;
    assert_eq!(fetched_once, 1);

    // force bypasses the skip, but the reuse cache still spares the payloads
    let outcome = builder.build("4.19", platform, true).unwrap();
    assert!(matches!(outcome, BuildOutcome::Built { .. }));
    assert_eq!(requests_for(&server, &binary_route).await, 1);
}

#[tokio::test]
async fn test_mirror_fallback_tries_locations_in_order() {
    let server = MockServer::start().await;

    // Primary layout serves nothing; the fallback layout is healthy.
    mount_listing(&server, "/alt/crc/2.54.0/", &["../", BINARY_NAME]).await;
    mount_body(
        &server,
        &format!("/alt/crc/2.54.0/{}", BINARY_NAME),
        tool_archive(),
    )
    .await;
    mount_listing(&server, "/alt/bundles/4.19/", &["4.19.5/"]).await;
    mount_listing(&server, "/alt/bundles/4.19/4.19.5/", &[BUNDLE_NAME]).await;
    mount_body(
        &server,
        &format!("/alt/bundles/4.19/4.19.5/{}", BUNDLE_NAME),
        bundle_bytes(),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), dir.path());
    config.pins.insert("4.19".to_string(), "2.54.0".to_string());
    config.mirrors.push(MirrorLocation {
        name: "fallback".to_string(),
        binary_dir: format!("{}/alt/crc/{{release}}", server.uri()),
        bundle_root: format!("{}/alt/bundles/{{track}}", server.uri()),
    });

    let transport = HttpTransport::new();
    let store = FsUnitStore::new(&config.store_dir);
    let platform: Platform = "linux-amd64".parse().unwrap();
    let builder = CacheUnitBuilder::new(&config, &transport, &store);

    let outcome = builder.build("4.19", platform, false).unwrap();
    let BuildOutcome::Built { unit, .. } = outcome else {
        panic!("expected Built");
    };
    assert!(unit.mirror_url.contains("/alt/crc/2.54.0/"));
    // the dead primary layout was actually consulted first
    assert_eq!(requests_for(&server, "/pub/crc/2.54.0/").await, 1);
}

#[tokio::test]
async fn test_truncated_binary_is_rejected_not_published() {
    let server = MockServer::start().await;
    mount_listing(&server, "/pub/crc/2.54.0/", &[BINARY_NAME]).await;
    // an HTML error page where the archive should be
    mount_body(
        &server,
        &format!("/pub/crc/2.54.0/{}", BINARY_NAME),
        b"<html>moved</html>".to_vec(),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), dir.path());
    config.pins.insert("4.19".to_string(), "2.54.0".to_string());

    let transport = HttpTransport::new();
    let store = FsUnitStore::new(&config.store_dir);
    let platform: Platform = "linux-amd64".parse().unwrap();
    let builder = CacheUnitBuilder::new(&config, &transport, &store);

    let err = builder.build("4.19", platform, false).unwrap_err();
    assert!(matches!(err, MirrorError::Integrity { .. }));
    assert!(err.to_string().contains("bytes"));

    // neither cached nor published
    assert!(store.pull("4.19", platform).unwrap().is_none());
    let leftovers: Vec<_> = std::fs::read_dir(&config.cache_dir)
        .map(|it| it.collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty(), "cache polluted: {:?}", leftovers);
}

#[tokio::test]
async fn test_prepopulated_cache_skips_artifact_downloads() {
    let server = MockServer::start().await;
    // listings only; the artifact payloads are deliberately not mounted
    mount_listing(&server, "/pub/crc/2.54.0/", &[BINARY_NAME]).await;
    mount_listing(&server, "/pub/bundles/4.19/", &["4.19.5/"]).await;
    mount_listing(&server, "/pub/bundles/4.19/4.19.5/", &[BUNDLE_NAME]).await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), dir.path());
    config.pins.insert("4.19".to_string(), "2.54.0".to_string());

    // pre-populate the reuse cache under the canonical names
    std::fs::create_dir_all(&config.cache_dir).unwrap();
    std::fs::write(
        config.cache_dir.join("binary_2.54.0_linux-amd64.tar.xz"),
        tool_archive(),
    )
    .unwrap();
    std::fs::write(
        config.cache_dir.join("bundle_2.54.0_libvirt-amd64.crcbundle"),
        bundle_bytes(),
    )
    .unwrap();

    let transport = HttpTransport::new();
    let store = FsUnitStore::new(&config.store_dir);
    let platform: Platform = "linux-amd64".parse().unwrap();
    let builder = CacheUnitBuilder::new(&config, &transport, &store);

    let outcome = builder.build("4.19", platform, false).unwrap();
    assert!(matches!(outcome, BuildOutcome::Built { .. }));
    assert_eq!(
        requests_for(&server, &format!("/pub/crc/2.54.0/{}", BINARY_NAME)).await,
        0
    );
    assert_eq!(
        requests_for(
            &server,
            &format!("/pub/bundles/4.19/4.19.5/{}", BUNDLE_NAME)
        )
        .await,
        0
    );
}

#[tokio::test]
async fn test_auto_pin_resolves_via_release_index() {
    let server = MockServer::start().await;
    mount_body(
        &server,
        "/pins.json",
        br#"{"version_pins": {"4.19": "auto"}}"#.to_vec(),
    )
    .await;
    mount_body(
        &server,
        "/releases",
        serde_json::to_vec(&serde_json::json!([
            {"tag_name": "v2.56.0", "name": "2.56.0-4.20.1"},
            {"tag_name": "v2.55.0", "name": "2.55.0-4.19.7"},
        ]))
        .unwrap(),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());
    let transport = HttpTransport::new();

    let release = VersionResolver::new(&config, &transport)
        .resolve("4.19")
        .unwrap();
    assert_eq!(release, "2.55.0");
}

#[tokio::test]
async fn test_auto_pin_degrades_to_latest_when_no_name_matches() {
    let server = MockServer::start().await;
    mount_body(
        &server,
        "/pins.json",
        br#"{"version_pins": {"4.99": "auto"}}"#.to_vec(),
    )
    .await;
    mount_body(
        &server,
        "/releases",
        serde_json::to_vec(&serde_json::json!([
            {"tag_name": "v2.56.0", "name": "2.56.0-4.20.1"},
            {"tag_name": "v2.55.0", "name": "2.55.0-4.19.7"},
        ]))
        .unwrap(),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());
    let transport = HttpTransport::new();

    let release = VersionResolver::new(&config, &transport)
        .resolve("4.99")
        .unwrap();
    assert_eq!(release, "2.56.0");
}

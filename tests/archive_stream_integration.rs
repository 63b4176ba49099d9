//! Region archive bodies that are slow, stalled, cut short or mislabelled.
//!
//! Framing cases run against the raw loopback portal; content cases run
//! against wiremock.

mod support;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sicar_core::{
    AttemptError, CaptchaRetryPolicy, DownloadError, PolygonKind, PortalError, Region, Sicar,
    SicarConfig,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use support::loopback::{ArchiveScript, mock_server, spawn_raw_portal};
use support::portal::{STATE_DOWNLOAD_PATH, ScriptedSolver, mount_portal, test_config, zip_bytes};

async fn connect_raw(base_url: String, request_timeout_secs: u64) -> Sicar {
    let mut config = SicarConfig::with_base_url(base_url);
    config.jitter_max_ms = 0;
    config.request_timeout_secs = request_timeout_secs;
    Sicar::connect(&config, Arc::new(ScriptedSolver::always("12345")))
        .await
        .expect("session should initialize")
        .with_retry_policy(CaptchaRetryPolicy::new(1, Duration::ZERO))
}

fn leftover_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .expect("read output dir")
        .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_slow_archive_outlives_request_timeout() {
    let archive = zip_bytes(12);
    let script = ArchiveScript::trickle(&archive, 1, Duration::from_millis(250));
    let Some(base_url) = spawn_raw_portal(script).await else {
        return;
    };

    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut sicar = connect_raw(base_url, 1).await;
    let saved = sicar
        .download_region_polygon_to(Region::PA, PolygonKind::Hydrography, temp_dir.path())
        .await
        .expect("a body that keeps arriving should not time out");

    assert_eq!(std::fs::read(&saved).expect("read archive"), archive);
    assert_eq!(leftover_files(temp_dir.path()), vec!["PA_HIDROGRAFIA.zip"]);
}

#[tokio::test]
async fn test_stalled_archive_hits_read_timeout() {
    let script = ArchiveScript::whole(zip_bytes(64))
        .declaring(128)
        .then_stall(Duration::from_secs(5));
    let Some(base_url) = spawn_raw_portal(script).await else {
        return;
    };

    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut sicar = connect_raw(base_url, 1).await;
    let err = sicar
        .download_region_polygon_to(Region::SP, PolygonKind::Apps, temp_dir.path())
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            DownloadError::Exhausted {
                attempts: 1,
                last_error: AttemptError::Transport {
                    source: PortalError::Timeout { .. }
                },
                ..
            }
        ),
        "unexpected error: {err:?}"
    );
    assert!(leftover_files(temp_dir.path()).is_empty());
}

#[tokio::test]
async fn test_huge_declared_length_is_not_preallocated() {
    let script = ArchiveScript::whole(b"PK\x03\x04".to_vec()).declaring(100_000_000_000_000);
    let Some(base_url) = spawn_raw_portal(script).await else {
        return;
    };

    let mut sicar = connect_raw(base_url, 5).await;
    let err = sicar
        .download_region_polygon(Region::SP, PolygonKind::Apps)
        .await
        .unwrap_err();

    assert!(
        matches!(err, DownloadError::Exhausted { attempts: 1, .. }),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_truncated_archive_leaves_no_files() {
    let script = ArchiveScript::whole(zip_bytes(50)).declaring(100);
    let Some(base_url) = spawn_raw_portal(script).await else {
        return;
    };

    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut sicar = connect_raw(base_url, 5).await;
    let err = sicar
        .download_region_polygon_to(Region::RJ, PolygonKind::AreaProperty, temp_dir.path())
        .await
        .unwrap_err();

    assert!(
        matches!(err, DownloadError::Exhausted { attempts: 1, .. }),
        "unexpected error: {err:?}"
    );
    assert!(
        leftover_files(temp_dir.path()).is_empty(),
        "left behind: {:?}",
        leftover_files(temp_dir.path())
    );
}

#[tokio::test]
async fn test_truncated_archive_keeps_existing_file() {
    let script = ArchiveScript::whole(zip_bytes(50)).declaring(100);
    let Some(base_url) = spawn_raw_portal(script).await else {
        return;
    };

    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let existing = temp_dir.path().join("SP_APPS.zip");
    std::fs::write(&existing, b"previous release").expect("seed archive");

    let mut sicar = connect_raw(base_url, 5).await;
    sicar
        .download_region_polygon_to(Region::SP, PolygonKind::Apps, temp_dir.path())
        .await
        .unwrap_err();

    assert_eq!(std::fs::read(&existing).expect("read archive"), b"previous release");
    assert!(!temp_dir.path().join("SP_APPS.zip.part").exists());
}

#[tokio::test]
async fn test_close_delimited_archive_is_accepted() {
    let mut script = ArchiveScript::whole(zip_bytes(300));
    script.content_length = None;
    let Some(base_url) = spawn_raw_portal(script).await else {
        return;
    };

    let mut sicar = connect_raw(base_url, 5).await;
    let outcome = sicar
        .download_region_polygon(Region::MT, PolygonKind::Apps)
        .await
        .expect("an unannounced length is fine");

    assert_eq!(outcome.bytes, zip_bytes(300));
}

#[tokio::test]
async fn test_zip_typed_html_body_is_rejected() {
    let Some(server) = mock_server().await else {
        return;
    };
    mount_portal(&server).await;
    Mock::given(method("GET"))
        .and(path(STATE_DOWNLOAD_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><p>Captcha inválido</p></html>", "application/zip"),
        )
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut sicar = Sicar::connect(&test_config(&server), Arc::new(ScriptedSolver::always("12345")))
        .await
        .expect("session should initialize")
        .with_retry_policy(CaptchaRetryPolicy::new(2, Duration::ZERO));
    let err = sicar
        .download_region_polygon_to(Region::SP, PolygonKind::Apps, temp_dir.path())
        .await
        .unwrap_err();

    match err {
        DownloadError::Exhausted {
            attempts: 2,
            last_error: AttemptError::Rejected { status: 200, reason },
            ..
        } => assert!(reason.contains("not a ZIP"), "reason: {reason}"),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(leftover_files(temp_dir.path()).is_empty());
}

#[tokio::test]
async fn test_zip_typed_body_shorter_than_signature_is_rejected() {
    let Some(server) = mock_server().await else {
        return;
    };
    mount_portal(&server).await;
    Mock::given(method("GET"))
        .and(path(STATE_DOWNLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"PK".to_vec(), "application/zip"))
        .mount(&server)
        .await;

    let mut sicar = Sicar::connect(&test_config(&server), Arc::new(ScriptedSolver::always("12345")))
        .await
        .expect("session should initialize")
        .with_retry_policy(CaptchaRetryPolicy::new(1, Duration::ZERO));
    let err = sicar
        .download_region_polygon(Region::SP, PolygonKind::Apps)
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            DownloadError::Exhausted {
                last_error: AttemptError::Rejected { .. },
                ..
            }
        ),
        "unexpected error: {err:?}"
    );
}

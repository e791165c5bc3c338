//! Integration tests for surya-audit API endpoints

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use image::{Rgb, RgbImage};
use surya_audit::services::{
    AuditLifecycle, LocalImageSource, OverlayRenderer, RecordStore, SidecarDetector,
};
use surya_audit::workflow::{BatchRunner, SitePipeline};
use surya_common::config::{ImageryConfig, RootLayout, ThresholdConfig};
use surya_common::{BufferZone, QcStatus, SiteRecord};
use tower::util::ServiceExt;

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

struct TestApp {
    _dir: tempfile::TempDir,
    store: Arc<RecordStore>,
    uploads: std::path::PathBuf,
    router: axum::Router,
}

/// Test helper: app over a temporary root with one NOT_VERIFIABLE record "S1"
fn create_test_app() -> TestApp {
    build_app(false)
}

/// As [`create_test_app`], plus single-site audits over local imagery where
/// "S9" is an unrecorded roof with a panel at the center
fn create_auditing_app() -> TestApp {
    build_app(true)
}

fn build_app(with_auditor: bool) -> TestApp {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let layout = RootLayout::new(dir.path());
    layout.ensure_directories().unwrap();
    let store = Arc::new(RecordStore::open(layout.records_dir()).unwrap());
    let uploads = layout.citizen_uploads_dir();

    let mut rec = SiteRecord::new("S1", 12.97, 77.59);
    rec.buffer_zone = BufferZone::ZoneA;
    rec.push_note("Severe Shadow (Level: 21.4)");
    store.save(&mut rec).unwrap();

    let lifecycle = AuditLifecycle::new(Arc::clone(&store), &uploads);
    let mut state = surya_audit::AppState::new(Arc::clone(&store), lifecycle);
    if with_auditor {
        RgbImage::from_pixel(640, 640, Rgb([160, 160, 160]))
            .save(layout.images_dir().join("S9.png"))
            .unwrap();
        std::fs::write(
            layout.detections_dir().join("S9.json"),
            r#"[{"bbox": [330, 305, 370, 335], "confidence": 0.6}]"#,
        )
        .unwrap();

        let runner = BatchRunner::new(
            Arc::clone(&store),
            Arc::new(LocalImageSource::new(layout.images_dir())),
            Arc::new(SidecarDetector::new(layout.detections_dir())),
            SitePipeline::new(&ThresholdConfig::default()),
            ImageryConfig::default(),
        )
        .with_overlays(OverlayRenderer::from_thresholds(&ThresholdConfig::default()), layout.audits_dir());
        state = state.with_auditor(Arc::new(runner));
    }
    let router = surya_audit::build_router(state);

    TestApp {
        _dir: dir,
        store,
        uploads,
        router,
    }
}

async fn send(app: &TestApp, method: &str, uri: &str, body: Body) -> (StatusCode, Vec<u8>) {
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().method(method).uri(uri).body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, bytes)
}

async fn post_json(app: &TestApp, uri: &str, value: Value) -> (StatusCode, Value) {
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(value.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn json_of(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();
    let (status, body) = send(&app, "GET", "/health", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);

    let body = json_of(&body);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "surya-audit");
    assert!(body["build"]["commit"].is_string());
    assert_eq!(body["audits_enabled"], false);
}

#[tokio::test]
async fn test_get_record_and_missing_record() {
    let app = create_test_app();

    let (status, body) = send(&app, "GET", "/api/records/S1", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_of(&body);
    assert_eq!(body["qc_status"], "NOT_VERIFIABLE");
    assert_eq!(body["revision"], 1);

    let (status, body) = send(&app, "GET", "/api/records/S404", Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_of(&body)["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_full_appeal_flow_over_http() {
    let app = create_test_app();

    let (status, _) = send(&app, "POST", "/api/records/S1/flag", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", "/api/records/S1/appeal", Body::from(PNG_MAGIC)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["qc_status"], "PENDING_CITIZEN_APPEAL");
    assert!(app.uploads.join("S1_proof.png").exists());

    let (status, body) = post_json(&app, "/api/records/S1/accept-solar", json!({"zone": "ZONE_B"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["qc_status"], "VERIFIABLE");
    assert_eq!(body["has_solar"], true);
    assert_eq!(body["buffer_zone"], "ZONE_B");

    let stored = app.store.load("S1").unwrap();
    assert_eq!(stored.qc_notes.len(), 4);
    assert_eq!(stored.revision, 4);
}

#[tokio::test]
async fn test_accept_solar_without_body_uses_stored_zone() {
    let app = create_test_app();
    send(&app, "POST", "/api/records/S1/appeal", Body::from(PNG_MAGIC)).await;

    let (status, body) = send(&app, "POST", "/api/records/S1/accept-solar", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["buffer_zone"], "ZONE_A");
}

#[tokio::test]
async fn test_invalid_transition_is_400() {
    let app = create_test_app();
    let (status, body) = send(&app, "POST", "/api/records/S1/verify-empty", Body::empty()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_of(&body)["error"]["code"], "BAD_REQUEST");
    assert_eq!(app.store.load("S1").unwrap().revision, 1);
}

#[tokio::test]
async fn test_empty_appeal_rejected() {
    let app = create_test_app();
    let (status, _) = send(&app, "POST", "/api/records/S1/appeal", Body::empty()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.store.load("S1").unwrap().qc_status, QcStatus::NotVerifiable);
}

#[tokio::test]
async fn test_override_endpoint() {
    let app = create_test_app();
    let (status, body) = post_json(
        &app,
        "/api/records/S1/override",
        json!({"verdict": "EMPTY", "notes": ["Checked on site visit"]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["qc_status"], "VERIFIABLE");
    assert_eq!(body["has_solar"], false);
    assert_eq!(body["qc_notes"][0], "Checked on site visit");
    assert_eq!(body["qc_notes"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_tampered_record_reports_integrity_error() {
    let app = create_test_app();
    let path = app.store.path_for("S1").unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, text.replace("77.59", "77.6")).unwrap();
    app.store.invalidate("S1").unwrap();

    let (status, body) = send(&app, "GET", "/api/records/S1", Body::empty()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_of(&body)["error"]["code"], "INTEGRITY_ERROR");

    let (_, list) = send(&app, "GET", "/api/records", Body::empty()).await;
    let list = json_of(&list);
    assert_eq!(list["records"].as_array().unwrap().len(), 0);
    assert_eq!(list["failures"][0]["sample_id"], "S1");

    let (_, health) = send(&app, "GET", "/health", Body::empty()).await;
    let health = json_of(&health);
    assert_eq!(health["status"], "degraded");
    assert!(health["last_error"].is_string());
}

#[tokio::test]
async fn test_report_endpoint() {
    let app = create_test_app();
    let (status, body) = send(&app, "GET", "/api/records/S1/report", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("Sample ID:        S1"));
    assert!(text.contains("NOT VERIFIABLE"));
}

#[tokio::test]
async fn test_pending_reviews_listed_first() {
    let app = create_test_app();
    let mut other = SiteRecord::new("A0", 12.0, 77.0);
    other.qc_status = QcStatus::Verifiable;
    app.store.save(&mut other).unwrap();

    send(&app, "POST", "/api/records/S1/flag", Body::empty()).await;

    let (status, body) = send(&app, "GET", "/api/records", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<String> = json_of(&body)["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["sample_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["S1", "A0"]);
}

#[tokio::test]
async fn test_summary_counts_certified_area_only() {
    let app = create_test_app();
    let mut solar = SiteRecord::new("S2", 12.0, 77.0);
    solar.qc_status = QcStatus::Verifiable;
    solar.has_solar = true;
    solar.buffer_zone = BufferZone::ZoneA;
    solar.total_area_sqm = 20.0;
    app.store.save(&mut solar).unwrap();

    let (status, body) = send(&app, "GET", "/api/summary", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_of(&body);
    assert_eq!(body["total_sites"], 2);
    assert_eq!(body["solar_verified_sites"], 1);
    assert_eq!(body["not_verifiable_sites"], 1);
    assert_eq!(body["verified_area_sqm"], 20.0);
    assert_eq!(body["capacity_kw"], 3.0);
    assert_eq!(body["carbon_offset_tons"], 3.6);
}

#[tokio::test]
async fn test_single_site_audit_disabled_without_auditor() {
    let app = create_test_app();
    let (status, body) = post_json(
        &app,
        "/api/audits",
        json!({"sample_id": "S9", "latitude": 0.0, "longitude": 77.6}),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "UNAVAILABLE");
}

#[tokio::test]
async fn test_single_site_audit_writes_record_and_overlay() {
    let app = create_auditing_app();
    let (status, body) = post_json(
        &app,
        "/api/audits",
        json!({"sample_id": "S9", "latitude": 0.0, "longitude": 77.6}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["qc_status"], "VERIFIABLE");
    assert_eq!(body["record"]["has_solar"], true);
    assert_eq!(body["record"]["revision"], 1);
    assert!(app.store.exists("S9"));
    assert!(app._dir.path().join("audits/S9_audit.jpg").exists());

    // the verdict now stands; a second audit leaves it alone
    let (status, body) = post_json(
        &app,
        "/api/audits",
        json!({"sample_id": "S9", "latitude": 0.0, "longitude": 77.6}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"]["message"].as_str().unwrap().contains("VERIFIABLE"));
    assert_eq!(app.store.load("S9").unwrap().revision, 1);
}

#[tokio::test]
async fn test_single_site_audit_failures() {
    let app = create_auditing_app();

    // S1 is NOT_VERIFIABLE, so it may be re-audited, but it has no image
    let (status, body) = post_json(
        &app,
        "/api/audits",
        json!({"sample_id": "S1", "latitude": 12.97, "longitude": 77.59}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "FETCH_ERROR");
    assert_eq!(app.store.load("S1").unwrap().revision, 1);

    let (status, _) = post_json(
        &app,
        "/api/audits",
        json!({"sample_id": "../S9", "latitude": 0.0, "longitude": 77.6}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

//! Whole-application tests: full router, real vendor client against a mock datasheet API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::Application;
use crate::config::{Config, CorsOrigin};
use crate::test_utils::{FakeDatasheet, create_test_app, create_test_config, png_bytes};
use crate::vendor::VikaDatasheet;

fn vendor_ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "code": 200,
        "message": "SUCCESS",
        "data": data,
    }))
}

async fn vika_app(server: &MockServer, config: Config) -> axum_test::TestServer {
    let mut config = config;
    config.vendor.base_url = format!("{}/fusion/v1", server.uri()).parse().unwrap();
    crate::install_crypto_provider();
    let datasheet = VikaDatasheet::new(&config.vendor).unwrap();
    Application::with_datasheet(config, Arc::new(datasheet))
        .await
        .expect("Failed to create application")
        .into_test_server()
}

#[test_log::test(tokio::test)]
async fn test_healthz() {
    let dir = tempfile::tempdir().unwrap();
    let server = create_test_app(Arc::new(FakeDatasheet::default()), dir.path()).await;

    let response = server.get("/healthz").await;

    response.assert_status_ok();
    response.assert_text("OK");
}

#[test_log::test(tokio::test)]
async fn test_uploads_dir_is_created_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    assert!(!dir.path().join("uploads").exists());

    let _server = create_test_app(Arc::new(FakeDatasheet::default()), dir.path()).await;

    assert!(dir.path().join("uploads").is_dir());
}

#[test_log::test(tokio::test)]
async fn test_created_meeting_is_listed() {
    let dir = tempfile::tempdir().unwrap();
    let server = create_test_app(Arc::new(FakeDatasheet::default()), dir.path()).await;

    let created = server
        .post("/api/meetings")
        .json(&json!({
            "conference_date": "1718000000000",
            "conference_location": "Room 4",
            "conference_theme": "Roadmap",
            "conference_content": "Agreed on Q3 scope",
        }))
        .await;
    created.assert_status_ok();
    let created: Value = created.json();
    let record_id = created["data"]["records"][0]["recordId"].as_str().unwrap().to_string();

    let listed: Value = server.get("/api/meetings").await.json();
    assert_eq!(listed["code"], 200);
    assert_eq!(listed["data"]["total"], 1);
    let record = &listed["data"]["records"][0];
    assert_eq!(record["recordId"], record_id.as_str());
    assert_eq!(record["fields"]["conference_date"], 1718000000000i64);
    assert_eq!(record["fields"]["conference_theme"], "Roadmap");

    server
        .delete(&format!("/api/meetings/{record_id}"))
        .await
        .assert_status_ok();
    let listed: Value = server.get("/api/meetings").await.json();
    assert_eq!(listed["data"]["total"], 0);
}

#[test_log::test(tokio::test)]
async fn test_meetings_against_vika_api() {
    let vika = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fusion/v1/datasheets/dst-test/records"))
        .and(query_param("viewId", "viw-test"))
        .and(query_param("fieldKey", "name"))
        .and(header("authorization", "Bearer usk-test"))
        .respond_with(vendor_ok(json!({
            "total": 1,
            "pageNum": 1,
            "pageSize": 1,
            "records": [{"recordId": "recA", "fields": {"conference_theme": "Retro"}}],
        })))
        .expect(1)
        .mount(&vika)
        .await;
    Mock::given(method("POST"))
        .and(path("/fusion/v1/datasheets/dst-test/records"))
        .and(body_partial_json(json!({
            "fieldKey": "name",
            "records": [{"fields": {"conference_theme": "Planning", "conference_date": 1718000000000i64}}],
        })))
        .respond_with(vendor_ok(json!({
            "records": [{"recordId": "recB", "fields": {"conference_theme": "Planning"}}],
        })))
        .expect(1)
        .mount(&vika)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let server = vika_app(&vika, create_test_config(dir.path())).await;

    let listed = server.get("/api/meetings").await;
    listed.assert_status_ok();
    let listed: Value = listed.json();
    assert_eq!(listed["message"], "Meeting records fetched");
    assert_eq!(listed["data"]["records"][0]["recordId"], "recA");

    let created = server
        .post("/api/meetings")
        .json(&json!({
            "conference_date": 1718000000000i64,
            "conference_location": "Room 1",
            "conference_theme": "Planning",
            "conference_content": "Sprint goals",
        }))
        .await;
    created.assert_status_ok();
    let created: Value = created.json();
    assert_eq!(created["data"]["records"][0]["recordId"], "recB");
}

#[test_log::test(tokio::test)]
async fn test_vika_rejection_is_reported_with_vendor_payload() {
    let vika = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/fusion/v1/datasheets/dst-test/records"))
        .and(query_param("recordIds", "recGone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "code": 301,
            "message": "record not exist",
        })))
        .mount(&vika)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let server = vika_app(&vika, create_test_config(dir.path())).await;

    let response = server.delete("/api/meetings/recGone").await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], 500);
    assert_eq!(body["message"], "Failed to delete meeting record");
    assert_eq!(body["error"]["code"], 301);
    assert_eq!(body["error"]["message"], "record not exist");
}

#[test_log::test(tokio::test)]
async fn test_upload_against_vika_api() {
    let vika = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fusion/v1/datasheets/dst-test/attachments"))
        .respond_with(vendor_ok(json!({
            "id": "atcX",
            "name": "slide.png",
            "size": 120,
            "mimeType": "image/png",
            "token": "space/2024/slide.png",
            "width": 3,
            "height": 3,
            "url": "https://s1.vika.cn/space/2024/slide.png",
        })))
        .expect(1)
        .mount(&vika)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let server = vika_app(&vika, create_test_config(dir.path())).await;

    let form = axum_test::multipart::MultipartForm::new().add_part(
        "file",
        axum_test::multipart::Part::bytes(png_bytes(3, 3))
            .file_name("slide.png")
            .mime_type("image/png"),
    );
    let response = server.post("/api/upload").multipart(form).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["storage"], "vendor");
    assert_eq!(body["data"]["token"], "space/2024/slide.png");
}

#[test_log::test(tokio::test)]
async fn test_cors_allows_configured_origin() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(dir.path());
    config.cors.allowed_origins = vec![CorsOrigin::Url("https://minutes.example.com".parse().unwrap())];
    let server = Application::with_datasheet(config, Arc::new(FakeDatasheet::default()))
        .await
        .unwrap()
        .into_test_server();

    let response = server
        .get("/api/meetings")
        .add_header("origin", "https://minutes.example.com")
        .await;
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .map(|v| v.to_str().unwrap()),
        Some("https://minutes.example.com")
    );

    let response = server
        .get("/api/meetings")
        .add_header("origin", "https://elsewhere.example.com")
        .await;
    assert!(response.headers().get("access-control-allow-origin").is_none());
}

#[test_log::test(tokio::test)]
async fn test_cors_wildcard_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let server = create_test_app(Arc::new(FakeDatasheet::default()), dir.path()).await;

    let response = server
        .get("/api/meetings")
        .add_header("origin", "https://anywhere.example.com")
        .await;

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .map(|v| v.to_str().unwrap()),
        Some("*")
    );
}

/// Log output captured by a thread-scoped subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

async fn startup_logs(config: Config) -> String {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    Application::with_datasheet(config, Arc::new(FakeDatasheet::default()))
        .await
        .expect("Failed to create application");

    let bytes = logs.0.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}

#[tokio::test]
async fn test_startup_warns_about_worst_case_create_latency() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(dir.path());
    config.vendor.request_timeout = Duration::from_secs(60);
    config.vendor.request_retries = 5;
    config.vendor.retry_delay = Duration::from_secs(3);
    config.records.create_retry.delay = Duration::from_secs(2);

    let logs = startup_logs(config).await;

    // (60s * 6 tries + 3s * 5 delays) * 3 attempts + 2s * 2 delays
    assert!(logs.contains("WARN"), "{logs}");
    assert!(logs.contains("may take up to 1129s before failing"), "{logs}");
}

#[tokio::test]
async fn test_no_latency_warning_for_single_unretried_call() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(dir.path());
    config.vendor.request_retries = 0;
    config.records.create_retry.max_attempts = 1;

    let logs = startup_logs(config).await;

    assert!(!logs.contains("may take up to"), "{logs}");
}

//! Remote compositor tests against an in-process fake of the PDF service.

#![allow(clippy::unwrap_used)]

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use pdf_watermark_core::{
    Appearance, Compositor, CompositorConfig, Error, OverlayDocument, RemoteCompositor,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const CLIENT_ID: &str = "test-client";
const TOKEN: &str = "test-token";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scenario {
    Success,
    Unauthorized,
    QuotaExceeded,
    JobFailed,
    /// The first job submission is refused as if the token had been revoked
    TokenRevoked,
}

#[derive(Clone)]
struct FakeService {
    base: String,
    scenario: Scenario,
    token_requests: Arc<AtomicUsize>,
    polls: Arc<AtomicUsize>,
    submissions: Arc<AtomicUsize>,
    uploads: Arc<Mutex<Vec<Vec<u8>>>>,
    job: Arc<Mutex<Option<Value>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {TOKEN}");
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(expected.as_str());
    let api_key = headers.get("x-api-key").and_then(|v| v.to_str().ok()) == Some(CLIENT_ID);
    bearer && api_key
}

async fn token(State(service): State<FakeService>) -> Response {
    service.token_requests.fetch_add(1, Ordering::SeqCst);
    if service.scenario == Scenario::Unauthorized {
        return (StatusCode::UNAUTHORIZED, "invalid_client").into_response();
    }
    Json(json!({ "access_token": TOKEN, "token_type": "bearer", "expires_in": 86399 }))
        .into_response()
}

async fn create_asset(
    State(service): State<FakeService>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if service.scenario == Scenario::QuotaExceeded {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "30")],
            "quota exhausted",
        )
            .into_response();
    }
    assert_eq!(body["mediaType"], "application/pdf");

    let n = service.uploads.lock().unwrap().len();
    Json(json!({
        "uploadUri": format!("{}/upload/{n}", service.base),
        "assetID": format!("asset-{n}"),
    }))
    .into_response()
}

async fn upload(State(service): State<FakeService>, Path(_id): Path<String>, body: Bytes) -> StatusCode {
    service.uploads.lock().unwrap().push(body.to_vec());
    StatusCode::OK
}

async fn add_watermark(
    State(service): State<FakeService>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let submission = service.submissions.fetch_add(1, Ordering::SeqCst);
    if service.scenario == Scenario::TokenRevoked && submission == 0 {
        return (StatusCode::UNAUTHORIZED, "token revoked").into_response();
    }
    *service.job.lock().unwrap() = Some(body);
    (
        StatusCode::CREATED,
        [(header::LOCATION, format!("{}/jobs/1", service.base))],
    )
        .into_response()
}

async fn job_status(State(service): State<FakeService>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let polls = service.polls.fetch_add(1, Ordering::SeqCst) + 1;
    if polls < 2 {
        return Json(json!({ "status": "in progress" })).into_response();
    }
    if service.scenario == Scenario::JobFailed {
        return Json(json!({
            "status": "failed",
            "error": { "code": "INTERNAL_ERROR", "message": "renderer crashed", "status": 500 }
        }))
        .into_response();
    }
    Json(json!({
        "status": "done",
        "asset": { "downloadUri": format!("{}/download/1", service.base) }
    }))
    .into_response()
}

async fn download() -> &'static [u8] {
    b"%PDF-1.7 stamped"
}

async fn spawn_service(scenario: Scenario) -> (FakeService, RemoteCompositor) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let service = FakeService {
        base: base.clone(),
        scenario,
        token_requests: Arc::new(AtomicUsize::new(0)),
        polls: Arc::new(AtomicUsize::new(0)),
        submissions: Arc::new(AtomicUsize::new(0)),
        uploads: Arc::new(Mutex::new(Vec::new())),
        job: Arc::new(Mutex::new(None)),
    };

    let app = Router::new()
        .route("/token", post(token))
        .route("/assets", post(create_asset))
        .route("/upload/{id}", put(upload))
        .route("/operation/addwatermark", post(add_watermark))
        .route("/jobs/{id}", get(job_status))
        .route("/download/{id}", get(download))
        .with_state(service.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = CompositorConfig::remote(base, CLIENT_ID, "test-secret");
    config.poll_interval_ms = 10;
    let compositor = RemoteCompositor::new(&config).unwrap();

    (service, compositor)
}

fn overlay() -> OverlayDocument {
    OverlayDocument {
        phrase: "For Alice".to_string(),
        width: 612.0,
        height: 792.0,
        bytes: b"%PDF-1.5 overlay".to_vec(),
    }
}

#[tokio::test]
async fn test_successful_job() {
    let (service, compositor) = spawn_service(Scenario::Success).await;

    let appearance = Appearance {
        opacity: 0.3,
        ..Appearance::default()
    };
    let output = compositor
        .composite(b"%PDF-1.4 source", &overlay(), &appearance)
        .await
        .unwrap();

    assert_eq!(output, b"%PDF-1.7 stamped");

    let uploads = service.uploads.lock().unwrap().clone();
    assert_eq!(uploads, vec![b"%PDF-1.4 source".to_vec(), b"%PDF-1.5 overlay".to_vec()]);

    let job = service.job.lock().unwrap().clone().unwrap();
    assert_eq!(job["inputDocumentAssetID"], "asset-0");
    assert_eq!(job["watermarkDocumentAssetID"], "asset-1");
    assert_eq!(job["appearance"]["opacity"], 30);
    assert_eq!(job["appearance"]["appearOnForeground"], false);

    // Polled until done
    assert_eq!(service.polls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_token_is_reused() {
    let (service, compositor) = spawn_service(Scenario::Success).await;

    for _ in 0..2 {
        service.polls.store(0, Ordering::SeqCst);
        compositor
            .composite(b"%PDF-1.4 source", &overlay(), &Appearance::default())
            .await
            .unwrap();
    }

    assert_eq!(service.token_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rejected_credentials() {
    let (_service, compositor) = spawn_service(Scenario::Unauthorized).await;

    let result = compositor
        .composite(b"%PDF-1.4 source", &overlay(), &Appearance::default())
        .await;
    assert!(matches!(result, Err(Error::CompositorAuth(_))));
}

#[tokio::test]
async fn test_quota_exceeded() {
    let (_service, compositor) = spawn_service(Scenario::QuotaExceeded).await;

    let result = compositor
        .composite(b"%PDF-1.4 source", &overlay(), &Appearance::default())
        .await;
    assert!(matches!(
        result,
        Err(Error::CompositorQuota { retry_after: Some(30) })
    ));
}

#[tokio::test]
async fn test_failed_job() {
    let (_service, compositor) = spawn_service(Scenario::JobFailed).await;

    let result = compositor
        .composite(b"%PDF-1.4 source", &overlay(), &Appearance::default())
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, Error::CompositorJobFailed(_)));
    assert!(err.is_compositor());
    assert!(err.to_string().contains("renderer crashed"));
}

#[tokio::test]
async fn test_auth_error_discards_cached_token() {
    let (service, compositor) = spawn_service(Scenario::TokenRevoked).await;

    let first = compositor
        .composite(b"%PDF-1.4 source", &overlay(), &Appearance::default())
        .await;
    assert!(matches!(first, Err(Error::CompositorAuth(_))));
    assert_eq!(service.token_requests.load(Ordering::SeqCst), 1);

    let output = compositor
        .composite(b"%PDF-1.4 source", &overlay(), &Appearance::default())
        .await
        .unwrap();
    assert_eq!(output, b"%PDF-1.7 stamped");

    // The second call fetched a new token instead of reusing the old one
    assert_eq!(service.token_requests.load(Ordering::SeqCst), 2);
    assert_eq!(service.submissions.load(Ordering::SeqCst), 2);
}

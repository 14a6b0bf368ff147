//! End-to-end exercises of the Storage Element HTTP surface.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use artstore_auth::{AuthState, KeySetValidator, NoOverrides, RoleResolver};
use artstore_config::{AuthKeysConfig, ServerTimeouts};
use artstore_model::{FileStatus, InstanceRole, ReplicaMode};
use artstore_se::{ApiServer, SeState};
use artstore_store::{AttrStore, BlobStore, FileIndex, GarbageCollector, Reconciler};
use artstore_telemetry::Metrics;
use artstore_test_support::{jwks_document, mint_token};
use axum::{
    Json, Router,
    body::Body,
    http::{Request, StatusCode, header},
    routing::get,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
const BOUNDARY: &str = "artstore-test-boundary";

struct TestApp {
    router: Router,
    state: Arc<SeState>,
    gc: GarbageCollector,
    _dir: TempDir,
}

async fn jwks_url() -> Result<String, Box<dyn Error>> {
    let app = Router::new().route("/certs", get(|| async { Json(jwks_document()) }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}/certs"))
}

async fn test_app() -> Result<TestApp, Box<dyn Error>> {
    let dir = tempfile::Builder::new().prefix("artstore-se-api-").tempdir()?;
    let metrics = Metrics::new()?;
    let blobs = BlobStore::new(dir.path());
    let attrs = AttrStore::new(dir.path());
    let index = Arc::new(FileIndex::new());
    index.build_from_dir(&attrs).await?;

    let mode = Arc::new(artstore_store::ModeMachine::new(
        artstore_model::OperatingMode::Rw,
        None,
    ));
    let reconciler = Arc::new(Reconciler::new(
        blobs.clone(),
        attrs.clone(),
        Arc::clone(&index),
        metrics.clone(),
    ));
    let gc = GarbageCollector::new(
        blobs.clone(),
        attrs.clone(),
        Arc::clone(&index),
        metrics.clone(),
    );

    let validator = KeySetValidator::start(
        reqwest::Client::new(),
        AuthKeysConfig {
            jwks_url: jwks_url().await?,
            refresh_interval: Duration::from_secs(300),
            leeway: Duration::from_secs(30),
            issuer: None,
        },
    )
    .await;
    let auth = Arc::new(AuthState {
        validator,
        resolver: RoleResolver::new(Vec::new(), Vec::new()),
        overrides: Arc::new(NoOverrides),
    });

    let state = Arc::new(SeState {
        storage_id: "se-test".to_string(),
        capacity_bytes: 1_000_000,
        replica_mode: ReplicaMode::Standalone,
        instance_role: InstanceRole::Standalone,
        leader_url: None,
        blobs,
        attrs,
        index,
        mode,
        reconciler,
        metrics,
    });

    let router = ApiServer::new(Arc::clone(&state), auth, &ServerTimeouts::default()).router();
    Ok(TestApp {
        router,
        state,
        gc,
        _dir: dir,
    })
}

fn admin_token() -> String {
    mint_token(&json!({
        "sub": "admin-1",
        "preferred_username": "root",
        "realm_access": {"roles": ["admin"]},
        "exp": chrono::Utc::now().timestamp() + 600,
    }))
}

fn readonly_token() -> String {
    mint_token(&json!({
        "sub": "viewer-1",
        "preferred_username": "viewer",
        "realm_access": {"roles": ["readonly"]},
        "exp": chrono::Utc::now().timestamp() + 600,
    }))
}

fn sa_token(scopes: &str) -> String {
    mint_token(&json!({
        "sub": "service-account-backup",
        "client_id": "sa_backup_0a1b2c3d",
        "scope": scopes,
        "exp": chrono::Utc::now().timestamp() + 600,
    }))
}

fn multipart_body(filename: &str, payload: &[u8], extra_fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(payload);
    body.extend_from_slice(b"\r\n");
    for (name, value) in extra_fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn upload(
    app: &TestApp,
    token: &str,
    filename: &str,
    payload: &[u8],
    extra_fields: &[(&str, &str)],
) -> Result<(StatusCode, Value), Box<dyn Error>> {
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/files/upload")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(multipart_body(filename, payload, extra_fields)))?,
        )
        .await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let value: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

#[tokio::test]
async fn upload_download_round_trip() -> Result<(), Box<dyn Error>> {
    let app = test_app().await?;
    let token = sa_token("files:read files:write");

    let (status, created) = upload(&app, &token, "greeting.txt", b"hello world", &[]).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["size"], 11);
    assert_eq!(created["checksum"], HELLO_SHA256);
    assert_eq!(created["status"], "active");
    let file_id = created["file_id"].as_str().expect("file_id").to_string();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/files/{file_id}/download"))
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_LENGTH].to_str()?, "11");
    assert_eq!(
        response.headers()[header::ETAG].to_str()?,
        format!("\"{HELLO_SHA256}\"")
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION].to_str()?,
        "attachment; filename=\"greeting.txt\""
    );
    assert_eq!(response.headers()[header::ACCEPT_RANGES].to_str()?, "bytes");
    let body = response.into_body().collect().await?.to_bytes();
    assert_eq!(&body[..], b"hello world");
    Ok(())
}

#[tokio::test]
async fn range_and_if_none_match_behaviors() -> Result<(), Box<dyn Error>> {
    let app = test_app().await?;
    let token = sa_token("files:read files:write");
    let (_, created) = upload(&app, &token, "greeting.txt", b"hello world", &[]).await?;
    let file_id = created["file_id"].as_str().expect("file_id").to_string();

    // Full-extent range is served as a plain 200.
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/files/{file_id}/download"))
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::RANGE, "bytes=0-10")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Sub-range returns partial content with a Content-Range.
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/files/{file_id}/download"))
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::RANGE, "bytes=6-10")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()[header::CONTENT_RANGE].to_str()?,
        "bytes 6-10/11"
    );
    let body = response.into_body().collect().await?.to_bytes();
    assert_eq!(&body[..], b"world");

    // Matching If-None-Match short-circuits with 304.
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/files/{file_id}/download"))
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::IF_NONE_MATCH, format!("\"{HELLO_SHA256}\""))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    Ok(())
}

#[tokio::test]
async fn soft_delete_then_gc_purges() -> Result<(), Box<dyn Error>> {
    let app = test_app().await?;
    let token = sa_token("files:read files:write");
    let (_, created) = upload(&app, &token, "doomed.txt", b"short-lived", &[]).await?;
    let file_id: uuid::Uuid = created["file_id"].as_str().expect("file_id").parse()?;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/files/{file_id}"))
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let softened = app.state.index.get(file_id).expect("still indexed");
    assert_eq!(softened.status, FileStatus::Deleted);
    assert!(app.state.blobs.exists(&file_id.to_string()).await);

    let report = app.gc.run_once().await;
    assert_eq!(report.purged, 1);
    assert!(!app.state.blobs.exists(&file_id.to_string()).await);
    assert!(app.state.index.get(file_id).is_none());
    Ok(())
}

#[tokio::test]
async fn mode_downgrade_blocks_writes_until_confirmed_upgrade() -> Result<(), Box<dyn Error>> {
    let app = test_app().await?;
    let admin = admin_token();
    let sa = sa_token("files:read files:write");

    let (status, _) = upload(&app, &sa, "one.txt", b"first", &[]).await?;
    assert_eq!(status, StatusCode::CREATED);

    let transition = |body: Value, token: String| {
        let router = app.router.clone();
        async move {
            let response = router
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/api/v1/mode/transition")
                        .header(header::AUTHORIZATION, format!("Bearer {token}"))
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(body.to_string()))
                        .expect("request builds"),
                )
                .await
                .expect("request executes");
            let status = response.status();
            let bytes = response
                .into_body()
                .collect()
                .await
                .expect("body readable")
                .to_bytes();
            let value: Value = serde_json::from_slice(&bytes).expect("json body");
            (status, value)
        }
    };

    let (status, body) =
        transition(json!({"target_mode": "ro"}), admin.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["previous_mode"], "rw");
    assert_eq!(body["current_mode"], "ro");

    let (status, body) = upload(&app, &sa, "blocked.txt", b"blocked", &[]).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "MODE_NOT_ALLOWED");

    let (status, body) =
        transition(json!({"target_mode": "rw", "confirm": false}), admin.clone()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFIRMATION_REQUIRED");

    let (status, _) = transition(json!({"target_mode": "rw", "confirm": true}), admin).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = upload(&app, &sa, "resumed.txt", b"resumed", &[]).await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn auth_gates_enforce_roles_and_scopes() -> Result<(), Box<dyn Error>> {
    let app = test_app().await?;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/api/v1/files").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, body) = upload(
        &app,
        &readonly_token(),
        "denied.txt",
        b"denied",
        &[],
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/files")
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", sa_token("files:read")),
                )
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn temporary_upload_without_ttl_is_rejected() -> Result<(), Box<dyn Error>> {
    let app = test_app().await?;
    let token = sa_token("files:write");

    let (status, body) = upload(
        &app,
        &token,
        "temp.txt",
        b"temp",
        &[("retention_policy", "temporary")],
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, created) = upload(
        &app,
        &token,
        "temp.txt",
        b"temp",
        &[("retention_policy", "temporary"), ("ttl_days", "3")],
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["ttl_days"], 3);
    assert!(created["expires_at"].is_string());
    Ok(())
}

#[tokio::test]
async fn info_reports_capacity_from_the_index() -> Result<(), Box<dyn Error>> {
    let app = test_app().await?;
    let token = sa_token("files:write");
    upload(&app, &token, "a.txt", b"hello world", &[]).await?;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/api/v1/info").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await?.to_bytes();
    let info: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(info["storage_id"], "se-test");
    assert_eq!(info["mode"], "rw");
    assert_eq!(info["capacity"]["used_bytes"], 11);
    assert_eq!(info["capacity"]["available_bytes"], 1_000_000 - 11);
    assert!(
        info["allowed_operations"]
            .as_array()
            .expect("operations array")
            .iter()
            .any(|op| op == "upload")
    );
    Ok(())
}

#[tokio::test]
async fn reconcile_endpoint_reports_clean_store() -> Result<(), Box<dyn Error>> {
    let app = test_app().await?;
    let admin = admin_token();
    let token = sa_token("files:write");
    upload(&app, &token, "a.txt", b"content", &[]).await?;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/maintenance/reconcile")
                .header(header::AUTHORIZATION, format!("Bearer {admin}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await?.to_bytes();
    let report: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(report["skipped"], false);
    assert_eq!(report["files_checked"], 1);
    assert_eq!(report["summary"]["ok"], 1);
    Ok(())
}

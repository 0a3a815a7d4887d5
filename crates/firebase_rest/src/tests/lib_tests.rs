use super::*;
use std::{collections::VecDeque, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    Json, Router,
};
use serde_json::{json, Value};
use shared::domain::ImageBlob;
use tokio::{net::TcpListener, sync::Mutex};
use upload_store::{AuthService, Datastore, ObjectStorage, StoredObject};

#[derive(Debug, Clone)]
struct RecordedRequest {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
}

impl RecordedRequest {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("json body")
    }
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    responses: Arc<Mutex<VecDeque<(StatusCode, Value)>>>,
}

async fn handle_any(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    state.requests.lock().await.push(RecordedRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    });
    let (status, value) = state
        .responses
        .lock()
        .await
        .pop_front()
        .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "no canned response" })));
    (status, Json(value))
}

async fn spawn_mock_server(responses: Vec<(StatusCode, Value)>) -> Result<(String, MockState)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = MockState {
        requests: Arc::new(Mutex::new(Vec::new())),
        responses: Arc::new(Mutex::new(responses.into_iter().collect())),
    };
    let app = Router::new().fallback(handle_any).with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

fn backend_for(base_url: &str) -> FirebaseRestBackend {
    let config = FirebaseConfig {
        api_key: "test-key".to_string(),
        database_url: format!("{base_url}/db"),
        storage_bucket: "demo.appspot.com".to_string(),
        storage_url: base_url.to_string(),
        auth_url: base_url.to_string(),
    };
    let http = Client::builder().no_proxy().build().expect("client");
    FirebaseRestBackend::with_client(config, http)
}

#[test]
fn endpoint_encodes_slashes_inside_segments() {
    let url = endpoint("https://host/base/", &["o", "fileUploads/k1.png"]).expect("url");
    assert_eq!(url.as_str(), "https://host/base/o/fileUploads%2Fk1.png");
}

#[test]
fn endpoint_rejects_unparseable_base() {
    assert!(endpoint("not a url", &["x"]).is_err());
}

#[tokio::test]
async fn push_posts_record_and_returns_generated_name() {
    let (base, mock) = spawn_mock_server(vec![(StatusCode::OK, json!({ "name": "-Nk1" }))])
        .await
        .expect("spawn server");
    let backend = backend_for(&base);

    let key = backend
        .push("fileUploads", json!({ "type": "photo" }))
        .await
        .expect("push");

    assert_eq!(key, "-Nk1");
    let requests = mock.requests.lock().await;
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].path, "/db/fileUploads.json");
    assert_eq!(requests[0].query, None);
    assert_eq!(requests[0].json(), json!({ "type": "photo" }));
}

#[tokio::test]
async fn update_patches_child_record() {
    let (base, mock) = spawn_mock_server(vec![(
        StatusCode::OK,
        json!({ "imageUrl": "https://host/a.png" }),
    )])
    .await
    .expect("spawn server");
    let backend = backend_for(&base);

    backend
        .update("fileUploads", "-Nk1", json!({ "imageUrl": "https://host/a.png" }))
        .await
        .expect("update");

    let requests = mock.requests.lock().await;
    assert_eq!(requests[0].method, Method::PATCH);
    assert_eq!(requests[0].path, "/db/fileUploads/-Nk1.json");
}

#[tokio::test]
async fn read_once_returns_null_for_empty_collection() {
    let (base, _mock) = spawn_mock_server(vec![(StatusCode::OK, Value::Null)])
        .await
        .expect("spawn server");
    let backend = backend_for(&base);

    assert_eq!(backend.read_once("fileUploads").await.expect("read"), Value::Null);
}

#[tokio::test]
async fn database_errors_carry_status_and_message() {
    let (base, _mock) = spawn_mock_server(vec![(
        StatusCode::UNAUTHORIZED,
        json!({ "error": "Permission denied" }),
    )])
    .await
    .expect("spawn server");
    let backend = backend_for(&base);

    let err = backend.read_once("fileUploads").await.expect_err("must fail");
    let text = err.to_string();
    assert!(text.contains("401"), "unexpected error: {text}");
    assert!(text.contains("Permission denied"), "unexpected error: {text}");
}

#[tokio::test]
async fn sign_up_stores_token_for_later_requests() {
    let (base, mock) = spawn_mock_server(vec![
        (
            StatusCode::OK,
            json!({ "localId": "u1", "idToken": "tok-1", "refreshToken": "r" }),
        ),
        (StatusCode::OK, json!({ "name": "-Nk1" })),
        (
            StatusCode::OK,
            json!({ "name": "a.png", "bucket": "demo.appspot.com", "downloadTokens": "dl-1" }),
        ),
    ])
    .await
    .expect("spawn server");
    let backend = backend_for(&base);

    let user = backend
        .create_user_with_email_and_password("a@b.com", "pw")
        .await
        .expect("sign up");
    assert_eq!(user.uid, "u1");
    assert_eq!(backend.signed_in_uid().await.as_deref(), Some("u1"));

    backend
        .push("fileUploads", json!({}))
        .await
        .expect("push");
    backend
        .put("a.png", &ImageBlob::new("a.png", b"bytes".to_vec()))
        .await
        .expect("put");

    let requests = mock.requests.lock().await;
    assert_eq!(requests[0].path, "/v1/accounts:signUp");
    assert_eq!(requests[0].query.as_deref(), Some("key=test-key"));
    assert_eq!(
        requests[0].json(),
        json!({ "email": "a@b.com", "password": "pw", "returnSecureToken": true })
    );
    assert_eq!(requests[1].query.as_deref(), Some("auth=tok-1"));
    assert_eq!(
        requests[2]
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok()),
        Some("Firebase tok-1")
    );
}

#[tokio::test]
async fn sign_out_drops_token() {
    let (base, mock) = spawn_mock_server(vec![
        (StatusCode::OK, json!({ "localId": "u1", "idToken": "tok-1" })),
        (StatusCode::OK, Value::Null),
    ])
    .await
    .expect("spawn server");
    let backend = backend_for(&base);

    backend
        .sign_in_with_email_and_password("a@b.com", "pw")
        .await
        .expect("sign in");
    backend.sign_out().await.expect("sign out");
    backend.read_once("fileUploads").await.expect("read");

    assert_eq!(backend.signed_in_uid().await, None);
    let requests = mock.requests.lock().await;
    assert_eq!(requests[0].path, "/v1/accounts:signInWithPassword");
    assert_eq!(requests[1].query, None);
}

#[tokio::test]
async fn auth_failure_surfaces_identity_error_code() {
    let (base, _mock) = spawn_mock_server(vec![(
        StatusCode::BAD_REQUEST,
        json!({ "error": { "code": 400, "message": "EMAIL_EXISTS", "errors": [] } }),
    )])
    .await
    .expect("spawn server");
    let backend = backend_for(&base);

    let err = backend
        .create_user_with_email_and_password("a@b.com", "pw")
        .await
        .expect_err("must fail");

    assert!(err.to_string().contains("EMAIL_EXISTS"), "unexpected error: {err}");
    assert_eq!(backend.signed_in_uid().await, None);
}

#[tokio::test]
async fn put_uploads_blob_with_content_type_and_object_name() {
    let (base, mock) = spawn_mock_server(vec![(
        StatusCode::OK,
        json!({ "name": "fileUploads/k1.png", "downloadTokens": "dl-1,dl-2" }),
    )])
    .await
    .expect("spawn server");
    let backend = backend_for(&base);

    let stored = backend
        .put(
            "fileUploads/k1.png",
            &ImageBlob::new("a.png", b"png-bytes".to_vec()).with_content_type("image/png"),
        )
        .await
        .expect("put");

    assert_eq!(
        stored,
        StoredObject {
            path: "fileUploads/k1.png".to_string(),
            download_token: Some("dl-1".to_string()),
        }
    );
    let requests = mock.requests.lock().await;
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].path, "/v0/b/demo.appspot.com/o");
    assert_eq!(
        requests[0].query.as_deref(),
        Some("name=fileUploads%2Fk1.png")
    );
    assert_eq!(
        requests[0]
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("image/png")
    );
    assert_eq!(requests[0].body.as_ref(), b"png-bytes");
}

#[tokio::test]
async fn download_url_is_built_from_object_metadata() {
    let (base, mock) = spawn_mock_server(vec![(
        StatusCode::OK,
        json!({ "name": "a b.png", "downloadTokens": "fresh-token" }),
    )])
    .await
    .expect("spawn server");
    let backend = backend_for(&base);

    let url = backend
        .download_url(&StoredObject {
            path: "a b.png".to_string(),
            download_token: Some("stale".to_string()),
        })
        .await
        .expect("download url");

    assert_eq!(
        url,
        format!("{base}/v0/b/demo.appspot.com/o/a%20b.png?alt=media&token=fresh-token")
    );
    let requests = mock.requests.lock().await;
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(requests[0].path, "/v0/b/demo.appspot.com/o/a%20b.png");
}

#[tokio::test]
async fn download_url_falls_back_to_upload_token() {
    let (base, _mock) = spawn_mock_server(vec![(StatusCode::OK, json!({ "name": "a.png" }))])
        .await
        .expect("spawn server");
    let backend = backend_for(&base);

    let url = backend
        .download_url(&StoredObject {
            path: "a.png".to_string(),
            download_token: Some("from-upload".to_string()),
        })
        .await
        .expect("download url");
    assert!(url.ends_with("?alt=media&token=from-upload"), "unexpected url: {url}");

    let (base, _mock) = spawn_mock_server(vec![(StatusCode::OK, json!({ "name": "a.png" }))])
        .await
        .expect("spawn server");
    let err = backend_for(&base)
        .download_url(&StoredObject {
            path: "a.png".to_string(),
            download_token: None,
        })
        .await
        .expect_err("no token");
    assert!(err.to_string().contains("no download token"));
}

#[tokio::test]
async fn storage_failure_reports_status() {
    let (base, _mock) = spawn_mock_server(vec![(
        StatusCode::FORBIDDEN,
        json!({ "error": { "code": 403, "message": "Permission denied." } }),
    )])
    .await
    .expect("spawn server");
    let backend = backend_for(&base);

    let err = backend
        .put("a.png", &ImageBlob::new("a.png", Vec::new()))
        .await
        .expect_err("must fail");
    let text = err.to_string();
    assert!(text.contains("storage upload failed (403"), "unexpected error: {text}");
    assert!(text.contains("Permission denied."), "unexpected error: {text}");
}

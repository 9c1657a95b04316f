//! Blob storage manager against an in-process fake of the Blob service

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use futures::StreamExt;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use docchat::core::storage::{canonicalized_resource, string_to_sign};
use docchat::{BlobStorageManager, DocChatError, StorageConfig, UploadFile};

const ACCOUNT: &str = "devstoreaccount1";
const KEY_BASE64: &str = "c2VjcmV0LWtleQ==";
const PAGE_SIZE: usize = 2;

/// Blobs of every container, keyed by (container, name)
#[derive(Clone, Default)]
struct FakeAccount {
    blobs: Arc<Mutex<BTreeMap<(String, String), Bytes>>>,
}

/// Recompute the Shared Key signature the way the service does
fn signature_valid(method: &Method, uri: &Uri, headers: &HeaderMap) -> bool {
    let Some(authorization) = headers.get("authorization").and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Some(signature) = authorization.strip_prefix(&format!("SharedKey {}:", ACCOUNT)) else {
        return false;
    };

    let mut signed_headers = reqwest::header::HeaderMap::new();
    for (name, value) in headers {
        signed_headers.append(
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()).unwrap(),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()).unwrap(),
        );
    }

    let url = url::Url::parse(&format!("http://fake{}", uri)).unwrap();
    let method = reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap();
    let to_sign = string_to_sign(&method, &signed_headers, &canonicalized_resource(ACCOUNT, &url));

    let mut mac = Hmac::<Sha256>::new_from_slice(b"secret-key").unwrap();
    mac.update(to_sign.as_bytes());
    BASE64_STANDARD.encode(mac.finalize().into_bytes()) == signature
}

fn service_error(status: StatusCode, code: &str) -> Response {
    (status, [("x-ms-error-code", code.to_string())], code.to_string()).into_response()
}

async fn list_blobs(
    State(account): State<FakeAccount>,
    Path(container): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if !signature_valid(&method, &uri, &headers) {
        return service_error(StatusCode::FORBIDDEN, "AuthenticationFailed");
    }
    if container == "locked" {
        return service_error(StatusCode::FORBIDDEN, "AuthorizationFailure");
    }
    if query.get("restype").map(String::as_str) != Some("container")
        || query.get("comp").map(String::as_str) != Some("list")
    {
        return service_error(StatusCode::BAD_REQUEST, "InvalidQueryParameterValue");
    }

    let blobs = account.blobs.lock().unwrap();
    let names: Vec<&String> = blobs
        .keys()
        .filter(|(c, _)| *c == container)
        .map(|(_, name)| name)
        .collect();

    let start = query.get("marker").and_then(|m| m.parse::<usize>().ok()).unwrap_or(0);
    let page: String = names
        .iter()
        .skip(start)
        .take(PAGE_SIZE)
        .map(|name| format!("<Blob><Name>{}</Name><Properties /></Blob>", name))
        .collect();
    let next_marker = if start + PAGE_SIZE < names.len() {
        (start + PAGE_SIZE).to_string()
    } else {
        String::new()
    };

    let body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?><EnumerationResults ServiceEndpoint="http://fake/{}/" ContainerName="{}"><Blobs>{}</Blobs><NextMarker>{}</NextMarker></EnumerationResults>"#,
        ACCOUNT, container, page, next_marker
    );
    (StatusCode::OK, [("content-type", "application/xml")], body).into_response()
}

async fn put_blob(
    State(account): State<FakeAccount>,
    Path((container, name)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !signature_valid(&method, &uri, &headers) {
        return service_error(StatusCode::FORBIDDEN, "AuthenticationFailed");
    }
    if headers.get("x-ms-blob-type").and_then(|v| v.to_str().ok()) != Some("BlockBlob") {
        return service_error(StatusCode::BAD_REQUEST, "MissingRequiredHeader");
    }

    account.blobs.lock().unwrap().insert((container, name), body);
    StatusCode::CREATED.into_response()
}

async fn get_blob(
    State(account): State<FakeAccount>,
    Path((container, name)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if !signature_valid(&method, &uri, &headers) {
        return service_error(StatusCode::FORBIDDEN, "AuthenticationFailed");
    }

    match account.blobs.lock().unwrap().get(&(container, name)) {
        Some(content) => (StatusCode::OK, content.clone()).into_response(),
        None => service_error(StatusCode::NOT_FOUND, "BlobNotFound"),
    }
}

/// Start the fake service and return its path-style account URL
async fn spawn_fake() -> String {
    let app = Router::new()
        .route(&format!("/{}/:container", ACCOUNT), get(list_blobs))
        .route(&format!("/{}/:container/*blob", ACCOUNT), get(get_blob).put(put_blob))
        .with_state(FakeAccount::default());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/{}", addr, ACCOUNT)
}

fn manager(account_url: &str, container: &str, credential: &str) -> BlobStorageManager {
    BlobStorageManager::new(StorageConfig {
        account_url: account_url.to_string(),
        credential: credential.to_string(),
        container: container.to_string(),
        account_name: None,
        timeout_ms: 5000,
    })
    .unwrap()
}

#[tokio::test]
async fn test_upload_then_list_contains_name_once() {
    let url = spawn_fake().await;
    let storage = manager(&url, "docs", KEY_BASE64);

    let stored = storage.upload(UploadFile::new("menu.txt", "soup")).await.unwrap();
    assert_eq!(stored, "menu.txt");
    storage.upload(UploadFile::new("menu.txt", "soup")).await.unwrap();

    let names = storage.list().await.unwrap();
    assert_eq!(names.iter().filter(|n| *n == "menu.txt").count(), 1);
}

#[tokio::test]
async fn test_upload_then_read_round_trip() {
    let url = spawn_fake().await;
    let storage = manager(&url, "docs", KEY_BASE64);

    let content = "Opening hours: 9–17\nSpecial: crème brûlée 🍮\n";
    storage
        .upload(UploadFile::new("menu card.txt", content.to_string()))
        .await
        .unwrap();

    assert_eq!(storage.read("menu card.txt").await.unwrap(), content);
}

#[tokio::test]
async fn test_second_upload_overwrites() {
    let url = spawn_fake().await;
    let storage = manager(&url, "docs", KEY_BASE64);

    storage.upload(UploadFile::new("hours.txt", "9-5")).await.unwrap();
    storage.upload(UploadFile::new("hours.txt", "10-6")).await.unwrap();

    assert_eq!(storage.read("hours.txt").await.unwrap(), "10-6");
    assert_eq!(storage.list().await.unwrap(), vec!["hours.txt".to_string()]);
}

#[tokio::test]
async fn test_empty_container_lists_nothing() {
    let url = spawn_fake().await;
    let storage = manager(&url, "docs", KEY_BASE64);

    let names = storage.list().await;
    tokio_test::assert_ok!(&names);
    assert!(names.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_follows_markers() {
    let url = spawn_fake().await;
    let storage = manager(&url, "docs", KEY_BASE64);

    for name in ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"] {
        storage.upload(UploadFile::new(name, name)).await.unwrap();
    }

    let names = storage.list().await.unwrap();
    assert_eq!(names, vec!["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"]);
}

#[tokio::test]
async fn test_list_failure_is_reported() {
    let url = spawn_fake().await;
    let storage = manager(&url, "locked", KEY_BASE64);

    match storage.list().await {
        Err(DocChatError::StorageError { status, code, .. }) => {
            assert_eq!(status, Some(403));
            assert_eq!(code.as_deref(), Some("AuthorizationFailure"));
        }
        other => panic!("expected a storage error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_read_missing_blob() {
    let url = spawn_fake().await;
    let storage = manager(&url, "docs", KEY_BASE64);

    let err = storage.read("nope.txt").await.unwrap_err();
    assert!(matches!(err, DocChatError::NotFound { name } if name == "nope.txt"));
}

#[tokio::test]
async fn test_read_non_utf8_blob() {
    let url = spawn_fake().await;
    let storage = manager(&url, "docs", KEY_BASE64);

    storage
        .upload(UploadFile::new("latin1.txt", vec![0x63u8, 0x61, 0x66, 0xe9]))
        .await
        .unwrap();

    let err = storage.read("latin1.txt").await.unwrap_err();
    assert!(matches!(err, DocChatError::DecodeError { .. }));
}

#[tokio::test]
async fn test_read_stream_yields_whole_blob() {
    let url = spawn_fake().await;
    let storage = manager(&url, "docs", KEY_BASE64);

    let content = "line\n".repeat(10_000);
    storage
        .upload(UploadFile::new("big.txt", content.clone()))
        .await
        .unwrap();

    let mut stream = storage.read_stream("big.txt").await.unwrap();
    let mut collected = Vec::new();
    while let Some(chunk) = stream.next().await {
        collected.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(collected, content.into_bytes());

    assert!(matches!(
        storage.read_stream("absent.txt").await,
        Err(DocChatError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_wrong_key_is_rejected() {
    let url = spawn_fake().await;
    let storage = manager(&url, "docs", "d3Jvbmcta2V5");

    let err = storage
        .upload(UploadFile::new("menu.txt", "soup"))
        .await
        .unwrap_err();
    assert!(matches!(err, DocChatError::StorageError { status: Some(403), .. }));
}

const SAS_TOKEN: &str = "?sv=2021-08-06&ss=b&srt=co&sp=rl&sig=c2lnbmF0dXJl%3D";

fn sas_query(extra: Vec<mockito::Matcher>) -> mockito::Matcher {
    let mut matchers = vec![
        mockito::Matcher::UrlEncoded("sv".into(), "2021-08-06".into()),
        mockito::Matcher::UrlEncoded("sp".into(), "rl".into()),
        mockito::Matcher::UrlEncoded("sig".into(), "c2lnbmF0dXJl=".into()),
    ];
    matchers.extend(extra);
    mockito::Matcher::AllOf(matchers)
}

#[tokio::test]
async fn test_sas_token_rides_on_the_query() {
    let mut server = mockito::Server::new_async().await;
    let list = server
        .mock("GET", "/devstoreaccount1/docs")
        .match_query(sas_query(vec![
            mockito::Matcher::UrlEncoded("restype".into(), "container".into()),
            mockito::Matcher::UrlEncoded("comp".into(), "list".into()),
        ]))
        .match_header("authorization", mockito::Matcher::Missing)
        .match_header("x-ms-version", "2021-08-06")
        .with_status(200)
        .with_body(
            r#"<?xml version="1.0" encoding="utf-8"?><EnumerationResults ContainerName="docs"><Blobs><Blob><Name>menu.txt</Name></Blob></Blobs><NextMarker /></EnumerationResults>"#,
        )
        .create_async()
        .await;
    let read = server
        .mock("GET", "/devstoreaccount1/docs/menu.txt")
        .match_query(sas_query(vec![]))
        .match_header("authorization", mockito::Matcher::Missing)
        .with_status(200)
        .with_body("Soup and bread")
        .create_async()
        .await;

    let storage = manager(&format!("{}/devstoreaccount1", server.url()), "docs", SAS_TOKEN);
    assert_eq!(storage.list().await.unwrap(), vec!["menu.txt".to_string()]);
    assert_eq!(storage.read("menu.txt").await.unwrap(), "Soup and bread");

    list.assert_async().await;
    read.assert_async().await;
}

#[tokio::test]
async fn test_sas_rejection_is_storage_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/devstoreaccount1/docs")
        .match_query(mockito::Matcher::Any)
        .with_status(403)
        .with_header("x-ms-error-code", "AuthenticationFailed")
        .create_async()
        .await;

    let storage = manager(&format!("{}/devstoreaccount1", server.url()), "docs", SAS_TOKEN);
    let err = storage.list().await.unwrap_err();
    assert!(matches!(
        err,
        DocChatError::StorageError { status: Some(403), code: Some(ref code), .. } if code == "AuthenticationFailed"
    ));
}

//! In-process S3 fake for exercising `S3ObjectStore` end to end.
//!
//! Serves the path-style subset of the S3 REST API the store uses:
//! object GET/HEAD/PUT/DELETE, `ListObjectsV2` with continuation tokens and
//! the multipart upload calls. Listing pages are small so pagination is
//! always exercised.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use mapstage_core::config::StorageConfig;
use mapstage_core::S3ObjectStore;

const LAST_MODIFIED_HTTP: &str = "Mon, 01 Jan 2024 00:00:00 GMT";
const LAST_MODIFIED_ISO: &str = "2024-01-01T00:00:00.000Z";

#[derive(Default)]
struct FakeState {
    objects: BTreeMap<String, Vec<u8>>,
    failing: HashSet<String>,
    uploads: HashMap<String, BTreeMap<i32, Vec<u8>>>,
    next_upload: u32,
    completed_parts: Vec<usize>,
    aborted: usize,
    list_pages: usize,
    page_size: usize,
}

/// Handle to the fake's state, shared with the server task.
#[derive(Clone)]
pub struct FakeS3 {
    state: Arc<Mutex<FakeState>>,
}

impl FakeS3 {
    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn insert(&self, key: &str, data: &[u8]) {
        self.lock().objects.insert(key.to_string(), data.to_vec());
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    /// Writes to `key` (whole objects and parts) are refused with 403.
    pub fn fail_key(&self, key: &str) {
        self.lock().failing.insert(key.to_string());
    }

    /// Part counts of every completed multipart upload.
    pub fn completed_parts(&self) -> Vec<usize> {
        self.lock().completed_parts.clone()
    }

    pub fn aborted_uploads(&self) -> usize {
        self.lock().aborted
    }

    pub fn pending_uploads(&self) -> usize {
        self.lock().uploads.len()
    }

    /// Number of `ListObjectsV2` pages served.
    pub fn list_pages(&self) -> usize {
        self.lock().list_pages
    }
}

/// Starts the fake on an ephemeral port. Returns the handle and endpoint URL.
pub async fn spawn_fake_s3() -> (FakeS3, String) {
    let fake = FakeS3 {
        state: Arc::new(Mutex::new(FakeState {
            page_size: 2,
            ..Default::default()
        })),
    };

    let app = Router::new()
        .route("/{bucket}", get(list_objects))
        .route("/{bucket}/", get(list_objects))
        .route(
            "/{bucket}/{*key}",
            get(get_object)
                .head(head_object)
                .put(put_object)
                .delete(delete_object)
                .post(post_object),
        )
        .layer(DefaultBodyLimit::disable())
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (fake, format!("http://{}", addr))
}

/// A store pointed at `endpoint`, bucket `dev`.
pub fn s3_store(endpoint: &str) -> S3ObjectStore {
    s3_store_with(endpoint, |_| {})
}

pub fn s3_store_with(endpoint: &str, configure: impl FnOnce(&mut StorageConfig)) -> S3ObjectStore {
    let mut config = StorageConfig {
        endpoint: Some(endpoint.to_string()),
        access_key: Some("minio".to_string()),
        secret_key: Some("minio123".to_string()),
        ..Default::default()
    };
    configure(&mut config);
    S3ObjectStore::new(&config).unwrap()
}

fn etag(data: &[u8]) -> String {
    format!("\"{:x}\"", md5::compute(data))
}

fn xml(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn error_xml(status: StatusCode, code: &str, key: &str) -> Response {
    xml(
        status,
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Error><Code>{}</Code><Message>{}</Message><Key>{}</Key><RequestId>fake</RequestId></Error>"#,
            code,
            code,
            escape(key)
        ),
    )
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Undoes `aws-chunked` framing (`<hex size>[;ext]\r\n<data>\r\n ... 0\r\n`).
fn decode_body(headers: &HeaderMap, body: &[u8]) -> Vec<u8> {
    let chunked = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("aws-chunked"))
        || headers
            .get("x-amz-content-sha256")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("STREAMING-"));
    if !chunked {
        return body.to_vec();
    }

    let mut out = Vec::new();
    let mut rest = body;
    while let Some(line_end) = rest.windows(2).position(|w| w == b"\r\n") {
        let header = std::str::from_utf8(&rest[..line_end]).unwrap_or("");
        let Ok(size) = usize::from_str_radix(header.split(';').next().unwrap_or("").trim(), 16)
        else {
            break;
        };
        rest = &rest[line_end + 2..];
        if size == 0 || size > rest.len() {
            break;
        }
        out.extend_from_slice(&rest[..size]);
        rest = rest[size..].strip_prefix(b"\r\n").unwrap_or(&rest[size..]);
    }
    out
}

async fn list_objects(
    State(fake): State<FakeS3>,
    Path(bucket): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut state = fake.lock();
    state.list_pages += 1;

    let prefix = params.get("prefix").cloned().unwrap_or_default();
    let start: usize = params
        .get("continuation-token")
        .and_then(|t| t.parse().ok())
        .unwrap_or(0);

    let matching: Vec<(String, usize, String)> = state
        .objects
        .iter()
        .filter(|(key, _)| key.starts_with(&prefix))
        .map(|(key, data)| (key.clone(), data.len(), etag(data)))
        .collect();
    let page = &matching[start.min(matching.len())..(start + state.page_size).min(matching.len())];
    let next = start + page.len();
    let truncated = next < matching.len();

    let mut body = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>{}</Name><Prefix>{}</Prefix><KeyCount>{}</KeyCount><MaxKeys>{}</MaxKeys><IsTruncated>{}</IsTruncated>"#,
        escape(&bucket),
        escape(&prefix),
        page.len(),
        state.page_size,
        truncated
    );
    for (key, size, tag) in page {
        body.push_str(&format!(
            "<Contents><Key>{}</Key><LastModified>{}</LastModified><ETag>{}</ETag><Size>{}</Size><StorageClass>STANDARD</StorageClass></Contents>",
            escape(key),
            LAST_MODIFIED_ISO,
            escape(tag),
            size
        ));
    }
    if truncated {
        body.push_str(&format!(
            "<NextContinuationToken>{}</NextContinuationToken>",
            next
        ));
    }
    body.push_str("</ListBucketResult>");
    xml(StatusCode::OK, body)
}

async fn get_object(
    State(fake): State<FakeS3>,
    Path((_bucket, key)): Path<(String, String)>,
) -> Response {
    let state = fake.lock();
    let Some(data) = state.objects.get(&key) else {
        return error_xml(StatusCode::NOT_FOUND, "NoSuchKey", &key);
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, data.len())
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::ETAG, etag(data))
        .header(header::LAST_MODIFIED, LAST_MODIFIED_HTTP)
        .body(Body::from(data.clone()))
        .unwrap()
}

async fn head_object(
    State(fake): State<FakeS3>,
    Path((_bucket, key)): Path<(String, String)>,
) -> Response {
    let state = fake.lock();
    let Some(data) = state.objects.get(&key) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, data.len())
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::ETAG, etag(data))
        .header(header::LAST_MODIFIED, LAST_MODIFIED_HTTP)
        .body(Body::empty())
        .unwrap()
}

async fn put_object(
    State(fake): State<FakeS3>,
    Path((_bucket, key)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = fake.lock();
    if state.failing.contains(&key) {
        return error_xml(StatusCode::FORBIDDEN, "AccessDenied", &key);
    }
    let data = decode_body(&headers, &body);
    let tag = etag(&data);

    match (params.get("uploadId"), params.get("partNumber")) {
        (Some(upload_id), Some(part_number)) => {
            let Some(parts) = state.uploads.get_mut(upload_id) else {
                return error_xml(StatusCode::NOT_FOUND, "NoSuchUpload", &key);
            };
            parts.insert(part_number.parse().unwrap_or(0), data);
        }
        _ => {
            state.objects.insert(key, data);
        }
    }
    (StatusCode::OK, [(header::ETAG, tag)]).into_response()
}

async fn delete_object(
    State(fake): State<FakeS3>,
    Path((_bucket, key)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut state = fake.lock();
    match params.get("uploadId") {
        Some(upload_id) => {
            if state.uploads.remove(upload_id).is_some() {
                state.aborted += 1;
            }
        }
        None => {
            state.objects.remove(&key);
        }
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn post_object(
    State(fake): State<FakeS3>,
    Path((bucket, key)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut state = fake.lock();

    if params.contains_key("uploads") {
        state.next_upload += 1;
        let upload_id = format!("upload-{}", state.next_upload);
        state.uploads.insert(upload_id.clone(), BTreeMap::new());
        return xml(
            StatusCode::OK,
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><InitiateMultipartUploadResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Bucket>{}</Bucket><Key>{}</Key><UploadId>{}</UploadId></InitiateMultipartUploadResult>"#,
                escape(&bucket),
                escape(&key),
                upload_id
            ),
        );
    }

    let Some(upload_id) = params.get("uploadId") else {
        return error_xml(StatusCode::BAD_REQUEST, "InvalidRequest", &key);
    };
    let Some(parts) = state.uploads.remove(upload_id) else {
        return error_xml(StatusCode::NOT_FOUND, "NoSuchUpload", &key);
    };

    let count = parts.len();
    let data: Vec<u8> = parts.into_values().flatten().collect();
    let tag = format!("\"{:x}-{}\"", md5::compute(&data), count);
    state.objects.insert(key.clone(), data);
    state.completed_parts.push(count);

    xml(
        StatusCode::OK,
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><CompleteMultipartUploadResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Bucket>{}</Bucket><Key>{}</Key><ETag>{}</ETag></CompleteMultipartUploadResult>"#,
            escape(&bucket),
            escape(&key),
            escape(&tag)
        ),
    )
}

//! A tiny in-process Drive v3 stand-in for exercising the real HTTP client.
//!
//! Only the calls DriveConnection makes are served. Pages are capped at two
//! files so continuation tokens get used.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};

pub const TOKEN: &str = "test-token";
const MAX_PAGE: usize = 2;

#[derive(Debug, Clone)]
pub struct FakeFile {
    pub id: String,
    pub name: String,
    pub parent: String,
    pub mime_type: String,
    pub properties: BTreeMap<String, String>,
    pub content: Vec<u8>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakePermission {
    pub file_id: String,
    pub role: String,
    pub email: String,
}

#[derive(Default)]
struct FakeState {
    files: Vec<FakeFile>,
    permissions: Vec<FakePermission>,
    next_id: u64,
}

impl FakeState {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("file-{}", self.next_id)
    }
}

type Shared = Arc<Mutex<FakeState>>;

pub struct FakeDrive {
    addr: SocketAddr,
    state: Shared,
}

impl FakeDrive {
    pub async fn start() -> Self {
        let state = Shared::default();
        let app = Router::new()
            .route("/drive/v3/files", get(list_files).post(create_folder))
            .route("/drive/v3/files/{id}", get(get_file).delete(delete_file))
            .route("/drive/v3/files/{id}/permissions", post(create_permission))
            .route("/upload/drive/v3/files", post(upload_create))
            .route("/upload/drive/v3/files/{id}", patch(upload_update))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn api_base(&self) -> String {
        format!("http://{}/drive/v3", self.addr)
    }

    pub fn upload_base(&self) -> String {
        format!("http://{}/upload/drive/v3", self.addr)
    }

    pub fn file_named(&self, name: &str) -> Option<FakeFile> {
        self.state
            .lock()
            .unwrap()
            .files
            .iter()
            .find(|f| f.name == name)
            .cloned()
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().unwrap().files.len()
    }

    pub fn permissions(&self) -> Vec<FakePermission> {
        self.state.lock().unwrap().permissions.clone()
    }
}

fn drive_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        axum::Json(json!({ "error": { "code": status.as_u16(), "message": message } })),
    )
        .into_response()
}

fn authorized(headers: &HeaderMap) -> Result<(), Response> {
    let expected = format!("Bearer {TOKEN}");
    match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err(drive_error(StatusCode::UNAUTHORIZED, "Invalid Credentials")),
    }
}

fn file_json(file: &FakeFile) -> Value {
    json!({
        "id": file.id,
        "name": file.name,
        "modifiedTime": file.modified.to_rfc3339_opts(SecondsFormat::Millis, true),
        "properties": file.properties,
    })
}

// "<mime clause> and '<parent>' in parents and trashed=false"
fn parse_q(q: &str) -> Option<(bool, String)> {
    let folders = q.starts_with("mimeType='");
    let head = q.split("' in parents").next()?;
    let parent = head.rsplit('\'').next()?.to_string();
    Some((folders, parent))
}

async fn list_files(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }
    let Some((folders, parent)) = params.get("q").and_then(|q| parse_q(q)) else {
        return drive_error(StatusCode::BAD_REQUEST, "Invalid Value");
    };
    let offset: usize = params
        .get("pageToken")
        .and_then(|t| t.parse().ok())
        .unwrap_or(0);

    let state = state.lock().unwrap();
    let matching: Vec<&FakeFile> = state
        .files
        .iter()
        .filter(|f| f.parent == parent)
        .filter(|f| (f.mime_type == "application/vnd.google-apps.folder") == folders)
        .collect();
    let page: Vec<Value> = matching
        .iter()
        .skip(offset)
        .take(MAX_PAGE)
        .map(|f| file_json(f))
        .collect();
    let mut body = json!({ "files": page });
    if offset + MAX_PAGE < matching.len() {
        body["nextPageToken"] = json!((offset + MAX_PAGE).to_string());
    }
    axum::Json(body).into_response()
}

async fn create_folder(
    State(state): State<Shared>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }
    let mut state = state.lock().unwrap();
    let id = state.allocate_id();
    state.files.push(FakeFile {
        id: id.clone(),
        name: body["name"].as_str().unwrap_or_default().to_string(),
        parent: "root".to_string(),
        mime_type: body["mimeType"].as_str().unwrap_or_default().to_string(),
        properties: BTreeMap::new(),
        content: Vec::new(),
        modified: Utc::now(),
    });
    axum::Json(json!({ "id": id })).into_response()
}

async fn get_file(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }
    let state = state.lock().unwrap();
    let Some(file) = state.files.iter().find(|f| f.id == id) else {
        return drive_error(StatusCode::NOT_FOUND, &format!("File not found: {id}."));
    };
    if params.get("alt").map(String::as_str) == Some("media") {
        return file.content.clone().into_response();
    }
    axum::Json(json!({ "properties": file.properties })).into_response()
}

async fn delete_file(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }
    let mut state = state.lock().unwrap();
    let before = state.files.len();
    state.files.retain(|f| f.id != id);
    if state.files.len() == before {
        return drive_error(StatusCode::NOT_FOUND, &format!("File not found: {id}."));
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn create_permission(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }
    let mut state = state.lock().unwrap();
    state.permissions.push(FakePermission {
        file_id: id,
        role: body["role"].as_str().unwrap_or_default().to_string(),
        email: body["emailAddress"].as_str().unwrap_or_default().to_string(),
    });
    axum::Json(json!({ "id": "perm-1" })).into_response()
}

async fn upload_create(State(state): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }
    let Some((metadata, content)) = parse_related(&headers, &body) else {
        return drive_error(StatusCode::BAD_REQUEST, "Malformed multipart body");
    };
    let parent = metadata["parents"][0].as_str().unwrap_or_default().to_string();

    let mut state = state.lock().unwrap();
    if !state.files.iter().any(|f| f.id == parent) {
        return drive_error(StatusCode::NOT_FOUND, &format!("File not found: {parent}."));
    }
    let id = state.allocate_id();
    let properties = metadata["properties"]
        .as_object()
        .map(|props| {
            props
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();
    state.files.push(FakeFile {
        id: id.clone(),
        name: metadata["name"].as_str().unwrap_or_default().to_string(),
        parent,
        mime_type: "application/octet-stream".to_string(),
        properties,
        content,
        modified: Utc::now(),
    });
    axum::Json(json!({ "id": id })).into_response()
}

async fn upload_update(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }
    let Some((metadata, content)) = parse_related(&headers, &body) else {
        return drive_error(StatusCode::BAD_REQUEST, "Malformed multipart body");
    };

    let mut state = state.lock().unwrap();
    let Some(file) = state.files.iter_mut().find(|f| f.id == id) else {
        return drive_error(StatusCode::NOT_FOUND, &format!("File not found: {id}."));
    };
    // Drive merges properties; null removes a key
    if let Some(props) = metadata["properties"].as_object() {
        for (key, value) in props {
            match value.as_str() {
                Some(value) => {
                    file.properties.insert(key.clone(), value.to_string());
                }
                None => {
                    file.properties.remove(key);
                }
            }
        }
    }
    file.content = content;
    file.modified = Utc::now();
    axum::Json(json!({ "id": id })).into_response()
}

fn parse_related(headers: &HeaderMap, body: &[u8]) -> Option<(Value, Vec<u8>)> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let boundary = content_type.split("boundary=").nth(1)?.trim();
    let delimiter = format!("--{boundary}");
    let parts = split(body, delimiter.as_bytes());

    let metadata = part_body(parts.get(1)?)?;
    let media = part_body(parts.get(2)?)?;
    Some((serde_json::from_slice(metadata).ok()?, media.to_vec()))
}

fn split<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if &haystack[i..i + needle.len()] == needle {
            parts.push(&haystack[start..i]);
            i += needle.len();
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(&haystack[start..]);
    parts
}

fn part_body(part: &[u8]) -> Option<&[u8]> {
    let split_at = part.windows(4).position(|w| w == b"\r\n\r\n")?;
    let body = &part[split_at + 4..];
    Some(body.strip_suffix(b"\r\n").unwrap_or(body))
}

//! Drive v3 wire format: query strings, list responses, multipart uploads.
//!
//! Everything here is pure so it can be tested without a server.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use stowage_core::domain::{Metadata, ObjectId, RemoteObject};
use stowage_core::ports::{BackendError, ObjectPage, ObjectQuery};
use ulid::Ulid;

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Partial-response field mask for list calls.
pub const LIST_FIELDS: &str = "nextPageToken,files(id,name,modifiedTime,properties)";

/// Largest page Drive accepts for `files.list`.
pub const PAGE_SIZE: u32 = 1000;

/// Build the `q` parameter for a query.
pub fn query_string(query: &ObjectQuery) -> String {
    match query {
        ObjectQuery::ContainersUnderRoot => {
            format!("mimeType='{FOLDER_MIME_TYPE}' and 'root' in parents and trashed=false")
        }
        ObjectQuery::ObjectsIn(container) => format!(
            "mimeType!='{FOLDER_MIME_TYPE}' and '{}' in parents and trashed=false",
            escape(container.as_str())
        ),
    }
}

// string literals in Drive queries escape ' and \ with a backslash
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: Option<BTreeMap<String, String>>,
}

impl FileList {
    pub fn into_page(self) -> Result<ObjectPage, BackendError> {
        let objects = self
            .files
            .into_iter()
            .map(DriveFile::into_remote)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ObjectPage {
            objects,
            next_page_token: self.next_page_token.filter(|token| !token.is_empty()),
        })
    }
}

impl DriveFile {
    fn into_remote(self) -> Result<RemoteObject, BackendError> {
        let last_modified = self
            .modified_time
            .ok_or_else(|| BackendError::Decode(format!("file {} has no modifiedTime", self.id)))?;
        Ok(RemoteObject {
            id: ObjectId::new(self.id),
            name: self.name,
            last_modified,
            metadata: self.properties.unwrap_or_default(),
        })
    }
}

/// `{"id": ...}` as returned with `fields=id`.
#[derive(Debug, Deserialize)]
pub struct CreatedFile {
    pub id: String,
}

/// `{"properties": ...}` as returned with `fields=properties`.
#[derive(Debug, Default, Deserialize)]
pub struct FileProperties {
    #[serde(default)]
    pub properties: Option<BTreeMap<String, String>>,
}

/// Drive merges `properties` on update, so keys that disappeared must be sent as null.
pub fn properties_patch(previous: &Metadata, next: &Metadata) -> Map<String, Value> {
    let mut patch: Map<String, Value> = previous
        .keys()
        .filter(|key| !next.contains_key(*key))
        .map(|key| (key.clone(), Value::Null))
        .collect();
    for (key, value) in next {
        patch.insert(key.clone(), Value::String(value.clone()));
    }
    patch
}

pub fn new_boundary() -> String {
    format!("stowage-{}", Ulid::new())
}

/// A `multipart/related` body: JSON metadata part followed by the media part.
pub fn multipart_related(boundary: &str, metadata: &Value, content: &[u8]) -> Vec<u8> {
    let metadata = metadata.to_string();
    let mut body = Vec::with_capacity(metadata.len() + content.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

pub fn multipart_content_type(boundary: &str) -> String {
    format!("multipart/related; boundary={boundary}")
}

/// Pull `error.message` out of a Drive error body, falling back to the raw text.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

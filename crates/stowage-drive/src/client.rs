//! DriveConnection - one authenticated handle on the Drive v3 REST API.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use stowage_core::domain::{Metadata, ObjectId};
use stowage_core::ports::{AccessRole, BackendError, ObjectPage, ObjectQuery, ObjectStore};
use tracing::debug;

use crate::query::{
    self, CreatedFile, FOLDER_MIME_TYPE, FileList, FileProperties, LIST_FIELDS, PAGE_SIZE,
};

/// Endpoints and credentials shared by every connection a connector opens.
#[derive(Debug)]
pub(crate) struct Endpoints {
    pub(crate) api_base: String,
    pub(crate) upload_base: String,
    pub(crate) token: String,
}

pub struct DriveConnection {
    http: reqwest::Client,
    endpoints: Arc<Endpoints>,
    closed: AtomicBool,
}

impl DriveConnection {
    pub(crate) fn new(http: reqwest::Client, endpoints: Arc<Endpoints>) -> Self {
        Self {
            http,
            endpoints,
            closed: AtomicBool::new(false),
        }
    }

    fn request(&self, method: Method, url: String) -> Result<RequestBuilder, BackendError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::Closed);
        }
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(&self.endpoints.token))
    }

    fn file_url(&self, id: &ObjectId) -> String {
        format!("{}/files/{}", self.endpoints.api_base, id)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = query::error_message(&body);
        Err(match status {
            StatusCode::UNAUTHORIZED => BackendError::Unauthorized(message),
            _ => BackendError::Status {
                code: status.as_u16(),
                message,
            },
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = self.send(request).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }

    fn multipart(request: RequestBuilder, metadata: &Value, content: &[u8]) -> RequestBuilder {
        let boundary = query::new_boundary();
        request
            .header(
                reqwest::header::CONTENT_TYPE,
                query::multipart_content_type(&boundary),
            )
            .body(query::multipart_related(&boundary, metadata, content))
    }
}

#[async_trait]
impl ObjectStore for DriveConnection {
    async fn query(
        &self,
        query: &ObjectQuery,
        page_token: Option<&str>,
    ) -> Result<ObjectPage, BackendError> {
        let q = query::query_string(query);
        let page_size = PAGE_SIZE.to_string();
        let mut params = vec![
            ("q", q.as_str()),
            ("fields", LIST_FIELDS),
            ("pageSize", page_size.as_str()),
            ("spaces", "drive"),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let url = format!("{}/files", self.endpoints.api_base);
        let request = self.request(Method::GET, url)?.query(&params);
        let list: FileList = self.send_json(request).await?;
        list.into_page()
    }

    async fn create_container(&self, name: &str) -> Result<ObjectId, BackendError> {
        let url = format!("{}/files", self.endpoints.api_base);
        let request = self
            .request(Method::POST, url)?
            .query(&[("fields", "id")])
            .json(&json!({
                "name": name,
                "mimeType": FOLDER_MIME_TYPE,
                "parents": ["root"],
            }));
        let created: CreatedFile = self.send_json(request).await?;
        debug!(name, id = %created.id, "drive folder created");
        Ok(ObjectId::new(created.id))
    }

    async fn create_object(
        &self,
        container: &ObjectId,
        name: &str,
        metadata: &Metadata,
        content: &[u8],
    ) -> Result<ObjectId, BackendError> {
        let url = format!("{}/files", self.endpoints.upload_base);
        let file = json!({
            "name": name,
            "parents": [container.as_str()],
            "properties": metadata,
        });
        let request = self
            .request(Method::POST, url)?
            .query(&[("uploadType", "multipart"), ("fields", "id")]);
        let created: CreatedFile = self
            .send_json(Self::multipart(request, &file, content))
            .await?;
        Ok(ObjectId::new(created.id))
    }

    async fn update_object(
        &self,
        id: &ObjectId,
        metadata: &Metadata,
        content: &[u8],
    ) -> Result<(), BackendError> {
        let current: FileProperties = self
            .send_json(
                self.request(Method::GET, self.file_url(id))?
                    .query(&[("fields", "properties")]),
            )
            .await?;
        let previous = current.properties.unwrap_or_default();
        let file = json!({ "properties": query::properties_patch(&previous, metadata) });

        let url = format!("{}/files/{}", self.endpoints.upload_base, id);
        let request = self
            .request(Method::PATCH, url)?
            .query(&[("uploadType", "multipart"), ("fields", "id")]);
        self.send(Self::multipart(request, &file, content)).await?;
        Ok(())
    }

    async fn download(&self, id: &ObjectId) -> Result<Vec<u8>, BackendError> {
        let request = self
            .request(Method::GET, self.file_url(id))?
            .query(&[("alt", "media")]);
        let response = self.send(request).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, id: &ObjectId) -> Result<(), BackendError> {
        let request = self
            .request(Method::DELETE, self.file_url(id))?
            .query(&[("supportsAllDrives", "true")]);
        self.send(request).await?;
        Ok(())
    }

    async fn grant_access(
        &self,
        container: &ObjectId,
        principal: &str,
        role: AccessRole,
    ) -> Result<(), BackendError> {
        let url = format!("{}/permissions", self.file_url(container));
        let request = self
            .request(Method::POST, url)?
            .query(&[
                ("sendNotificationEmail", "false"),
                ("supportsAllDrives", "true"),
            ])
            .json(&json!({
                "type": "user",
                "role": role.as_str(),
                "emailAddress": principal,
            }));
        self.send(request).await?;
        Ok(())
    }

    fn close(&self) -> Result<(), BackendError> {
        // reqwest pools sockets per client; closing only retires this handle
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("drive connection closed");
        }
        Ok(())
    }
}

//! DriveConnector - mints Drive connections from a [`StorageConfig`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stowage_core::app::StorageConfig;
use stowage_core::ports::{BackendError, Connector, ObjectStore};
use tracing::debug;

use crate::client::{DriveConnection, Endpoints};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const DEFAULT_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Opens authenticated Drive connections.
///
/// The configured credential is used as an OAuth 2.0 bearer access token;
/// minting and refreshing it is the caller's concern. The application name is
/// sent as the User-Agent.
#[derive(Clone)]
pub struct DriveConnector {
    http: reqwest::Client,
    endpoints: Arc<Endpoints>,
}

impl DriveConnector {
    pub fn new(config: &StorageConfig) -> Result<Self, BackendError> {
        Self::with_base_urls(config, DEFAULT_API_BASE, DEFAULT_UPLOAD_BASE)
    }

    /// Point at a different API host (a proxy or a local fake).
    pub fn with_base_urls(
        config: &StorageConfig,
        api_base: &str,
        upload_base: &str,
    ) -> Result<Self, BackendError> {
        let user_agent = if config.application_name.is_empty() {
            concat!("stowage/", env!("CARGO_PKG_VERSION")).to_string()
        } else {
            config.application_name.clone()
        };
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoints: Arc::new(Endpoints {
                api_base: api_base.trim_end_matches('/').to_string(),
                upload_base: upload_base.trim_end_matches('/').to_string(),
                token: config.credential.clone(),
            }),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.endpoints.api_base
    }
}

#[async_trait]
impl Connector for DriveConnector {
    async fn connect(&self) -> Result<Box<dyn ObjectStore>, BackendError> {
        if self.endpoints.token.trim().is_empty() {
            return Err(BackendError::Unauthorized(
                "no Drive access token configured".to_string(),
            ));
        }
        debug!(api = %self.endpoints.api_base, "opening drive connection");
        Ok(Box::new(DriveConnection::new(
            self.http.clone(),
            Arc::clone(&self.endpoints),
        )))
    }
}

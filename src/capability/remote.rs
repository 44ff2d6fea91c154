//! Remote capabilities: the attempt input is POSTed as JSON to a URL.

use crate::capability::{into_result_map, Capability, CapabilityInput};
use crate::catalog::{CapabilityKind, ResultMap};
use crate::error::CapabilityError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const REMOTE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RemoteCapability {
    client: Client,
    url: String,
}

impl RemoteCapability {
    pub fn new(url: impl Into<String>) -> Result<Self, CapabilityError> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CapabilityError::InvalidEntryPoint {
                kind: CapabilityKind::Remote.to_string(),
                entry_point: url,
            });
        }
        // Request deadlines come from the executor's per-attempt timeout.
        let client = Client::builder()
            .connect_timeout(REMOTE_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| CapabilityError::Remote(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn map_http_error(error: reqwest::Error) -> CapabilityError {
    if error.is_timeout() {
        CapabilityError::Remote(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        CapabilityError::Remote(format!("Connection error: {}", error))
    } else if let Some(status) = error.status() {
        CapabilityError::Remote(format!("Request failed with status {}: {}", status, error))
    } else {
        CapabilityError::Remote(format!("HTTP error: {}", error))
    }
}

#[async_trait]
impl Capability for RemoteCapability {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Remote
    }

    async fn invoke(&self, input: CapabilityInput) -> Result<ResultMap, CapabilityError> {
        let response = self
            .client
            .post(&self.url)
            .json(&input)
            .send()
            .await
            .map_err(map_http_error)?
            .error_for_status()
            .map_err(map_http_error)?;

        let value: Value = response
            .json()
            .await
            .map_err(|e| CapabilityError::MalformedResult(format!("invalid json: {}", e)))?;
        into_result_map(value)
    }
}

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header::USER_AGENT, StatusCode};
use sandbox_core::convert::{ConversionError, DocumentConverter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{instrument, warn};

/// Configuration for the remote conversion service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RemoteSettings {
    /// URL that accepts `POST <raw document>` and answers with the canonical form.
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl RemoteSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Converter that delegates to an external HTTP service.
pub struct RemoteConverter {
    client: reqwest::Client,
    settings: RemoteSettings,
}

impl RemoteConverter {
    pub fn new(settings: RemoteSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("building conversion http client")?;
        Ok(Self { client, settings })
    }

    pub fn endpoint(&self) -> &str {
        &self.settings.endpoint
    }
}

#[async_trait]
impl DocumentConverter for RemoteConverter {
    fn name(&self) -> &'static str {
        "remote"
    }

    #[instrument(skip_all, fields(converter = "remote", endpoint = %self.settings.endpoint))]
    async fn convert(&self, raw: &Value) -> Result<Value, ConversionError> {
        let resp = self
            .client
            .post(&self.settings.endpoint)
            .header(USER_AGENT, "iiif-sandbox")
            .json(raw)
            .send()
            .await
            .map_err(|e| {
                warn!("conversion service unreachable: {e}");
                ConversionError::Unavailable(e.to_string())
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_failure(status, body));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| ConversionError::Unavailable(format!("invalid response body: {e}")))
    }
}

/// Client errors mean the service refused the document; anything else is the
/// service's own fault.
fn classify_failure(status: StatusCode, body: String) -> ConversionError {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        body.trim().to_string()
    };
    if status.is_client_error() {
        ConversionError::Rejected(detail)
    } else {
        ConversionError::Unavailable(detail)
    }
}

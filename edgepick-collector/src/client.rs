//! HTTP client for the gateway routes a collector uses.

use edgepick_core::config::CollectorConf;
use edgepick_core::model::{LatencyBatch, LatencyTargets};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway answered {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },
}

#[derive(Debug, Deserialize)]
struct Created {
    key: String,
}

#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    targets_path: String,
    latency_path: String,
    api_key: Option<String>,
}

impl GatewayClient {
    pub fn new(conf: &CollectorConf, api_key: Option<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("edgepick-collector/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: conf.gateway_url.trim_end_matches('/').to_string(),
            targets_path: conf.targets_path.trim_matches('/').to_string(),
            latency_path: conf.latency_path.trim_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status { status, body })
    }

    /// Probe targets the gateway assigns to `source`.
    pub async fn fetch_targets(&self, source: &str) -> Result<LatencyTargets, ClientError> {
        let request = self.http.get(self.url(&self.targets_path)).query(&[("source", source)]);
        let response = Self::check(self.authorize(request).send().await?).await?;
        let targets: LatencyTargets = response.json().await?;
        debug!(%source, targets = targets.targets.len(), "targets fetched");
        Ok(targets)
    }

    /// Posts a batch for archiving, returns the key it was stored under.
    pub async fn publish_batch(&self, batch: &LatencyBatch) -> Result<String, ClientError> {
        let request = self.http.post(self.url(&self.latency_path)).json(batch);
        let response = Self::check(self.authorize(request).send().await?).await?;
        let created: Created = response.json().await?;
        Ok(created.key)
    }
}

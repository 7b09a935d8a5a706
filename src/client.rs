use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures::Stream;
use serde_json::Value;

use crate::request::GenerateRequest;
use crate::stream::{GenerationChunk, decode_sse, error_message};
use crate::tier::{NO_CONNECTION, SubscriptionData, tier_name};

pub const DEFAULT_BASE_URL: &str = "https://text.novelai.net";
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: u64,
}

impl ClientConfig {
    pub fn new(api_key: String) -> Self {
        ClientConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// HTTP client for the generation provider. One instance serves many
/// requests; each generation has a single logical consumer.
#[derive(Debug, Clone)]
pub struct NaiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NaiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;
        Ok(NaiClient {
            client,
            base_url: config.base_url,
            api_key: config.api_key,
        })
    }

    fn api_path(&self, api_path: &str) -> String {
        if api_path.starts_with('/') {
            format!("{}{}", self.base_url, api_path)
        } else {
            format!("{}/{}", self.base_url, api_path)
        }
    }

    /// Fetches the account's subscription record.
    pub async fn fetch_subscription(&self) -> Result<SubscriptionData> {
        let resp = self
            .client
            .get(self.api_path("/user/subscription"))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("Subscription check failed with status {}", resp.status());
        }
        Ok(resp.json::<SubscriptionData>().await?)
    }

    /// Tier name for status display. Any failure reads as `no_connection`
    /// rather than an error.
    pub async fn connection_status(&self) -> &'static str {
        match self.fetch_subscription().await {
            Ok(data) => tier_name(Some(&data)),
            Err(err) => {
                log::warn!("Could not load subscription data: {err:#}");
                NO_CONNECTION
            }
        }
    }

    /// Streaming generation. The returned stream yields accumulated text plus
    /// per-token logprobs; dropping it aborts the request.
    pub async fn generate_stream(
        &self,
        request: &GenerateRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<GenerationChunk>> + Send>>> {
        let resp = self
            .client
            .post(self.api_path("/ai/generate-stream"))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        let bytes = Box::pin(resp.bytes_stream());
        Ok(Box::pin(decode_sse(bytes)))
    }

    /// One-shot generation, for callers that do not want streaming.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let resp = self
            .client
            .post(self.api_path("/ai/generate"))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        let body: Value = resp.json().await?;
        body.get("output")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("Response carried no output")
    }

    /// Non-success responses surface the server-provided message when the
    /// body carries one, else the status text.
    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .as_ref()
            .and_then(error_message)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            });
        bail!("{message} (status {status})");
    }
}

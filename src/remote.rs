//! Azure Document Intelligence client.
//!
//! Runs the `prebuilt-layout` model with markdown output. Analysis is a
//! long-running operation: the submit call answers `202 Accepted` with an
//! `Operation-Location` URL, which is polled until the job settles.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use std::time::Duration;

use crate::config::ExtractionConfig;
use crate::extract::RemoteExtractor;

const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

pub struct DocumentIntelligence {
    endpoint: String,
    api_key: String,
    api_version: String,
    poll_interval: Duration,
    max_polls: u32,
    client: reqwest::Client,
}

impl DocumentIntelligence {
    /// Builds a client when both the endpoint and key are configured.
    pub fn from_config(config: &ExtractionConfig) -> Result<Option<Self>> {
        if !config.remote_available() {
            return Ok(None);
        }
        let (Some(endpoint), Some(api_key)) = (&config.endpoint, &config.api_key) else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Some(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.clone(),
            api_version: config.api_version.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_polls: config.max_polls,
            client,
        }))
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/documentintelligence/documentModels/prebuilt-layout:analyze?api-version={}&outputContentFormat=markdown",
            self.endpoint, self.api_version
        )
    }

    async fn submit(&self, bytes: &[u8]) -> Result<String> {
        let body = serde_json::json!({
            "base64Source": base64::engine::general_purpose::STANDARD.encode(bytes),
        });

        let response = self
            .client
            .post(self.analyze_url())
            .header(KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Document Intelligence request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Document Intelligence error {}: {}", status, text);
        }

        response
            .headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                anyhow::anyhow!("Document Intelligence response has no Operation-Location")
            })
    }

    async fn poll(&self, operation_url: &str) -> Result<String> {
        for _ in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .client
                .get(operation_url)
                .header(KEY_HEADER, &self.api_key)
                .send()
                .await
                .context("Document Intelligence poll failed")?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                bail!("Document Intelligence error {}: {}", status, text);
            }

            let json: serde_json::Value = response.json().await?;
            match json.get("status").and_then(|s| s.as_str()) {
                Some("succeeded") => {
                    return json
                        .pointer("/analyzeResult/content")
                        .and_then(|c| c.as_str())
                        .map(|c| c.to_string())
                        .ok_or_else(|| {
                            anyhow::anyhow!("Document Intelligence result has no content")
                        });
                }
                Some("failed") | Some("canceled") => {
                    let message = json
                        .pointer("/error/message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("analysis failed");
                    bail!("Document Intelligence analysis failed: {}", message);
                }
                _ => continue,
            }
        }

        bail!(
            "Document Intelligence analysis did not finish after {} polls",
            self.max_polls
        )
    }
}

#[async_trait]
impl RemoteExtractor for DocumentIntelligence {
    fn name(&self) -> &str {
        "document-intelligence"
    }

    async fn analyze(&self, bytes: Vec<u8>) -> Result<String> {
        let operation_url = self.submit(&bytes).await?;
        tracing::debug!(operation = %operation_url, "document analysis started");
        self.poll(&operation_url).await
    }
}

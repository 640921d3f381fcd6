//! Chat-completion client.
//!
//! One provider is implemented: Azure OpenAI chat completions. A model's
//! [`ModelConfig`] decides the deployment, the API version, which field
//! carries the token budget and which parameters the deployment rejects.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (other) → fail immediately
//! - Network errors → retry
//!
//! Delays double from the base backoff (1s, 2s, 4s, ...).

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::{CompletionConfig, Config, ModelConfig, TokenParam};

pub const MIN_TEMPERATURE: f64 = 0.0;
pub const MAX_TEMPERATURE: f64 = 1.0;
pub const MIN_MAX_TOKENS: u32 = 1;
pub const MAX_MAX_TOKENS: u32 = 4000;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Missing API key or endpoint for model: {0}")]
    MissingCredentials(String),
    #[error("temperature must be between 0.0 and 1.0, got {0}")]
    Temperature(f64),
    #[error("max_tokens must be between 1 and 4000, got {0}")]
    MaxTokens(u32),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_message: String,
    pub user_prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn validate(&self) -> Result<(), CompletionError> {
        if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(CompletionError::Temperature(self.temperature));
        }
        if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&self.max_tokens) {
            return Err(CompletionError::MaxTokens(self.max_tokens));
        }
        Ok(())
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Display name recorded with each completion.
    fn model_name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

/// Runs `request` and returns the completion text. Failures are rendered
/// as `Error: <message>` so the caller always has a record to keep.
pub async fn get_completion(
    provider: &dyn CompletionProvider,
    request: &CompletionRequest,
) -> String {
    match provider.complete(request).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(model = provider.model_name(), "completion failed: {}", e);
            format!("Error: {}", e)
        }
    }
}

// ============ Azure OpenAI Provider ============

pub struct AzureOpenAiProvider {
    name: String,
    url: String,
    api_key: String,
    token_param: TokenParam,
    send_temperature: bool,
    max_retries: u32,
    backoff: Duration,
    client: reqwest::Client,
}

impl AzureOpenAiProvider {
    pub fn new(
        id: &str,
        model: &ModelConfig,
        settings: &CompletionConfig,
    ) -> Result<Self, CompletionError> {
        let name = model.display_name(id).to_string();
        let (Some(endpoint), Some(api_key)) = (
            model.endpoint.as_deref().filter(|e| !e.trim().is_empty()),
            model.api_key.as_deref().filter(|k| !k.trim().is_empty()),
        ) else {
            return Err(CompletionError::MissingCredentials(name));
        };

        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            model.deployment(id),
            model.api_version
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            name,
            url,
            api_key: api_key.to_string(),
            token_param: model.token_param,
            send_temperature: model.supports("temperature"),
            max_retries: settings.max_retries,
            backoff: Duration::from_secs(1),
            client,
        })
    }

    /// Overrides the base retry delay.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "messages": [
                {"role": "system", "content": request.system_message},
                {"role": "user", "content": request.user_prompt},
            ],
        });
        body[self.token_param.as_str()] = serde_json::json!(request.max_tokens);
        if self.send_temperature {
            body["temperature"] = serde_json::json!(request.temperature);
        }
        body
    }
}

#[async_trait]
impl CompletionProvider for AzureOpenAiProvider {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        request.validate()?;
        let body = self.request_body(request);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff * (1u32 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.url)
                .header("api-key", &self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_chat_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = CompletionError::Api {
                        status: status.as_u16(),
                        body: body_text,
                    };
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::debug!(attempt, %status, "retryable completion error");
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    tracing::debug!(attempt, "completion request error: {}", e);
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            CompletionError::InvalidResponse("completion failed after retries".to_string())
        }))
    }
}

/// Extracts `choices[0].message.content`.
fn parse_chat_response(json: &serde_json::Value) -> Result<String, CompletionError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.to_string())
        .ok_or_else(|| {
            CompletionError::InvalidResponse("missing choices[0].message.content".into())
        })
}

/// Builds the provider for `requested` (or the configured default model).
///
/// A non-blank `deployment` replaces the model's configured deployment for
/// this provider only.
pub fn provider_for(
    config: &Config,
    requested: Option<&str>,
    deployment: Option<&str>,
) -> Result<AzureOpenAiProvider> {
    let (id, model) = config.resolve_model(requested)?;
    let mut model = model.clone();
    if let Some(deployment) = deployment.map(str::trim).filter(|d| !d.is_empty()) {
        model.deployment_name = Some(deployment.to_string());
    }
    AzureOpenAiProvider::new(id, &model, &config.completion)
        .with_context(|| format!("Failed to set up model '{}'", id))
}

// ============ CLI ============

pub fn run_models(config: &Config) -> Result<()> {
    if config.models.is_empty() {
        println!("No models configured.");
        println!("Add a [models.<id>] section to the config file or set MODEL_<ID>_* variables.");
        return Ok(());
    }

    let default = config.resolve_model(None).ok().map(|(id, _)| id);
    println!("Models ({}):", config.models.len());
    for (id, model) in &config.models {
        let marker = if Some(id.as_str()) == default { "*" } else { " " };
        let status = if model.has_credentials() {
            "ready"
        } else {
            "missing credentials"
        };
        println!(
            "{} {:<16} {:<24} deployment={} {}",
            marker,
            id,
            model.display_name(id),
            model.deployment(id),
            status
        );
    }
    Ok(())
}

//! Language-model backends.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::AzureOpenAiConfig;
use crate::error::{Error, Result};

/// One model call: system instructions, the user message and optional
/// material the model should work from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub instructions: String,
    pub message: String,
    pub context: Option<String>,
}

impl Prompt {
    pub fn new(instructions: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// The user turn as sent to a chat model.
    pub fn user_content(&self) -> String {
        match &self.context {
            Some(ctx) => format!("{}\n\n---\n{}", self.message, ctx),
            None => self.message.clone(),
        }
    }
}

#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &Prompt) -> Result<String>;
}

/// Run `model` on `prompt`, failing with `ModelCallFailed` after `timeout`.
pub async fn complete_with_timeout(
    model: &dyn LanguageModel,
    prompt: &Prompt,
    timeout: Duration,
) -> Result<String> {
    match tokio::time::timeout(timeout, model.complete(prompt)).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(Error::ModelCallFailed(msg))) => Err(Error::ModelCallFailed(msg)),
        Ok(Err(other)) => Err(Error::ModelCallFailed(other.to_string())),
        Err(_) => Err(Error::ModelCallFailed(format!(
            "{} did not answer within {:?}",
            model.name(),
            timeout
        ))),
    }
}

/// Offline model: answers with the supplied context, or the message when
/// there is none. Keeps the workflow runnable without credentials.
#[derive(Debug, Default, Clone)]
pub struct PassthroughModel;

#[async_trait::async_trait]
impl LanguageModel for PassthroughModel {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        Ok(prompt
            .context
            .clone()
            .unwrap_or_else(|| prompt.message.clone()))
    }
}

/// Azure OpenAI chat completions.
pub struct AzureOpenAiModel {
    config: AzureOpenAiConfig,
    http: reqwest::Client,
}

impl AzureOpenAiModel {
    /// `timeout` bounds each HTTP exchange with the deployment.
    pub fn new(config: AzureOpenAiConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.deployment,
            self.config.api_version
        )
    }
}

#[async_trait::async_trait]
impl LanguageModel for AzureOpenAiModel {
    fn name(&self) -> &str {
        &self.config.deployment
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let body = json!({
            "messages": [
                { "role": "system", "content": prompt.instructions },
                { "role": "user", "content": prompt.user_content() }
            ],
            "temperature": 0.2
        });

        debug!(deployment = %self.config.deployment, "Calling Azure OpenAI");

        let response = self
            .http
            .post(self.url())
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ModelCallFailed(e.to_string()))?;

        let status = response.status();
        let value: Value = response
            .json()
            .await
            .map_err(|e| Error::ModelCallFailed(format!("invalid response body: {}", e)))?;

        if !status.is_success() {
            let message = value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("no error message");
            return Err(Error::ModelCallFailed(format!("HTTP {}: {}", status, message)));
        }

        parse_completion(&value)
    }
}

/// Pull the first choice's text out of a chat completion body.
pub(crate) fn parse_completion(value: &Value) -> Result<String> {
    value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::ModelCallFailed("completion has no content".into()))
}

use std::time::Duration;

use anyhow::{Context, Result, bail};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use gluco_core::recommendation::{ChatMessage, PromptPayload, RecommendationProvider};

use crate::config::{API_KEY_VARS, LlmConfig};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenAI-compatible chat completions client.
pub struct ChatClient {
    client: reqwest::Client,
    config: LlmConfig,
    rt: tokio::runtime::Handle,
}

impl ChatClient {
    /// Must be called from within a tokio runtime.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "gluco-cli/{} (glucose tracker)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            config,
            rt: tokio::runtime::Handle::current(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    pub async fn generate_async(&self, payload: &PromptPayload) -> Result<String> {
        let Some(api_key) = self.config.api_key.as_ref() else {
            bail!(
                "No API key configured. Set {} (or {})",
                API_KEY_VARS[0],
                API_KEY_VARS[1]
            );
        };

        let request = ChatCompletionRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            messages: payload.messages(),
        };

        debug!(model = %self.config.model, url = %self.endpoint(), "requesting completion");
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .context("Failed to reach the recommendation API")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, "recommendation API returned an error");
            bail!("Recommendation API returned {status}: {}", body.trim());
        }

        let data: ChatCompletionResponse = resp
            .json()
            .await
            .context("Failed to parse recommendation API response")?;

        let text = data
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("Recommendation API returned no choices")?;
        if text.trim().is_empty() {
            bail!("Recommendation API returned an empty response");
        }
        Ok(text)
    }
}

impl RecommendationProvider for ChatClient {
    fn generate(&self, payload: &PromptPayload) -> Result<String> {
        tokio::task::block_in_place(|| self.rt.block_on(self.generate_async(payload)))
    }
}

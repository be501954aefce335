//! The loaded engine and its OpenAI-compatible HTTP implementation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use ht_domain::error::{Error, Result};

/// A loaded local model that can answer chat completions.
#[async_trait::async_trait]
pub trait LocalEngine: Send + Sync {
    /// Run one chat completion. `Ok(None)` when the engine produced no
    /// content.
    async fn chat(&self, system: &str, user: &str) -> Result<Option<String>>;

    /// Release the engine's resources.
    async fn unload(&self) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ChatEngine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Client for a local inference runtime exposing `/v1/chat/completions`.
pub struct ChatEngine {
    client: reqwest::Client,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatEngine {
    pub fn new(base_url: &str, temperature: f32, max_tokens: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| Error::Config(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature,
            max_tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `Ok(())` once the runtime answers its health endpoint.
    pub async fn check_health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let resp = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Error::Http(format!("health check returned {}", resp.status())))
        }
    }
}

#[async_trait::async_trait]
impl LocalEngine for ChatEngine {
    async fn chat(&self, system: &str, user: &str) -> Result<Option<String>> {
        let request = ChatCompletionRequest {
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(e.to_string())
                } else {
                    Error::Http(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Other(format!("local runtime {status}: {text}")));
        }

        let completion: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(first_content(completion))
    }

    async fn unload(&self) -> Result<()> {
        // The runtime owns the weights; dropping our side is enough.
        tracing::debug!(runtime = %self.base_url, "chat engine released");
        Ok(())
    }
}

fn first_content(completion: ChatCompletionResponse) -> Option<String> {
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
}

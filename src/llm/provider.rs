//! OpenAI-compatible chat-completions provider.
//!
//! Works against any endpoint that speaks the `/chat/completions` wire format
//! (OpenAI, OpenRouter, vLLM, Ollama's compatibility layer, ...).

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::retry::RetryPolicy;
use super::{CompletionProvider, CompletionRequest};
use crate::config::ProviderConfig;
use crate::error::{FulcrumError, Result};

/// Chat completion request body
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Chat completion response body
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP provider speaking the OpenAI chat-completions protocol.
pub struct OpenAiCompatibleProvider {
    name: String,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: Client,
    retry: RetryPolicy,
}

impl OpenAiCompatibleProvider {
    /// Create a provider from config, resolving its API key from the environment.
    pub fn from_config(config: &ProviderConfig, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FulcrumError::Network(format!("Failed to create HTTP client: {e}")))?;

        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty());

        if api_key.is_none() {
            tracing::warn!(provider = %config.name, "no API key configured");
        }

        Ok(Self {
            name: config.name.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            client,
            retry,
        })
    }

    /// Override the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Model id requested from the endpoint
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, request: &CompletionRequest) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let body = &body;
        let this = self;
        let response = self
            .retry
            .run(
                move || async move {
                    let mut builder = this.client.post(&this.endpoint).json(body);
                    if let Some(key) = &this.api_key {
                        builder = builder.bearer_auth(key);
                    }
                    Ok::<_, FulcrumError>(builder.send().await?)
                },
                |r: &reqwest::Response| r.status().as_u16(),
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(FulcrumError::RateLimited {
                    provider: self.name.clone(),
                    attempts: self.retry.max_attempts,
                });
            }
            return Err(FulcrumError::Provider {
                provider: self.name.clone(),
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| FulcrumError::Provider {
                provider: self.name.clone(),
                status: status.as_u16(),
                body: "response contained no message content".to_string(),
            })
    }
}

impl CompletionProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> BoxFuture<'a, Result<String>> {
        self.send(request).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig {
            name: "primary".into(),
            base_url: "https://openrouter.ai/api/v1/".into(),
            model: "meta-llama/llama-3.3-70b-instruct".into(),
            api_key_env: Some("FULCRUM_TEST_UNSET_KEY".into()),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_endpoint_normalization() {
        let provider = OpenAiCompatibleProvider::from_config(&config(), RetryPolicy::none()).unwrap();
        assert_eq!(provider.endpoint, "https://openrouter.ai/api/v1/chat/completions");
        assert_eq!(provider.name(), "primary");
        assert!(provider.api_key.is_none());

        let provider = provider.with_api_key("sk-test");
        assert_eq!(provider.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_request_serialization() {
        let body = ChatRequest {
            model: "m",
            messages: vec![ChatMessage { role: "user", content: "hi" }],
            temperature: Some(0.4),
            max_tokens: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"id":"x","choices":[{"message":{"role":"assistant","content":"{\"a\":1}"},"finish_reason":"stop"}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("{\"a\":1}"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let mut cfg = config();
        cfg.base_url = "http://127.0.0.1:9".into();
        let provider = OpenAiCompatibleProvider::from_config(&cfg, RetryPolicy::none()).unwrap();
        let err = provider
            .complete(&CompletionRequest::new("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, FulcrumError::Network(_)), "{err}");
    }
}

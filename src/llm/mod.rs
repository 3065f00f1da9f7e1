//! LLM completion gateway.
//!
//! Every generative call in the engine (entity responses, cross-entity
//! analysis, fulcrum synthesis) goes through [`CompletionGateway`], which
//! layers three behaviors over raw providers:
//!
//! ```text
//!   caller ──> CompletionGateway ──> provider[0] ──(fails)──> provider[1] ──> ...
//!                   │                    │
//!                   │                    └── RetryPolicy: backoff + jitter on 408/429/5xx
//!                   └── extract_json: raw → fenced → bracket slice → balanced scan
//! ```
//!
//! Providers implement [`CompletionProvider`]; the gateway tries them in
//! order until one produces usable output.

mod extract;
mod provider;
mod retry;
mod stats;

pub use extract::extract_json;
pub use provider::OpenAiCompatibleProvider;
pub use retry::{RetryPolicy, DEFAULT_RETRYABLE_STATUSES};
pub use stats::{GatewayStats, GatewayStatsSummary};

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::config::LlmConfig;
use crate::error::{FulcrumError, Result};

/// A single completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System instructions
    pub system: Option<String>,
    /// User prompt
    pub prompt: String,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Output token cap
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Request with just a prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Attach system instructions.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set output token cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A text-generation backend.
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logs and errors
    fn name(&self) -> &str;

    /// Generate raw text for `request`.
    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> BoxFuture<'a, Result<String>>;
}

/// Ordered provider chain with tolerant JSON parsing.
#[derive(Clone)]
pub struct CompletionGateway {
    providers: Vec<Arc<dyn CompletionProvider>>,
    stats: Arc<GatewayStats>,
}

impl std::fmt::Debug for CompletionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionGateway")
            .field("providers", &self.provider_names())
            .finish_non_exhaustive()
    }
}

impl CompletionGateway {
    /// Gateway over `providers`, tried in order.
    pub fn new(providers: Vec<Arc<dyn CompletionProvider>>) -> Self {
        Self {
            providers,
            stats: Arc::new(GatewayStats::new()),
        }
    }

    /// Build HTTP providers from config.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let providers = config
            .providers
            .iter()
            .map(|p| {
                OpenAiCompatibleProvider::from_config(p, config.retry.clone())
                    .map(|provider| Arc::new(provider) as Arc<dyn CompletionProvider>)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(providers))
    }

    /// Provider names in fallback order
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Call statistics
    pub fn stats(&self) -> &GatewayStats {
        &self.stats
    }

    /// Raw text from the first provider that succeeds.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.first_success(request, Ok).await
    }

    /// Parsed JSON from the first provider whose output yields JSON.
    ///
    /// Unparseable output counts as that provider failing.
    pub async fn complete_json(&self, request: &CompletionRequest) -> Result<Value> {
        self.first_success(request, |text| extract_json(&text)).await
    }

    async fn first_success<T>(
        &self,
        request: &CompletionRequest,
        parse: impl Fn(String) -> Result<T>,
    ) -> Result<T> {
        self.stats.record_call();

        if self.providers.is_empty() {
            self.stats.record_failure();
            return Err(FulcrumError::AllProvidersFailed(vec![
                "no providers configured".to_string(),
            ]));
        }

        let mut failures = Vec::new();

        for (index, provider) in self.providers.iter().enumerate() {
            if index > 0 {
                self.stats.record_fallback();
                tracing::info!(provider = provider.name(), "falling back to next provider");
            }

            match provider.complete(request).await.and_then(&parse) {
                Ok(value) => {
                    self.stats.record_success();
                    return Ok(value);
                },
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "provider call failed");
                    failures.push(format!("{}: {e}", provider.name()));
                },
            }
        }

        self.stats.record_failure();
        Err(FulcrumError::AllProvidersFailed(failures))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted providers for unit tests.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use futures::FutureExt;

    use super::*;

    /// Provider that replays canned outputs, then fails.
    pub struct ScriptedProvider {
        name: String,
        outputs: Mutex<VecDeque<Result<String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        pub fn new(name: &str, outputs: Vec<Result<String>>) -> Self {
            Self {
                name: name.to_string(),
                outputs: Mutex::new(outputs.into()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn always_failing(name: &str) -> Self {
            Self::new(name, Vec::new())
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CompletionProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn complete<'a>(&'a self, _request: &'a CompletionRequest) -> BoxFuture<'a, Result<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.outputs.lock().unwrap().pop_front();
            let name = self.name.clone();
            async move {
                next.unwrap_or_else(|| {
                    Err(FulcrumError::Provider {
                        provider: name,
                        status: 503,
                        body: "scripted failure".into(),
                    })
                })
            }
            .boxed()
        }
    }
}

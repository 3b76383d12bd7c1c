use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::NerError;

/// Text-completion backend for the extractor and classifier (§4.3 ambient supplement).
#[async_trait]
pub trait LlmProvider: Send + Sync + 'static {
    async fn complete(&self, prompt: &str, max_tokens: usize) -> Result<String, NerError>;
}

/// Embedding backend for the hybrid searcher and context builder.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + 'static {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, NerError>;
}

/// Returns a canned response regardless of prompt; used by tests and by `GenerateAnswer`'s
/// deterministic mock-answer mode when no real provider is configured.
pub struct MockLlmProvider {
    response: String,
}

impl MockLlmProvider {
    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, _prompt: &str, _max_tokens: usize) -> Result<String, NerError> {
        Ok(self.response.clone())
    }
}

/// Deterministic, non-random embedding so tests that depend on stable cosine similarity never
/// flake: each byte of `text` accumulates into `dim` buckets.
pub struct MockEmbeddingProvider {
    dim: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self { dim: 8 }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, NerError> {
        let mut vector = vec![0f32; self.dim];
        for (i, b) in text.bytes().enumerate() {
            vector[i % self.dim] += (b as f32) / 255.0;
        }
        Ok(vector)
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    text: String,
}

/// Calls a generic JSON completion endpoint (`POST {prompt, max_tokens}` -> `{text}`), the shape
/// most self-hosted and proxy LLM gateways converge on.
pub struct HttpLlmProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpLlmProvider {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn complete(&self, prompt: &str, max_tokens: usize) -> Result<String, NerError> {
        let mut req = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "prompt": prompt, "max_tokens": max_tokens }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| NerError::Llm(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(NerError::Llm(format!("completion endpoint returned {}", resp.status())));
        }
        let body: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| NerError::Llm(e.to_string()))?;
        Ok(body.text)
    }
}

/// Default-plus-override lookup, the same shape `DriverRegistry` uses for source drivers.
pub struct LlmProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    default_id: Option<String>,
}

impl Default for LlmProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            default_id: None,
        }
    }

    pub fn register(&mut self, id: impl Into<String>, provider: Arc<dyn LlmProvider>) -> &mut Self {
        let id = id.into();
        if self.default_id.is_none() {
            self.default_id = Some(id.clone());
        }
        self.providers.insert(id, provider);
        self
    }

    pub fn for_id(&self, id: &str) -> Result<Arc<dyn LlmProvider>, NerError> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| NerError::ProviderNotConfigured(id.to_string()))
    }

    /// Returns `None` when no provider is registered, signaling callers to fall back to a
    /// deterministic mock answer rather than erroring (§4.7).
    pub fn default_provider(&self) -> Option<Arc<dyn LlmProvider>> {
        self.default_id.as_ref().and_then(|id| self.providers.get(id)).cloned()
    }
}

pub struct EmbeddingProviderRegistry {
    providers: HashMap<String, Arc<dyn EmbeddingProvider>>,
    default_id: Option<String>,
}

impl Default for EmbeddingProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            default_id: None,
        }
    }

    pub fn register(
        &mut self,
        id: impl Into<String>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> &mut Self {
        let id = id.into();
        if self.default_id.is_none() {
            self.default_id = Some(id.clone());
        }
        self.providers.insert(id, provider);
        self
    }

    pub fn for_id(&self, id: &str) -> Result<Arc<dyn EmbeddingProvider>, NerError> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| NerError::ProviderNotConfigured(id.to_string()))
    }

    pub fn default_provider(&self) -> Option<Arc<dyn EmbeddingProvider>> {
        self.default_id.as_ref().and_then(|id| self.providers.get(id)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_llm_returns_canned_response() {
        let provider = MockLlmProvider::with_response("hello");
        assert_eq!(provider.complete("anything", 10).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn mock_embedding_is_deterministic() {
        let provider = MockEmbeddingProvider::default();
        let a = provider.embed("same text").await.unwrap();
        let b = provider.embed("same text").await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn first_registered_provider_becomes_default() {
        let mut registry = LlmProviderRegistry::new();
        registry.register("a", Arc::new(MockLlmProvider::with_response("x")));
        registry.register("b", Arc::new(MockLlmProvider::with_response("y")));
        assert!(registry.default_provider().is_some());
        assert!(registry.for_id("a").is_ok());
        assert!(registry.for_id("missing").is_err());
    }
}

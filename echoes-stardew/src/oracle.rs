//! Wiring between the LLM client and the core oracle traits.

use std::sync::Arc;

use async_trait::async_trait;
use echoes_core::config::LlmConfig;
use echoes_core::embedding::EmbeddingProvider;
use echoes_core::{EchoesError, Embedding};
use echoes_llm::{LlmClient, LlmError, LlmProvider, ModelSet};
use tracing::{debug, warn};

/// Build an [`LlmClient`] from the `[llm]` config section.
///
/// # Errors
///
/// Returns [`LlmError::ConfigError`] for an unknown provider or a missing key.
pub fn client_from_config(config: &LlmConfig) -> Result<LlmClient, LlmError> {
    let provider = LlmProvider::from_name(&config.provider, &config.base_url, config.api_key.as_deref())?;
    debug!(provider = %config.provider, base_url = %config.base_url, "Building LLM client");
    Ok(LlmClient::new(
        provider,
        ModelSet {
            fast: config.fast_model.clone(),
            analysis: config.analysis_model.clone(),
            embedding: config.embedding_model.clone(),
        },
        config.max_retries,
        config.request_timeout_ms,
    ))
}

/// Embedding oracle backed by the LLM client's embedding endpoint.
#[derive(Debug, Clone)]
pub struct LlmEmbeddingProvider {
    client: Arc<LlmClient>,
    model: String,
    dimensions: usize,
}

impl LlmEmbeddingProvider {
    /// Wrap `client`; `dimensions` is what the configured model is expected to return.
    #[must_use]
    pub fn new(client: Arc<LlmClient>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for LlmEmbeddingProvider {
    async fn embed(&self, text: &str) -> echoes_core::Result<Embedding> {
        let vector = self
            .client
            .embed(text)
            .await
            .map_err(|e| EchoesError::Embedding(e.to_string()))?;
        if vector.len() != self.dimensions {
            warn!(
                model = %self.model,
                expected = self.dimensions,
                got = vector.len(),
                "Embedding dimensionality differs from configuration"
            );
        }
        Ok(Embedding(vector))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echoes_core::embedding::embed_or_empty;

    #[test]
    fn config_builds_client() {
        let client = client_from_config(&LlmConfig::default()).expect("ollama default");
        assert!(client.is_available());

        let none = LlmConfig {
            provider: "none".into(),
            ..LlmConfig::default()
        };
        assert!(!client_from_config(&none).expect("none").is_available());

        let bad = LlmConfig {
            provider: "openai".into(),
            api_key: None,
            ..LlmConfig::default()
        };
        assert!(client_from_config(&bad).is_err());
    }

    #[tokio::test]
    async fn unavailable_backend_degrades_to_empty_vector() {
        let provider = LlmEmbeddingProvider::new(Arc::new(LlmClient::none()), "nomic-embed-text", 384);
        assert!(matches!(provider.embed("hello").await, Err(EchoesError::Embedding(_))));
        assert!(embed_or_empty(&provider, "hello").await.is_empty());
    }
}

//! LLM Client: one interface over Ollama and OpenAI-compatible backends.
//!
//! Both text completion and embeddings go through the same retry loop. A
//! client built with [`LlmProvider::None`] fails every call with
//! [`LlmError::Unavailable`], which callers treat as "use the local fallback".

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{LlmRequest, LlmResponse, ModelRole};

/// Anything that can turn a prompt into text.
///
/// Implemented by [`LlmClient`] and by scripted fakes in tests.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Complete `request`, returning the raw model text.
    ///
    /// # Errors
    ///
    /// Returns an [`LlmError`] when no text could be produced.
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError>;
}

/// Provider backend for LLM inference.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama running locally.
    Ollama {
        /// e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible API.
    OpenAiCompatible {
        /// e.g. `https://api.openai.com`.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No backend: every call fails and callers fall back to local rules.
    None,
}

impl LlmProvider {
    /// Build from a provider name as written in configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] for an unknown provider, or for
    /// `openai` without an API key.
    pub fn from_name(name: &str, base_url: &str, api_key: Option<&str>) -> Result<Self, LlmError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        match name.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama { base_url }),
            "openai" | "openai_compatible" => {
                let api_key = api_key
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| LlmError::ConfigError("openai provider requires an api_key".into()))?;
                Ok(Self::OpenAiCompatible {
                    base_url,
                    api_key: api_key.to_string(),
                })
            }
            "none" | "" => Ok(Self::None),
            other => Err(LlmError::ConfigError(format!("unknown LLM provider '{other}'"))),
        }
    }
}

/// Model names used for each role.
#[derive(Debug, Clone)]
pub struct ModelSet {
    /// Short per-turn calls.
    pub fast: String,
    /// Post-conversation analysis.
    pub analysis: String,
    /// Embeddings.
    pub embedding: String,
}

/// The main LLM client that routes requests to the configured backend.
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    models: ModelSet,
    max_retries: u32,
    default_timeout_ms: u64,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let provider = match &self.provider {
            LlmProvider::Ollama { base_url } => format!("ollama({base_url})"),
            LlmProvider::OpenAiCompatible { base_url, .. } => format!("openai({base_url})"),
            LlmProvider::None => "none".to_string(),
        };
        f.debug_struct("LlmClient")
            .field("provider", &provider)
            .field("models", &self.models)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl LlmClient {
    /// Create a new LLM client.
    #[must_use]
    pub fn new(provider: LlmProvider, models: ModelSet, max_retries: u32, default_timeout_ms: u64) -> Self {
        Self {
            provider,
            http: Client::new(),
            models,
            max_retries,
            default_timeout_ms,
        }
    }

    /// Create a client with no LLM backend.
    #[must_use]
    pub fn none() -> Self {
        Self::new(
            LlmProvider::None,
            ModelSet {
                fast: String::new(),
                analysis: String::new(),
                embedding: String::new(),
            },
            0,
            0,
        )
    }

    /// Whether a backend is configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    fn model_for(&self, role: ModelRole) -> &str {
        match role {
            ModelRole::Fast => &self.models.fast,
            ModelRole::Analysis => &self.models.analysis,
        }
    }

    /// Generate a response.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Unavailable`] without a backend, or
    /// [`LlmError::RetriesExhausted`] when every attempt failed.
    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let model = self.model_for(request.role).to_string();
        let timeout = Duration::from_millis(request.timeout_ms.unwrap_or(self.default_timeout_ms));
        let start = Instant::now();

        let (text, tokens) = match &self.provider {
            LlmProvider::None => return Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => {
                let prompt = if request.system.is_empty() {
                    request.user.clone()
                } else {
                    format!("{}\n\n{}", request.system, request.user)
                };
                let mut body = json!({
                    "model": model,
                    "prompt": prompt,
                    "stream": false,
                    "options": {
                        "temperature": request.temperature,
                        "num_predict": request.max_tokens,
                    }
                });
                if request.json_mode {
                    body["format"] = json!("json");
                }
                let v = self
                    .post_with_retries(&format!("{base_url}/api/generate"), None, &body, timeout)
                    .await?;
                (
                    v["response"].as_str().unwrap_or_default().to_string(),
                    v["eval_count"].as_u64(),
                )
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                let mut messages = Vec::new();
                if !request.system.is_empty() {
                    messages.push(json!({ "role": "system", "content": request.system }));
                }
                messages.push(json!({ "role": "user", "content": request.user }));
                let mut body = json!({
                    "model": model,
                    "messages": messages,
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                });
                if request.json_mode {
                    body["response_format"] = json!({ "type": "json_object" });
                }
                let v = self
                    .post_with_retries(
                        &format!("{base_url}/v1/chat/completions"),
                        Some(api_key),
                        &body,
                        timeout,
                    )
                    .await?;
                (
                    v["choices"][0]["message"]["content"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    v["usage"]["completion_tokens"].as_u64(),
                )
            }
        };

        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(%model, latency_ms, chars = text.len(), "LLM completion finished");
        Ok(LlmResponse {
            text,
            tokens_generated: tokens.and_then(|t| u32::try_from(t).ok()).unwrap_or(0),
            latency_ms,
            model,
        })
    }

    /// Embed `text` with the embedding model.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Unavailable`] without a backend, a retry error when
    /// every attempt failed, or [`LlmError::SchemaValidation`] when the reply
    /// holds no vector.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let timeout = Duration::from_millis(self.default_timeout_ms);
        let model = &self.models.embedding;
        let v = match &self.provider {
            LlmProvider::None => return Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => {
                let body = json!({ "model": model, "prompt": text });
                let v = self
                    .post_with_retries(&format!("{base_url}/api/embeddings"), None, &body, timeout)
                    .await?;
                v["embedding"].clone()
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                let body = json!({ "model": model, "input": text });
                let v = self
                    .post_with_retries(&format!("{base_url}/v1/embeddings"), Some(api_key), &body, timeout)
                    .await?;
                v["data"][0]["embedding"].clone()
            }
        };

        let vector: Vec<f32> = serde_json::from_value(v)
            .map_err(|e| LlmError::SchemaValidation(format!("embedding reply: {e}")))?;
        if vector.is_empty() {
            return Err(LlmError::SchemaValidation("embedding reply held an empty vector".into()));
        }
        Ok(vector)
    }

    async fn post_with_retries(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, LlmError> {
        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(url, attempt = attempt + 1, of = self.max_retries + 1, "Retrying LLM call");
            }

            let mut req = self.http.post(url).json(body).timeout(timeout);
            if let Some(token) = bearer {
                req = req.bearer_auth(token);
            }

            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<Value>()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()));
                }
                Ok(resp) => {
                    let status = resp.status();
                    last_error = format!("HTTP {status}: {}", resp.text().await.unwrap_or_default());
                    warn!(url, %status, "LLM backend returned an error");
                }
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() {
                        warn!(url, timeout_ms = timeout.as_millis(), "LLM request timed out");
                    } else {
                        warn!(url, error = %e, "LLM request failed");
                    }
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }
}

#[async_trait]
impl TextCompletion for LlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        Ok(self.generate(request).await?.text)
    }
}

//! Configuration for the relationship-memory engine.
//!
//! Maps directly to `echoes.toml`. Every section has working defaults, so an
//! empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EchoesConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Conversation grouping.
    #[serde(default)]
    pub conversation: ConversationConfig,
    /// Memory relevance search.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// LLM and embedding oracle settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Post-conversation analysis.
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Entity registry cache.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Logging output.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl EchoesConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `EchoesError::Config` if the TOML is invalid or the retrieval
    /// weights are out of range.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| crate::EchoesError::Config(e.to_string()))?;
        config.retrieval.weights.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether the relationship engine is enabled at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Optional path to an NPC catalog TOML overriding the built-in one.
    #[serde(default)]
    pub npc_catalog_path: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: "info".to_string(),
            npc_catalog_path: None,
        }
    }
}

/// Conversation grouping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Inactivity window after which an open conversation is considered stale.
    #[serde(default = "default_5_i64")]
    pub timeout_minutes: i64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self { timeout_minutes: 5 }
    }
}

/// Memory relevance search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of memories returned per search.
    #[serde(default = "default_3_usize")]
    pub max_results: usize,
    /// Candidates fetched by vector distance = `max_results * candidate_pool_factor`.
    #[serde(default = "default_2_usize")]
    pub candidate_pool_factor: usize,
    /// Relevance assigned to every memory on the recency-only fallback path.
    #[serde(default = "default_5_0")]
    pub fallback_relevance: f32,
    /// Probe text used when the orchestrator looks for long-term memories.
    #[serde(default = "default_probe")]
    pub analysis_probe: String,
    /// Expected embedding dimensionality.
    #[serde(default = "default_384")]
    pub embedding_dimensions: usize,
    /// Blend weights.
    #[serde(default)]
    pub weights: RelevanceWeights,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: 3,
            candidate_pool_factor: 2,
            fallback_relevance: 5.0,
            analysis_probe: default_probe(),
            embedding_dimensions: 384,
            weights: RelevanceWeights::default(),
        }
    }
}

impl RetrievalConfig {
    /// Size of the vector-distance candidate pool for a search of `max_results`.
    #[must_use]
    pub fn candidate_pool(&self, max_results: usize) -> usize {
        max_results.saturating_mul(self.candidate_pool_factor.max(1))
    }
}

/// Relevance blend weights. Similarity receives `1 - recency - emotional - importance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceWeights {
    /// Weight for the recency component.
    #[serde(default = "default_0_3")]
    pub recency: f32,
    /// Weight for the emotional-impact component.
    #[serde(default = "default_0_4")]
    pub emotional: f32,
    /// Weight for the importance component.
    #[serde(default = "default_0_3")]
    pub importance: f32,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            recency: 0.3,
            emotional: 0.4,
            importance: 0.3,
        }
    }
}

impl RelevanceWeights {
    /// Residual weight given to vector similarity.
    #[must_use]
    pub fn similarity(&self) -> f32 {
        1.0 - self.recency - self.emotional - self.importance
    }

    /// Check that every weight is non-negative and they sum to at most 1.
    ///
    /// # Errors
    /// Returns `EchoesError::Config` describing the offending weights.
    pub fn validate(&self) -> crate::error::Result<()> {
        let parts = [self.recency, self.emotional, self.importance];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(crate::EchoesError::Config(format!(
                "relevance weights must be non-negative: {self:?}"
            )));
        }
        if self.similarity() < -1e-4 {
            return Err(crate::EchoesError::Config(format!(
                "relevance weights sum above 1.0: {self:?}"
            )));
        }
        Ok(())
    }
}

/// LLM integration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "ollama", "openai", "none".
    #[serde(default = "default_ollama")]
    pub provider: String,
    /// Base URL for the LLM API.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// API key for OpenAI-compatible providers.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model for short per-turn calls (mood updates, gift classification).
    #[serde(default = "default_fast_model")]
    pub fast_model: String,
    /// Model for the post-conversation analysis.
    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,
    /// Model used by the embedding oracle.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Hard timeout for any LLM call in milliseconds.
    #[serde(default = "default_30000")]
    pub request_timeout_ms: u64,
    /// Retries before a call is reported as failed.
    #[serde(default = "default_2")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            fast_model: default_fast_model(),
            analysis_model: default_analysis_model(),
            embedding_model: default_embedding_model(),
            request_timeout_ms: 30_000,
            max_retries: 2,
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path. `":memory:"` opens an in-memory database.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Number of rotating backups to keep.
    #[serde(default = "default_3")]
    pub backup_count: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            wal_mode: true,
            backup_count: 3,
        }
    }
}

/// Post-conversation analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Pending analysis jobs held before new ones are dropped.
    #[serde(default = "default_64")]
    pub queue_capacity: usize,
    /// Concurrent analysis workers.
    #[serde(default = "default_1_usize")]
    pub workers: usize,
    /// Long-term memories included in the analysis prompt.
    #[serde(default = "default_3_usize")]
    pub memories_for_analysis: usize,
    /// Multiplier from the final sentiment score to friendship points.
    #[serde(default = "default_20_0")]
    pub sentiment_point_scale: f32,
    /// Timeout for the analysis call in milliseconds. Longer than
    /// `llm.request_timeout_ms` since the reply is a full JSON document.
    #[serde(default = "default_120000")]
    pub timeout_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            workers: 1,
            memories_for_analysis: 3,
            sentiment_point_scale: 20.0,
            timeout_ms: 120_000,
        }
    }
}

/// Entity registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Name→id entries kept in the LRU cache per entity kind.
    #[serde(default = "default_256")]
    pub cache_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { cache_size: 256 }
    }
}

/// Logging output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Emit JSON log lines instead of human-readable ones.
    #[serde(default)]
    pub json_logs: bool,
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_probe() -> String { "our past interactions".to_string() }
fn default_ollama() -> String { "ollama".to_string() }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_fast_model() -> String { "qwen2.5:1.5b".to_string() }
fn default_analysis_model() -> String { "mistral:7b-instruct".to_string() }
fn default_embedding_model() -> String { "all-minilm".to_string() }
fn default_db_path() -> String { "echoes.db".to_string() }
fn default_0_3() -> f32 { 0.3 }
fn default_0_4() -> f32 { 0.4 }
fn default_5_0() -> f32 { 5.0 }
fn default_20_0() -> f32 { 20.0 }
fn default_1_usize() -> usize { 1 }
fn default_2_usize() -> usize { 2 }
fn default_3_usize() -> usize { 3 }
fn default_5_i64() -> i64 { 5 }
fn default_2() -> u32 { 2 }
fn default_3() -> u32 { 3 }
fn default_64() -> usize { 64 }
fn default_256() -> usize { 256 }
fn default_384() -> usize { 384 }
fn default_30000() -> u64 { 30_000 }
fn default_120000() -> u64 { 120_000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = EchoesConfig::from_toml("").expect("parse");
        assert_eq!(config.conversation.timeout_minutes, 5);
        assert_eq!(config.retrieval.max_results, 3);
        assert!((config.retrieval.weights.similarity()).abs() < 1e-6);
        assert_eq!(config.retrieval.analysis_probe, "our past interactions");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = EchoesConfig::from_toml(
            r#"
            [retrieval]
            max_results = 5

            [retrieval.weights]
            emotional = 0.2

            [llm]
            provider = "none"
            "#,
        )
        .expect("parse");
        assert_eq!(config.retrieval.max_results, 5);
        assert!((config.retrieval.weights.similarity() - 0.2).abs() < 1e-6);
        assert_eq!(config.llm.provider, "none");
        assert_eq!(config.llm.max_retries, 2);
        assert_eq!(config.analysis.timeout_ms, 120_000);
    }

    #[test]
    fn analysis_timeout_is_configurable() {
        let config = EchoesConfig::from_toml("[analysis]\ntimeout_ms = 45000\n").expect("parse");
        assert_eq!(config.analysis.timeout_ms, 45_000);
        assert_eq!(config.analysis.queue_capacity, 64);
    }

    #[test]
    fn overweight_blend_is_rejected() {
        let result = EchoesConfig::from_toml(
            r"
            [retrieval.weights]
            recency = 0.6
            emotional = 0.6
            ",
        );
        assert!(result.is_err());
    }

    #[test]
    fn candidate_pool_scales_with_results() {
        let config = RetrievalConfig::default();
        assert_eq!(config.candidate_pool(3), 6);
        assert_eq!(config.candidate_pool(0), 0);
    }
}

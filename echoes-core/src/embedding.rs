//! Vector embedding abstraction layer.
//!
//! The embedding oracle is an external capability. Everything in this crate
//! talks to it through [`EmbeddingProvider`] and, on hot paths, through
//! [`embed_or_empty`], which turns every failure into the empty sentinel so
//! callers can degrade to recency-only search.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::Embedding;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Generate vector embeddings from text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EchoesError::Embedding`] if the oracle fails to
    /// produce a vector.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed a batch of texts.
    ///
    /// Default implementation calls `embed` in a loop.
    ///
    /// # Errors
    ///
    /// Returns an error if any embedding in the batch fails.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// The dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A human-readable name for the model.
    fn model_name(&self) -> &str;
}

/// Embed `text`, mapping blank input and any oracle failure to the empty sentinel.
pub async fn embed_or_empty(provider: &dyn EmbeddingProvider, text: &str) -> Embedding {
    if text.trim().is_empty() {
        return Embedding::empty();
    }
    match provider.embed(text).await {
        Ok(embedding) => {
            if embedding.is_empty() {
                debug!(model = provider.model_name(), "Embedding oracle returned an empty vector");
            }
            embedding
        }
        Err(e) => {
            warn!(model = provider.model_name(), error = %e, "Embedding failed, continuing without vector");
            Embedding::empty()
        }
    }
}

// ---------------------------------------------------------------------------
// Zero provider
// ---------------------------------------------------------------------------

/// Every text maps to the origin, so all stored turns tie on similarity and
/// ranking falls to the other components.
pub struct ZeroEmbeddingProvider {
    dims: usize,
}

impl ZeroEmbeddingProvider {
    /// Zero vectors of `dimensions` components.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for ZeroEmbeddingProvider {
    async fn embed(&self, _text: &str) -> Result<Embedding> {
        Ok(Embedding(vec![0.0; self.dims]))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "zero"
    }
}

// ---------------------------------------------------------------------------
// Hashing bag-of-words provider
// ---------------------------------------------------------------------------

/// Deterministic bag-of-words embedder using the hashing trick.
///
/// Texts that share words land close together, which is enough for offline
/// play and for tests that need meaningful distances without a model.
///
/// Each lowercased token is hashed with SHA-256: the first eight digest bytes
/// (little-endian) pick the slot and the low bit of the ninth picks the sign.
/// The mapping is fixed across platforms and toolchains.
pub struct HashingEmbeddingProvider {
    dims: usize,
}

impl HashingEmbeddingProvider {
    /// Create a hashing provider with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dims: dimensions.max(1),
        }
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut raw = vec![0.0_f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut word = [0_u8; 8];
            word.copy_from_slice(&digest[..8]);
            let h = u64::from_le_bytes(word);
            #[allow(clippy::cast_possible_truncation)]
            let slot = (h % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            raw[slot] += sign;
        }
        Ok(normalize(raw))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "hashing-bag-of-words"
    }
}

/// L2-normalize a raw vector; all-zero input is returned unchanged.
fn normalize(raw: Vec<f32>) -> Embedding {
    let mag: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag < f32::EPSILON {
        return Embedding(raw);
    }
    Embedding(raw.into_iter().map(|x| x / mag).collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

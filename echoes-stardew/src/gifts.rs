//! Gift tier resolution and scoring.
//!
//! A tier supplied by the host is used as given. Otherwise the lookup order
//! is the NPC's own table, the universal sets, a fast-model classification,
//! then `neutral`.

use std::sync::Arc;

use echoes_core::NpcCatalog;
use echoes_core::scoring::{GiftQuality, GiftTier, gift_points};
use echoes_llm::TextCompletion;
use echoes_llm::parse::parse_structured;
use echoes_llm::prompt::{PromptEngine, PromptId};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

/// Where a resolved tier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TierSource {
    /// The host sent the tier with the gift.
    Host,
    /// The NPC's table or the universal sets.
    Catalog,
    /// The model classified the item.
    Classified,
    /// Nothing knew the item.
    Default,
}

/// A gift handed over by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftRequest {
    /// Recipient.
    pub npc_name: String,
    /// Item display name.
    pub item_name: String,
    /// Host quality level (0 normal, 1 silver, 2 gold, 4 iridium).
    #[serde(default)]
    pub quality: u8,
    /// Tier the host already knows. `"unknown"` or absent means resolve it.
    #[serde(default, rename = "gift_preference", deserialize_with = "known_tier")]
    pub preference: Option<GiftTier>,
    /// Host's own birthday flag; when absent it is derived from the date.
    #[serde(default)]
    pub is_birthday: Option<bool>,
    /// Current season, for the birthday check.
    #[serde(default)]
    pub season: Option<String>,
    /// Current day of the month, for the birthday check.
    #[serde(default)]
    pub day_of_month: Option<u32>,
}

/// Result of scoring one gift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GiftOutcome {
    /// Resolved tier.
    pub tier: GiftTier,
    /// How the tier was found.
    pub source: TierSource,
    /// Quality used.
    pub quality: GiftQuality,
    /// Whether the birthday multiplier applied.
    pub birthday: bool,
    /// Friendship points to report.
    pub points: i32,
}

fn known_tier<'de, D>(deserializer: D) -> Result<Option<GiftTier>, D::Error>
where
    D: Deserializer<'de>,
{
    let label = Option::<String>::deserialize(deserializer)?;
    match label.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(l) if l.eq_ignore_ascii_case("unknown") => Ok(None),
        Some(l) => l.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Deserialize)]
struct TierReply {
    tier: String,
}

/// Resolves gift tiers and computes their points.
pub struct GiftResolver {
    catalog: Arc<NpcCatalog>,
    completion: Arc<dyn TextCompletion>,
    prompts: Arc<PromptEngine>,
}

impl GiftResolver {
    /// Create the resolver.
    #[must_use]
    pub fn new(catalog: Arc<NpcCatalog>, completion: Arc<dyn TextCompletion>, prompts: Arc<PromptEngine>) -> Self {
        Self {
            catalog,
            completion,
            prompts,
        }
    }

    /// Tier for `item` given to `npc`. Never fails.
    pub async fn resolve_tier(&self, npc: &str, item: &str) -> (GiftTier, TierSource) {
        if let Some(tier) = self.catalog.gift_preference(npc, item) {
            return (tier, TierSource::Catalog);
        }
        match self.classify(npc, item).await {
            Some(tier) => (tier, TierSource::Classified),
            None => (GiftTier::Neutral, TierSource::Default),
        }
    }

    async fn classify(&self, npc: &str, item: &str) -> Option<GiftTier> {
        let loved = self.catalog.loved_gifts(npc).join(", ");
        let loved = if loved.is_empty() { "unknown".to_string() } else { loved };
        let request = self
            .prompts
            .request(
                PromptId::GiftClassification,
                &[("npc_name", npc), ("item_name", item), ("loved_gifts", loved.as_str())],
            )
            .map_err(|e| warn!(error = %e, "Gift prompt unavailable"))
            .ok()?;

        let reply = match self.completion.complete(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                debug!(npc, item, error = %e, "Gift classification unavailable");
                return None;
            }
        };
        match parse_structured::<TierReply>(&reply).map(|r| r.tier.parse::<GiftTier>()) {
            Ok(Ok(tier)) => {
                debug!(npc, item, %tier, "Gift classified by model");
                Some(tier)
            }
            Ok(Err(e)) => {
                warn!(npc, item, error = %e, "Model answered with an unknown gift tier");
                None
            }
            Err(e) => {
                warn!(npc, item, error = %e, "Unreadable gift classification");
                None
            }
        }
    }

    /// Resolve the tier and compute the friendship points for `gift`.
    pub async fn score(&self, gift: &GiftRequest) -> GiftOutcome {
        let (tier, source) = match gift.preference {
            Some(tier) => (tier, TierSource::Host),
            None => self.resolve_tier(&gift.npc_name, &gift.item_name).await,
        };
        let quality = GiftQuality::from_level(gift.quality);
        let birthday = gift.is_birthday.unwrap_or_else(|| match (&gift.season, gift.day_of_month) {
            (Some(season), Some(day)) => self.catalog.is_birthday(&gift.npc_name, season, day),
            _ => false,
        });
        let points = gift_points(tier, quality, birthday, self.catalog.npc_multiplier(&gift.npc_name));
        info!(
            npc = %gift.npc_name,
            item = %gift.item_name,
            %tier,
            ?source,
            ?quality,
            birthday,
            points,
            "Scored gift"
        );
        GiftOutcome {
            tier,
            source,
            quality,
            birthday,
            points,
        }
    }
}

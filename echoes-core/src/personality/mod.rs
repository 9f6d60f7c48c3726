//! Personality Profile Store: the NPC's evolving perception of one player.
//!
//! A profile is a short free-text summary plus eleven traits on a 0–10
//! scale. Profiles are seeded from the NPC's archetype in the
//! [`NpcCatalog`](crate::catalog::NpcCatalog) the first time a pair meets, and
//! afterwards only change through [`PersonalityUpdate`]s produced by the
//! post-conversation analysis.

pub mod insight;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::NpcCatalog;
use crate::error::Result;
use crate::events::{EventSink, RelationshipEvent, notify};
use crate::store::RelationshipStore;
use crate::types::RelationshipKey;

pub use insight::{RelationshipInsight, RelationshipLevel, relationship_score};

/// Upper bound of every trait.
pub const MAX_TRAIT: f32 = 10.0;
/// Summaries longer than this many words are truncated on update.
pub const SUMMARY_WORD_LIMIT: usize = 60;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// The eleven perception traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trait {
    /// How warm the player seems.
    Friendliness,
    /// How outgoing the player seems.
    Extroversion,
    /// How genuine the player seems.
    Sincerity,
    /// How curious the NPC is about the player.
    Curiosity,
    /// How much the NPC trusts the player.
    Trust,
    /// How much the NPC respects the player.
    Respect,
    /// How fond the NPC is of the player.
    Affection,
    /// How irritated the NPC is with the player.
    Annoyance,
    /// How much the NPC looks up to the player.
    Admiration,
    /// Romantic interest.
    RomanticInterest,
    /// How well their senses of humour match.
    HumorCompatibility,
}

impl Trait {
    /// Every trait, in canonical order.
    pub const ALL: [Trait; 11] = [
        Self::Friendliness,
        Self::Extroversion,
        Self::Sincerity,
        Self::Curiosity,
        Self::Trust,
        Self::Respect,
        Self::Affection,
        Self::Annoyance,
        Self::Admiration,
        Self::RomanticInterest,
        Self::HumorCompatibility,
    ];

    /// Snake-case field name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Friendliness => "friendliness",
            Self::Extroversion => "extroversion",
            Self::Sincerity => "sincerity",
            Self::Curiosity => "curiosity",
            Self::Trust => "trust",
            Self::Respect => "respect",
            Self::Affection => "affection",
            Self::Annoyance => "annoyance",
            Self::Admiration => "admiration",
            Self::RomanticInterest => "romantic_interest",
            Self::HumorCompatibility => "humor_compatibility",
        }
    }

    /// Human-readable label used in insight narratives.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Friendliness => "Friendliness",
            Self::Extroversion => "Perceived extroversion",
            Self::Sincerity => "Perceived sincerity",
            Self::Curiosity => "Curiosity about them",
            Self::Trust => "Trust",
            Self::Respect => "Respect",
            Self::Affection => "Affection",
            Self::Annoyance => "Annoyance",
            Self::Admiration => "Admiration",
            Self::RomanticInterest => "Romantic interest",
            Self::HumorCompatibility => "Humor compatibility",
        }
    }
}

impl fmt::Display for Trait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trait {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown trait: '{s}'"))
    }
}

/// Clamp a raw trait value into \[0, 10\]. Non-finite values become the midpoint.
#[must_use]
pub fn clamp_trait(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, MAX_TRAIT)
    } else {
        MAX_TRAIT / 2.0
    }
}

// ---------------------------------------------------------------------------
// Archetype (seed values)
// ---------------------------------------------------------------------------

/// First-impression values an NPC starts every new relationship with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct Archetype {
    pub summary: String,
    pub friendliness: f32,
    pub extroversion: f32,
    pub sincerity: f32,
    pub curiosity: f32,
    pub trust: f32,
    pub respect: f32,
    pub affection: f32,
    pub annoyance: f32,
    pub admiration: f32,
    pub romantic_interest: f32,
    pub humor_compatibility: f32,
}

impl Archetype {
    /// Fallback for NPCs the catalog does not describe.
    #[must_use]
    pub fn generic() -> Self {
        Self {
            summary: "A newcomer to town. I'm curious to see what kind of person they really are."
                .to_string(),
            friendliness: 4.5,
            extroversion: 4.5,
            sincerity: 5.0,
            curiosity: 5.5,
            trust: 4.0,
            respect: 4.5,
            affection: 3.0,
            annoyance: 2.5,
            admiration: 3.5,
            romantic_interest: 0.0,
            humor_compatibility: 4.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// How an NPC perceives one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalityProfile {
    /// The relationship this profile belongs to.
    pub key: RelationshipKey,
    /// Short first-person perception, written by the NPC.
    pub summary: String,
    /// Friendliness, 0–10.
    pub friendliness: f32,
    /// Extroversion, 0–10.
    pub extroversion: f32,
    /// Sincerity, 0–10.
    pub sincerity: f32,
    /// Curiosity, 0–10.
    pub curiosity: f32,
    /// Trust, 0–10.
    pub trust: f32,
    /// Respect, 0–10.
    pub respect: f32,
    /// Affection, 0–10.
    pub affection: f32,
    /// Annoyance, 0–10.
    pub annoyance: f32,
    /// Admiration, 0–10.
    pub admiration: f32,
    /// Romantic interest, 0–10.
    pub romantic_interest: f32,
    /// Humor compatibility, 0–10.
    pub humor_compatibility: f32,
    /// When this profile was last written.
    pub updated_at: DateTime<Utc>,
}

impl PersonalityProfile {
    /// Seed a profile from an archetype, clamping every value.
    #[must_use]
    pub fn from_archetype(key: RelationshipKey, archetype: &Archetype) -> Self {
        let mut profile = Self {
            key,
            summary: archetype.summary.clone(),
            friendliness: archetype.friendliness,
            extroversion: archetype.extroversion,
            sincerity: archetype.sincerity,
            curiosity: archetype.curiosity,
            trust: archetype.trust,
            respect: archetype.respect,
            affection: archetype.affection,
            annoyance: archetype.annoyance,
            admiration: archetype.admiration,
            romantic_interest: archetype.romantic_interest,
            humor_compatibility: archetype.humor_compatibility,
            updated_at: Utc::now(),
        };
        for t in Trait::ALL {
            profile.set(t, profile.get(t));
        }
        profile
    }

    /// Read one trait.
    #[must_use]
    pub fn get(&self, t: Trait) -> f32 {
        match t {
            Trait::Friendliness => self.friendliness,
            Trait::Extroversion => self.extroversion,
            Trait::Sincerity => self.sincerity,
            Trait::Curiosity => self.curiosity,
            Trait::Trust => self.trust,
            Trait::Respect => self.respect,
            Trait::Affection => self.affection,
            Trait::Annoyance => self.annoyance,
            Trait::Admiration => self.admiration,
            Trait::RomanticInterest => self.romantic_interest,
            Trait::HumorCompatibility => self.humor_compatibility,
        }
    }

    /// Write one trait, clamped to \[0, 10\].
    pub fn set(&mut self, t: Trait, value: f32) {
        let v = clamp_trait(value);
        let slot = match t {
            Trait::Friendliness => &mut self.friendliness,
            Trait::Extroversion => &mut self.extroversion,
            Trait::Sincerity => &mut self.sincerity,
            Trait::Curiosity => &mut self.curiosity,
            Trait::Trust => &mut self.trust,
            Trait::Respect => &mut self.respect,
            Trait::Affection => &mut self.affection,
            Trait::Annoyance => &mut self.annoyance,
            Trait::Admiration => &mut self.admiration,
            Trait::RomanticInterest => &mut self.romantic_interest,
            Trait::HumorCompatibility => &mut self.humor_compatibility,
        };
        *slot = v;
    }

    /// Apply an update in place: provided traits are replaced (clamped),
    /// the summary is replaced wholesale when present.
    pub fn apply(&mut self, update: &PersonalityUpdate) {
        if let Some(summary) = &update.summary {
            self.summary = truncate_words(summary.trim(), SUMMARY_WORD_LIMIT);
        }
        for &(t, value) in &update.traits {
            self.set(t, value);
        }
        self.updated_at = Utc::now();
    }

    /// Trait-by-trait differences between `self` (old) and `other` (new).
    #[must_use]
    pub fn diff(&self, other: &Self) -> Vec<TraitChange> {
        Trait::ALL
            .iter()
            .filter_map(|&t| {
                let (old, new) = (self.get(t), other.get(t));
                ((old - new).abs() > f32::EPSILON).then_some(TraitChange {
                    name: t,
                    old,
                    new,
                })
            })
            .collect()
    }
}

fn truncate_words(text: &str, limit: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= limit {
        text.to_string()
    } else {
        words[..limit].join(" ")
    }
}

/// A partial replacement of a profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonalityUpdate {
    /// New summary, replacing the old one wholesale.
    pub summary: Option<String>,
    /// New trait values. Traits not listed keep their current value.
    pub traits: Vec<(Trait, f32)>,
}

impl PersonalityUpdate {
    /// Builder-style: replace the summary.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Builder-style: set one trait.
    #[must_use]
    pub fn with_trait(mut self, t: Trait, value: f32) -> Self {
        self.traits.push((t, value));
        self
    }

    /// Whether the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.traits.is_empty()
    }
}

/// One trait's before/after values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraitChange {
    /// The trait that moved.
    #[serde(rename = "trait")]
    pub name: Trait,
    /// Value before the update.
    pub old: f32,
    /// Value after the update.
    pub new: f32,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Loads, seeds and updates personality profiles.
pub struct PersonalityStore {
    store: Arc<dyn RelationshipStore>,
    catalog: Arc<NpcCatalog>,
    events: Arc<dyn EventSink>,
}

impl PersonalityStore {
    /// Create the store over persistence, the NPC catalog and an event sink.
    #[must_use]
    pub fn new(
        store: Arc<dyn RelationshipStore>,
        catalog: Arc<NpcCatalog>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            catalog,
            events,
        }
    }

    /// The profile for `key`, seeded from `npc_name`'s archetype on first access.
    ///
    /// When the store cannot be read the seeded profile is returned unsaved.
    pub async fn get_or_create(&self, key: RelationshipKey, npc_name: &str) -> PersonalityProfile {
        match self.store.load_personality(key).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                let profile = PersonalityProfile::from_archetype(key, self.catalog.archetype(npc_name));
                match self.store.save_personality(&profile).await {
                    Ok(()) => info!(%key, npc = npc_name, "Seeded personality profile from archetype"),
                    Err(e) => warn!(%key, error = %e, "Could not persist seeded personality profile"),
                }
                profile
            }
            Err(e) => {
                warn!(%key, npc = npc_name, error = %e, "Personality store unavailable, using archetype");
                PersonalityProfile::from_archetype(key, self.catalog.archetype(npc_name))
            }
        }
    }

    /// Replace the provided fields of the profile for `key` and persist it.
    ///
    /// Emits [`RelationshipEvent::PersonalityChanged`] when anything moved.
    ///
    /// # Errors
    ///
    /// Returns the store error if the new profile could not be written.
    pub async fn apply_update(
        &self,
        key: RelationshipKey,
        npc_name: &str,
        update: &PersonalityUpdate,
    ) -> Result<PersonalityProfile> {
        let old = self.get_or_create(key, npc_name).await;
        if update.is_empty() {
            debug!(%key, "Empty personality update, nothing to do");
            return Ok(old);
        }

        let mut new = old.clone();
        new.apply(update);
        self.store.save_personality(&new).await?;

        let changes = old.diff(&new);
        let summary_changed = old.summary != new.summary;
        info!(%key, changed_traits = changes.len(), summary_changed, "Personality profile updated");

        if !changes.is_empty() || summary_changed {
            notify(
                self.events.as_ref(),
                &RelationshipEvent::PersonalityChanged {
                    key,
                    changes,
                    summary_changed,
                },
            );
        }
        Ok(new)
    }

    /// Administrative reset: forget the stored profile.
    ///
    /// # Errors
    ///
    /// Returns the store error if the delete failed.
    pub async fn reset(&self, key: RelationshipKey) -> Result<bool> {
        self.store.delete_personality(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::store::SqliteStore;
    use crate::types::{NpcId, PlayerId};

    fn key() -> RelationshipKey {
        RelationshipKey::new(PlayerId::new(), NpcId::new())
    }

    fn service() -> (PersonalityStore, Arc<RecordingSink>) {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let sink = Arc::new(RecordingSink::new());
        let catalog = Arc::new(NpcCatalog::builtin().expect("catalog"));
        (PersonalityStore::new(store, catalog, sink.clone()), sink)
    }

    #[test]
    fn trait_names_round_trip() {
        for t in Trait::ALL {
            assert_eq!(t.as_str().parse::<Trait>(), Ok(t));
        }
    }

    #[test]
    fn apply_clamps_and_keeps_unlisted_traits() {
        let mut profile = PersonalityProfile::from_archetype(key(), &Archetype::generic());
        let before_trust = profile.trust;
        profile.apply(
            &PersonalityUpdate::default()
                .with_trait(Trait::Friendliness, 14.0)
                .with_trait(Trait::Annoyance, -3.0)
                .with_trait(Trait::Curiosity, f32::NAN),
        );
        assert!((profile.friendliness - 10.0).abs() < f32::EPSILON);
        assert!(profile.annoyance.abs() < f32::EPSILON);
        assert!((profile.curiosity - 5.0).abs() < f32::EPSILON);
        assert!((profile.trust - before_trust).abs() < f32::EPSILON);
    }

    #[test]
    fn long_summaries_are_truncated() {
        let mut profile = PersonalityProfile::from_archetype(key(), &Archetype::generic());
        let long = "word ".repeat(100);
        profile.apply(&PersonalityUpdate::default().with_summary(long));
        assert_eq!(profile.summary.split_whitespace().count(), SUMMARY_WORD_LIMIT);
    }

    #[test]
    fn diff_lists_only_moved_traits() {
        let old = PersonalityProfile::from_archetype(key(), &Archetype::generic());
        let mut new = old.clone();
        new.set(Trait::Trust, 9.0);
        let changes = old.diff(&new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].name, Trait::Trust);
    }

    #[tokio::test]
    async fn seeds_from_named_archetype_or_generic() {
        let (svc, _) = service();
        let abigail = svc.get_or_create(key(), "Abigail").await;
        assert!(abigail.summary.contains("adventure"));
        assert!((abigail.curiosity - 7.5).abs() < f32::EPSILON);

        let stranger = svc.get_or_create(key(), "Morris").await;
        assert_eq!(stranger.summary, Archetype::generic().summary);
    }

    #[tokio::test]
    async fn apply_update_persists_and_emits() {
        let (svc, sink) = service();
        let k = key();
        svc.apply_update(
            k,
            "Abigail",
            &PersonalityUpdate::default()
                .with_summary("They love gems as much as I do.")
                .with_trait(Trait::Affection, 6.5),
        )
        .await
        .expect("update");

        let reloaded = svc.get_or_create(k, "Abigail").await;
        assert_eq!(reloaded.summary, "They love gems as much as I do.");
        assert!((reloaded.affection - 6.5).abs() < f32::EPSILON);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            RelationshipEvent::PersonalityChanged { summary_changed: true, changes, .. } if changes.len() == 1
        ));

        assert!(svc.reset(k).await.expect("reset"));
        let reseeded = svc.get_or_create(k, "Abigail").await;
        assert!(reseeded.summary.contains("adventure"));
    }
}

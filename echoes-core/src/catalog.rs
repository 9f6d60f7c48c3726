//! Static NPC catalog: personality archetypes, gift tables, birthdays and
//! per-NPC point multipliers.
//!
//! The catalog is a declarative TOML document. A default copy is compiled into
//! the crate; hosts can point `general.npc_catalog_path` at their own file.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{EchoesError, Result};
use crate::personality::Archetype;
use crate::scoring::GiftTier;

const BUILTIN_CATALOG: &str = include_str!("../data/npcs.toml");

/// Items grouped by how much they are liked.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GiftTable {
    /// Favourite gifts.
    #[serde(default)]
    pub loved: Vec<String>,
    /// Appreciated gifts.
    #[serde(default)]
    pub liked: Vec<String>,
    /// Explicitly neutral gifts.
    #[serde(default)]
    pub neutral: Vec<String>,
    /// Unwelcome gifts.
    #[serde(default)]
    pub disliked: Vec<String>,
    /// Insulting gifts.
    #[serde(default)]
    pub hated: Vec<String>,
}

impl GiftTable {
    /// Tier of `item` in this table, compared case-insensitively.
    #[must_use]
    pub fn tier_of(&self, item: &str) -> Option<GiftTier> {
        let item = item.trim();
        let hit = |list: &[String]| list.iter().any(|i| i.eq_ignore_ascii_case(item));
        [
            (GiftTier::Loved, &self.loved),
            (GiftTier::Liked, &self.liked),
            (GiftTier::Neutral, &self.neutral),
            (GiftTier::Disliked, &self.disliked),
            (GiftTier::Hated, &self.hated),
        ]
        .into_iter()
        .find_map(|(tier, list)| hit(list).then_some(tier))
    }
}

/// Everything the catalog knows about one NPC.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NpcEntry {
    /// Birthday as "Season Day", e.g. "Fall 13".
    #[serde(default)]
    pub birthday: Option<String>,
    /// Fixed multiplier applied to every point award for this NPC.
    #[serde(default)]
    pub multiplier: Option<f32>,
    /// First-impression personality values.
    #[serde(default)]
    pub archetype: Option<Archetype>,
    /// NPC-specific gift preferences.
    #[serde(default)]
    pub gifts: Option<GiftTable>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    generic: Option<Archetype>,
    #[serde(default)]
    universal: GiftTable,
    #[serde(default)]
    npcs: HashMap<String, NpcEntry>,
}

/// Lookup tables keyed by NPC name (case-insensitive).
#[derive(Debug, Clone)]
pub struct NpcCatalog {
    generic: Archetype,
    universal: GiftTable,
    npcs: HashMap<String, NpcEntry>,
}

impl NpcCatalog {
    /// The catalog compiled into the crate.
    ///
    /// # Errors
    ///
    /// Returns [`EchoesError::Config`] if the embedded document fails to parse.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_CATALOG)
    }

    /// Parse a catalog from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`EchoesError::Config`] on malformed TOML or a non-positive multiplier.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(toml_str)
            .map_err(|e| EchoesError::Config(format!("npc catalog: {e}")))?;

        let mut npcs = HashMap::with_capacity(file.npcs.len());
        for (name, entry) in file.npcs {
            if let Some(m) = entry.multiplier {
                if !m.is_finite() || m <= 0.0 {
                    return Err(EchoesError::Config(format!(
                        "npc catalog: multiplier for {name} must be positive, got {m}"
                    )));
                }
            }
            npcs.insert(name.to_lowercase(), entry);
        }

        Ok(Self {
            generic: file.generic.unwrap_or_else(Archetype::generic),
            universal: file.universal,
            npcs,
        })
    }

    /// Load a catalog file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_toml(&content)?;
        info!(path = %path.display(), npcs = catalog.len(), "Loaded NPC catalog");
        Ok(catalog)
    }

    /// Load from `path` when given, otherwise the built-in catalog.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::from_file`] / [`Self::builtin`] failures.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(Path::new(p)),
            None => Self::builtin(),
        }
    }

    fn entry(&self, npc: &str) -> Option<&NpcEntry> {
        self.npcs.get(&npc.trim().to_lowercase())
    }

    /// Archetype for `npc`, or the generic fallback row.
    #[must_use]
    pub fn archetype(&self, npc: &str) -> &Archetype {
        self.entry(npc)
            .and_then(|e| e.archetype.as_ref())
            .unwrap_or(&self.generic)
    }

    /// Static gift tier: the NPC's own table first, then the universal sets.
    ///
    /// `None` means the tables do not know the item; callers decide how to
    /// classify it.
    #[must_use]
    pub fn gift_preference(&self, npc: &str, item: &str) -> Option<GiftTier> {
        self.entry(npc)
            .and_then(|e| e.gifts.as_ref())
            .and_then(|g| g.tier_of(item))
            .or_else(|| self.universal.tier_of(item))
    }

    /// Fixed point multiplier for `npc` (1.0 when none is configured).
    #[must_use]
    pub fn npc_multiplier(&self, npc: &str) -> f32 {
        self.entry(npc).and_then(|e| e.multiplier).unwrap_or(1.0)
    }

    /// Birthday of `npc` as "Season Day".
    #[must_use]
    pub fn birthday(&self, npc: &str) -> Option<&str> {
        self.entry(npc).and_then(|e| e.birthday.as_deref())
    }

    /// Whether `season` / `day` is `npc`'s birthday.
    #[must_use]
    pub fn is_birthday(&self, npc: &str, season: &str, day: u32) -> bool {
        self.birthday(npc).is_some_and(|b| {
            let mut parts = b.split_whitespace();
            matches!(
                (parts.next(), parts.next().and_then(|d| d.parse::<u32>().ok())),
                (Some(s), Some(d)) if s.eq_ignore_ascii_case(season.trim()) && d == day
            )
        })
    }

    /// The NPC's loved gifts followed by the universal loves.
    #[must_use]
    pub fn loved_gifts(&self, npc: &str) -> Vec<&str> {
        self.entry(npc)
            .and_then(|e| e.gifts.as_ref())
            .map(|g| g.loved.iter().map(String::as_str).collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
            .chain(self.universal.loved.iter().map(String::as_str))
            .collect()
    }

    /// Number of NPCs described.
    #[must_use]
    pub fn len(&self) -> usize {
        self.npcs.len()
    }

    /// Whether the catalog describes no NPCs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.npcs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> NpcCatalog {
        NpcCatalog::builtin().expect("builtin catalog parses")
    }

    #[test]
    fn builtin_catalog_has_the_villagers() {
        let catalog = builtin();
        assert!(catalog.len() >= 30);
        assert!(catalog.archetype("Abigail").summary.contains("adventure"));
        assert!((catalog.archetype("abigail").friendliness - 6.0).abs() < f32::EPSILON);
        assert_eq!(catalog.archetype("Nobody").summary, Archetype::generic().summary);
    }

    #[test]
    fn npc_table_wins_over_universal() {
        let catalog = builtin();
        assert_eq!(catalog.gift_preference("Abigail", "Amethyst"), Some(GiftTier::Loved));
        assert_eq!(catalog.gift_preference("Abigail", "holly"), Some(GiftTier::Hated));
        assert_eq!(catalog.gift_preference("Abigail", "Prismatic Shard"), Some(GiftTier::Loved));
        assert_eq!(catalog.gift_preference("Abigail", "Rusty Spoon"), None);
    }

    #[test]
    fn universal_sets_apply_to_unknown_npcs() {
        let catalog = builtin();
        assert_eq!(catalog.gift_preference("Morris", "Prismatic Shard"), Some(GiftTier::Loved));
        assert_eq!(catalog.gift_preference("Morris", "Joja Cola"), Some(GiftTier::Hated));
        assert_eq!(catalog.gift_preference("Morris", "Sap"), Some(GiftTier::Neutral));
    }

    #[test]
    fn multipliers_and_birthdays() {
        let catalog = builtin();
        assert!((catalog.npc_multiplier("Shane") - 0.75).abs() < f32::EPSILON);
        assert!((catalog.npc_multiplier("Abigail") - 1.0).abs() < f32::EPSILON);
        assert_eq!(catalog.birthday("Abigail"), Some("Fall 13"));
        assert!(catalog.is_birthday("Abigail", "fall", 13));
        assert!(!catalog.is_birthday("Abigail", "fall", 14));
        assert!(!catalog.is_birthday("Nobody", "fall", 13));
    }

    #[test]
    fn custom_catalog_falls_back_to_generic() {
        let catalog = NpcCatalog::from_toml(
            r#"
            [npcs.Bouncer]
            multiplier = 0.5
            [npcs.Bouncer.gifts]
            loved = ["Cheese"]
            "#,
        )
        .expect("parse");
        assert_eq!(catalog.gift_preference("Bouncer", "Cheese"), Some(GiftTier::Loved));
        assert_eq!(catalog.archetype("Bouncer").summary, Archetype::generic().summary);
        assert!(NpcCatalog::from_toml("[npcs.X]\nmultiplier = -1.0").is_err());
    }
}

//! Entity Registry: resolves player and NPC names to stable ids.
//!
//! Entities are created lazily the first time they are seen. Resolution never
//! fails loudly: a store error is logged and reported as `None`, and the
//! caller continues in degraded mode without memory.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::store::RelationshipStore;
use crate::types::{NpcId, PlayerId};

/// A stored player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Stable id.
    pub id: PlayerId,
    /// Unique display name.
    pub name: String,
}

/// A stored NPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcRecord {
    /// Stable id.
    pub id: NpcId,
    /// Unique name.
    pub name: String,
    /// Last known map location.
    pub location: Option<String>,
}

/// Name → id resolution with an LRU cache in front of the store.
pub struct EntityRegistry {
    store: Arc<dyn RelationshipStore>,
    players: Mutex<LruCache<String, PlayerId>>,
    npcs: Mutex<LruCache<String, NpcRecord>>,
}

impl EntityRegistry {
    /// Create a registry caching up to `cache_size` names per entity kind.
    #[must_use]
    pub fn new(store: Arc<dyn RelationshipStore>, cache_size: usize) -> Self {
        let cap = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            players: Mutex::new(LruCache::new(cap)),
            npcs: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Resolve a player name, creating the player on first sighting.
    ///
    /// Returns `None` when the store is unavailable.
    pub async fn get_or_create_player(&self, name: &str) -> Option<PlayerId> {
        if let Some(id) = self.players.lock().get(name).copied() {
            return Some(id);
        }
        match self.resolve_player(name).await {
            Ok(id) => {
                self.players.lock().put(name.to_string(), id);
                Some(id)
            }
            Err(e) => {
                error!(player = name, error = %e, "Player resolution failed");
                None
            }
        }
    }

    async fn resolve_player(&self, name: &str) -> Result<PlayerId> {
        if let Some(existing) = self.store.find_player(name).await? {
            return Ok(existing.id);
        }
        let record = PlayerRecord {
            id: PlayerId::new(),
            name: name.to_string(),
        };
        self.store.insert_player(&record).await?;
        info!(player = name, id = %record.id, "Registered new player");
        Ok(record.id)
    }

    /// Resolve an NPC name, creating it on first sighting.
    ///
    /// A supplied `location` that differs from the stored one is written back
    /// on a best-effort basis. Returns `None` when the store is unavailable.
    pub async fn get_or_create_npc(&self, name: &str, location: Option<&str>) -> Option<NpcId> {
        let cached = self.npcs.lock().get(name).cloned();
        let record = match cached {
            Some(record) => record,
            None => match self.resolve_npc(name, location).await {
                Ok(record) => record,
                Err(e) => {
                    error!(npc = name, error = %e, "NPC resolution failed");
                    return None;
                }
            },
        };

        let record = self.refresh_location(record, location).await;
        let id = record.id;
        self.npcs.lock().put(name.to_string(), record);
        Some(id)
    }

    async fn resolve_npc(&self, name: &str, location: Option<&str>) -> Result<NpcRecord> {
        if let Some(existing) = self.store.find_npc(name).await? {
            return Ok(existing);
        }
        let record = NpcRecord {
            id: NpcId::new(),
            name: name.to_string(),
            location: location.map(str::to_string),
        };
        self.store.insert_npc(&record).await?;
        info!(npc = name, id = %record.id, "Registered new NPC");
        Ok(record)
    }

    async fn refresh_location(&self, mut record: NpcRecord, location: Option<&str>) -> NpcRecord {
        let Some(location) = location.filter(|l| !l.trim().is_empty()) else {
            return record;
        };
        if record.location.as_deref() == Some(location) {
            return record;
        }
        match self.store.update_npc_location(record.id, location).await {
            Ok(()) => {
                debug!(npc = %record.name, location, "NPC location updated");
                record.location = Some(location.to_string());
            }
            Err(e) => warn!(npc = %record.name, error = %e, "Could not update NPC location"),
        }
        record
    }

    /// Look up a player by id.
    ///
    /// # Errors
    ///
    /// Returns the store error on failure.
    pub async fn player(&self, id: PlayerId) -> Result<Option<PlayerRecord>> {
        self.store.get_player(id).await
    }

    /// Look up an NPC by id.
    ///
    /// # Errors
    ///
    /// Returns the store error on failure.
    pub async fn npc(&self, id: NpcId) -> Result<Option<NpcRecord>> {
        self.store.get_npc(id).await
    }
}

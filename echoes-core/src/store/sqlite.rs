//! SQLite implementation of [`RelationshipStore`].
//!
//! One database file holds every table. Timestamps are stored as UTC
//! microseconds, embeddings as bincode-encoded `Vec<f32>` BLOBs (NULL when a
//! turn has no vector). SQLite has no vector index here, so distance search
//! loads the relationship's embedded turns and ranks them in process.
//!
//! The connection sits behind a `parking_lot::Mutex`; every call holds the
//! lock only for the duration of one statement batch.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, Row, params};
use tracing::{debug, info};
use uuid::Uuid;

use super::RelationshipStore;
use crate::config::PersistenceConfig;
use crate::conversation::{Conversation, ConversationFilter, DialogueEntry};
use crate::emotion::{EmotionalState, Mood};
use crate::entity::{NpcRecord, PlayerRecord};
use crate::error::Result;
use crate::memory::{EpisodicMemory, LearnedPreference};
use crate::personality::PersonalityProfile;
use crate::types::{
    ContextSnapshot, ConversationId, DialogueId, Embedding, MemoryId, NpcId, PlayerId,
    RelationshipKey, Speaker,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS players (
    id   TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS npcs (
    id       TEXT PRIMARY KEY,
    name     TEXT NOT NULL UNIQUE,
    location TEXT
);
CREATE TABLE IF NOT EXISTS conversations (
    id                TEXT PRIMARY KEY,
    player_id         TEXT NOT NULL,
    npc_id            TEXT NOT NULL,
    start_time        INTEGER NOT NULL,
    end_time          INTEGER,
    season            TEXT,
    day_of_month      INTEGER,
    day_of_week       TEXT,
    time_of_day       INTEGER,
    year              INTEGER,
    weather           TEXT,
    player_location   TEXT,
    friendship_hearts INTEGER
);
CREATE INDEX IF NOT EXISTS idx_conversations_pair
    ON conversations (player_id, npc_id, start_time);
CREATE TABLE IF NOT EXISTS dialogue_entries (
    id              TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    speaker         TEXT NOT NULL,
    message         TEXT NOT NULL,
    timestamp       INTEGER NOT NULL,
    embedding       BLOB
);
CREATE INDEX IF NOT EXISTS idx_dialogue_conversation
    ON dialogue_entries (conversation_id, timestamp);
CREATE TABLE IF NOT EXISTS emotional_states (
    player_id               TEXT NOT NULL,
    npc_id                  TEXT NOT NULL,
    current_mood            TEXT NOT NULL,
    mood_intensity          REAL NOT NULL,
    recent_joy              REAL NOT NULL,
    recent_sadness          REAL NOT NULL,
    recent_anger            REAL NOT NULL,
    recent_anxiety          REAL NOT NULL,
    recent_excitement       REAL NOT NULL,
    last_interaction_effect TEXT NOT NULL,
    external_factors        TEXT NOT NULL,
    last_updated            INTEGER NOT NULL,
    PRIMARY KEY (player_id, npc_id)
);
CREATE TABLE IF NOT EXISTS personality_profiles (
    player_id           TEXT NOT NULL,
    npc_id              TEXT NOT NULL,
    summary             TEXT NOT NULL,
    friendliness        REAL NOT NULL,
    extroversion        REAL NOT NULL,
    sincerity           REAL NOT NULL,
    curiosity           REAL NOT NULL,
    trust               REAL NOT NULL,
    respect             REAL NOT NULL,
    affection           REAL NOT NULL,
    annoyance           REAL NOT NULL,
    admiration          REAL NOT NULL,
    romantic_interest   REAL NOT NULL,
    humor_compatibility REAL NOT NULL,
    updated_at          INTEGER NOT NULL,
    PRIMARY KEY (player_id, npc_id)
);
CREATE TABLE IF NOT EXISTS episodic_memories (
    id               TEXT PRIMARY KEY,
    player_id        TEXT NOT NULL,
    npc_id           TEXT NOT NULL,
    conversation_id  TEXT NOT NULL,
    title            TEXT NOT NULL,
    description      TEXT NOT NULL,
    emotional_impact REAL NOT NULL,
    importance       REAL NOT NULL,
    memory_type      TEXT NOT NULL,
    embedding        BLOB,
    created_at       INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_episodic_pair
    ON episodic_memories (player_id, npc_id, created_at);
CREATE TABLE IF NOT EXISTS learned_preferences (
    player_id        TEXT NOT NULL,
    npc_id           TEXT NOT NULL,
    category         TEXT NOT NULL,
    item             TEXT NOT NULL,
    preference_level REAL NOT NULL,
    evidence         TEXT NOT NULL,
    updated_at       INTEGER NOT NULL,
    PRIMARY KEY (player_id, npc_id, category, item)
);
";

const CONVERSATION_COLUMNS: &str = "id, player_id, npc_id, start_time, end_time, season, \
     day_of_month, day_of_week, time_of_day, year, weather, player_location, friendship_hearts";

const DIALOGUE_COLUMNS: &str =
    "de.id, de.conversation_id, de.speaker, de.message, de.timestamp, de.embedding";

// ---------------------------------------------------------------------------
// Column helpers
// ---------------------------------------------------------------------------

fn micros(t: DateTime<Utc>) -> i64 {
    t.timestamp_micros()
}

fn from_micros(v: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(v).unwrap_or_default()
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn encode_embedding(embedding: &Embedding) -> Result<Option<Vec<u8>>> {
    if embedding.is_empty() {
        return Ok(None);
    }
    Ok(Some(bincode::serialize(&embedding.0)?))
}

fn embedding_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Embedding> {
    let blob: Option<Vec<u8>> = row.get(idx)?;
    match blob {
        None => Ok(Embedding::empty()),
        Some(bytes) => bincode::deserialize::<Vec<f32>>(&bytes)
            .map(Embedding)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, Box::new(e))),
    }
}

fn key_params(key: RelationshipKey) -> (String, String) {
    (key.player.to_string(), key.npc.to_string())
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: ConversationId(uuid_col(row, 0)?),
        key: RelationshipKey::new(PlayerId(uuid_col(row, 1)?), NpcId(uuid_col(row, 2)?)),
        start_time: from_micros(row.get(3)?),
        end_time: row.get::<_, Option<i64>>(4)?.map(from_micros),
        context: ContextSnapshot {
            season: row.get(5)?,
            day_of_month: row.get(6)?,
            day_of_week: row.get(7)?,
            time_of_day: row.get(8)?,
            year: row.get(9)?,
            weather: row.get(10)?,
            player_location: row.get(11)?,
            friendship_hearts: row.get(12)?,
        },
    })
}

fn dialogue_from_row(row: &Row<'_>) -> rusqlite::Result<DialogueEntry> {
    Ok(DialogueEntry {
        id: DialogueId(uuid_col(row, 0)?),
        conversation: ConversationId(uuid_col(row, 1)?),
        speaker: Speaker::from(row.get::<_, String>(2)?),
        message: row.get(3)?,
        timestamp: from_micros(row.get(4)?),
        embedding: embedding_col(row, 5)?,
    })
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// SQLite-backed relationship store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) a database at `path` and ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EchoesError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "Relationship store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EchoesError::Database`] on SQLite failures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config: PersistenceConfig::default(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Open whatever `config.path` names; `":memory:"` gives an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EchoesError::Database`] on SQLite failures.
    pub fn from_config(config: &PersistenceConfig) -> Result<Self> {
        if config.path == ":memory:" {
            Self::open_in_memory()
        } else {
            Self::open(&config.path, config)
        }
    }

    // ------------------------------------------------------------------
    // Backup & maintenance
    // ------------------------------------------------------------------

    /// Copy the database to `dest_path` using SQLite's online-backup API.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EchoesError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let conn = self.conn.lock();
        let backup = rusqlite::backup::Backup::new(&conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;
        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Relationship store backup completed"
        );
        Ok(())
    }

    /// Write `<db>.bak.1`, shifting older backups up and keeping at most
    /// `backup_count` of them. No-op for in-memory stores.
    ///
    /// # Errors
    ///
    /// Returns a database or I/O error on failure.
    pub fn create_rotating_backup(&self) -> Result<()> {
        if self.db_path.as_os_str() == ":memory:" || self.config.backup_count == 0 {
            return Ok(());
        }
        let max = self.config.backup_count;
        for i in (1..max).rev() {
            let src = self.backup_path(i);
            if src.exists() {
                std::fs::rename(&src, self.backup_path(i + 1))?;
            }
        }
        let oldest = self.backup_path(max + 1);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        self.backup(self.backup_path(1))?;
        info!(max_backups = max, "Rotating backup created");
        Ok(())
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut p = self.db_path.clone();
        let ext = format!(
            "{}.bak.{n}",
            p.extension()
                .map_or(String::new(), |e| e.to_string_lossy().into_owned())
        );
        p.set_extension(ext);
        p
    }

    /// Path of the database file, or `:memory:`.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `PRAGMA integrity_check`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EchoesError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// Number of stored dialogue turns across all relationships.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EchoesError::Database`] on SQLite failures.
    pub fn dialogue_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM dialogue_entries", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    #[cfg(test)]
    pub(crate) fn break_for_tests(&self, table: &str) {
        self.conn
            .lock()
            .execute_batch(&format!("DROP TABLE {table};"))
            .expect("drop table");
    }

    #[cfg(test)]
    pub(crate) fn corrupt_embedding_for_tests(&self, message: &str) {
        self.conn
            .lock()
            .execute(
                "UPDATE dialogue_entries SET embedding = X'FF' WHERE message = ?1",
                params![message],
            )
            .expect("corrupt embedding");
    }
}

#[async_trait]
impl RelationshipStore for SqliteStore {
    async fn find_player(&self, name: &str) -> Result<Option<PlayerRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT id, name FROM players WHERE name = ?1")?;
        let found = stmt
            .query_row(params![name], |row| {
                Ok(PlayerRecord {
                    id: PlayerId(uuid_col(row, 0)?),
                    name: row.get(1)?,
                })
            })
            .optional()?;
        Ok(found)
    }

    async fn insert_player(&self, player: &PlayerRecord) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO players (id, name) VALUES (?1, ?2)",
            params![player.id.to_string(), player.name],
        )?;
        Ok(())
    }

    async fn get_player(&self, id: PlayerId) -> Result<Option<PlayerRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT id, name FROM players WHERE id = ?1")?;
        let found = stmt
            .query_row(params![id.to_string()], |row| {
                Ok(PlayerRecord {
                    id: PlayerId(uuid_col(row, 0)?),
                    name: row.get(1)?,
                })
            })
            .optional()?;
        Ok(found)
    }

    async fn find_npc(&self, name: &str) -> Result<Option<NpcRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT id, name, location FROM npcs WHERE name = ?1")?;
        let found = stmt
            .query_row(params![name], |row| {
                Ok(NpcRecord {
                    id: NpcId(uuid_col(row, 0)?),
                    name: row.get(1)?,
                    location: row.get(2)?,
                })
            })
            .optional()?;
        Ok(found)
    }

    async fn insert_npc(&self, npc: &NpcRecord) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO npcs (id, name, location) VALUES (?1, ?2, ?3)",
            params![npc.id.to_string(), npc.name, npc.location],
        )?;
        Ok(())
    }

    async fn update_npc_location(&self, id: NpcId, location: &str) -> Result<()> {
        self.conn.lock().execute(
            "UPDATE npcs SET location = ?2 WHERE id = ?1",
            params![id.to_string(), location],
        )?;
        Ok(())
    }

    async fn get_npc(&self, id: NpcId) -> Result<Option<NpcRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT id, name, location FROM npcs WHERE id = ?1")?;
        let found = stmt
            .query_row(params![id.to_string()], |row| {
                Ok(NpcRecord {
                    id: NpcId(uuid_col(row, 0)?),
                    name: row.get(1)?,
                    location: row.get(2)?,
                })
            })
            .optional()?;
        Ok(found)
    }

    async fn latest_open_conversation(
        &self,
        key: RelationshipKey,
        started_after: DateTime<Utc>,
    ) -> Result<Option<Conversation>> {
        let (player, npc) = key_params(key);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE player_id = ?1 AND npc_id = ?2 AND end_time IS NULL AND start_time >= ?3
             ORDER BY start_time DESC, rowid DESC
             LIMIT 1"
        ))?;
        let found = stmt
            .query_row(params![player, npc, micros(started_after)], conversation_from_row)
            .optional()?;
        Ok(found)
    }

    async fn insert_conversation(&self, c: &Conversation) -> Result<()> {
        let (player, npc) = key_params(c.key);
        self.conn.lock().execute(
            &format!(
                "INSERT INTO conversations ({CONVERSATION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ),
            params![
                c.id.to_string(),
                player,
                npc,
                micros(c.start_time),
                c.end_time.map(micros),
                c.context.season,
                c.context.day_of_month,
                c.context.day_of_week,
                c.context.time_of_day,
                c.context.year,
                c.context.weather,
                c.context.player_location,
                c.context.friendship_hearts,
            ],
        )?;
        Ok(())
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<Option<Conversation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"
        ))?;
        let found = stmt
            .query_row(params![id.to_string()], conversation_from_row)
            .optional()?;
        Ok(found)
    }

    async fn close_conversation(&self, id: ConversationId, end: DateTime<Utc>) -> Result<bool> {
        let updated = self.conn.lock().execute(
            "UPDATE conversations SET end_time = ?2 WHERE id = ?1 AND end_time IS NULL",
            params![id.to_string(), micros(end)],
        )?;
        Ok(updated > 0)
    }

    async fn completed_conversations(
        &self,
        key: RelationshipKey,
        filter: &ConversationFilter,
    ) -> Result<Vec<Conversation>> {
        let (player, npc) = key_params(key);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE player_id = ?1 AND npc_id = ?2 AND end_time IS NOT NULL
               AND (?3 IS NULL OR player_location = ?3)
               AND (?4 IS NULL OR lower(season) = lower(?4))
             ORDER BY start_time DESC, rowid DESC
             LIMIT ?5"
        ))?;
        let rows = stmt.query_map(
            params![
                player,
                npc,
                filter.location,
                filter.season,
                limit_param(filter.limit)
            ],
            conversation_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn insert_dialogue(&self, entry: &DialogueEntry) -> Result<()> {
        let blob = encode_embedding(&entry.embedding)?;
        self.conn.lock().execute(
            "INSERT INTO dialogue_entries (id, conversation_id, speaker, message, timestamp, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.id.to_string(),
                entry.conversation.to_string(),
                entry.speaker.as_str(),
                entry.message,
                micros(entry.timestamp),
                blob,
            ],
        )?;
        Ok(())
    }

    async fn dialogue_for_conversation(&self, id: ConversationId) -> Result<Vec<DialogueEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {DIALOGUE_COLUMNS} FROM dialogue_entries de
             WHERE de.conversation_id = ?1
             ORDER BY de.timestamp ASC, de.rowid ASC"
        ))?;
        let rows = stmt.query_map(params![id.to_string()], dialogue_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn nearest_dialogue(
        &self,
        key: RelationshipKey,
        query: &Embedding,
        limit: usize,
    ) -> Result<Vec<(DialogueEntry, f32)>> {
        if limit == 0 || query.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let (player, npc) = key_params(key);
        let entries = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {DIALOGUE_COLUMNS} FROM dialogue_entries de
                 JOIN conversations c ON de.conversation_id = c.id
                 WHERE c.player_id = ?1 AND c.npc_id = ?2 AND de.embedding IS NOT NULL"
            ))?;
            let rows = stmt.query_map(params![player, npc], dialogue_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let scanned = entries.len();
        let mut ranked: Vec<(DialogueEntry, f32)> = entries
            .into_iter()
            .filter_map(|entry| {
                let d = query.l2_distance(&entry.embedding)?;
                Some((entry, d))
            })
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.truncate(limit);

        debug!(
            %key,
            scanned,
            returned = ranked.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Vector distance search"
        );
        Ok(ranked)
    }

    async fn recent_dialogue(&self, key: RelationshipKey, limit: usize) -> Result<Vec<DialogueEntry>> {
        let (player, npc) = key_params(key);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {DIALOGUE_COLUMNS} FROM dialogue_entries de
             JOIN conversations c ON de.conversation_id = c.id
             WHERE c.player_id = ?1 AND c.npc_id = ?2
             ORDER BY de.timestamp DESC, de.rowid DESC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(params![player, npc, limit_param(limit)], dialogue_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn load_emotional_state(&self, key: RelationshipKey) -> Result<Option<EmotionalState>> {
        let (player, npc) = key_params(key);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT current_mood, mood_intensity, recent_joy, recent_sadness, recent_anger,
                    recent_anxiety, recent_excitement, last_interaction_effect,
                    external_factors, last_updated
             FROM emotional_states WHERE player_id = ?1 AND npc_id = ?2",
        )?;
        let found = stmt
            .query_row(params![player, npc], |row| {
                let mood_label: String = row.get(0)?;
                let current_mood = mood_label.parse::<Mood>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, e.into())
                })?;
                Ok(EmotionalState {
                    key,
                    current_mood,
                    mood_intensity: row.get(1)?,
                    recent_joy: row.get(2)?,
                    recent_sadness: row.get(3)?,
                    recent_anger: row.get(4)?,
                    recent_anxiety: row.get(5)?,
                    recent_excitement: row.get(6)?,
                    last_interaction_effect: row.get(7)?,
                    external_factors: row.get(8)?,
                    last_updated: from_micros(row.get(9)?),
                })
            })
            .optional()?;
        Ok(found)
    }

    async fn save_emotional_state(&self, s: &EmotionalState) -> Result<()> {
        let (player, npc) = key_params(s.key);
        self.conn.lock().execute(
            "INSERT INTO emotional_states (player_id, npc_id, current_mood, mood_intensity,
                 recent_joy, recent_sadness, recent_anger, recent_anxiety, recent_excitement,
                 last_interaction_effect, external_factors, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(player_id, npc_id) DO UPDATE SET
                 current_mood = excluded.current_mood,
                 mood_intensity = excluded.mood_intensity,
                 recent_joy = excluded.recent_joy,
                 recent_sadness = excluded.recent_sadness,
                 recent_anger = excluded.recent_anger,
                 recent_anxiety = excluded.recent_anxiety,
                 recent_excitement = excluded.recent_excitement,
                 last_interaction_effect = excluded.last_interaction_effect,
                 external_factors = excluded.external_factors,
                 last_updated = excluded.last_updated",
            params![
                player,
                npc,
                s.current_mood.as_str(),
                s.mood_intensity,
                s.recent_joy,
                s.recent_sadness,
                s.recent_anger,
                s.recent_anxiety,
                s.recent_excitement,
                s.last_interaction_effect,
                s.external_factors,
                micros(s.last_updated),
            ],
        )?;
        Ok(())
    }

    async fn delete_emotional_state(&self, key: RelationshipKey) -> Result<bool> {
        let (player, npc) = key_params(key);
        let deleted = self.conn.lock().execute(
            "DELETE FROM emotional_states WHERE player_id = ?1 AND npc_id = ?2",
            params![player, npc],
        )?;
        Ok(deleted > 0)
    }

    async fn load_personality(&self, key: RelationshipKey) -> Result<Option<PersonalityProfile>> {
        let (player, npc) = key_params(key);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT summary, friendliness, extroversion, sincerity, curiosity, trust, respect,
                    affection, annoyance, admiration, romantic_interest, humor_compatibility,
                    updated_at
             FROM personality_profiles WHERE player_id = ?1 AND npc_id = ?2",
        )?;
        let found = stmt
            .query_row(params![player, npc], |row| {
                Ok(PersonalityProfile {
                    key,
                    summary: row.get(0)?,
                    friendliness: row.get(1)?,
                    extroversion: row.get(2)?,
                    sincerity: row.get(3)?,
                    curiosity: row.get(4)?,
                    trust: row.get(5)?,
                    respect: row.get(6)?,
                    affection: row.get(7)?,
                    annoyance: row.get(8)?,
                    admiration: row.get(9)?,
                    romantic_interest: row.get(10)?,
                    humor_compatibility: row.get(11)?,
                    updated_at: from_micros(row.get(12)?),
                })
            })
            .optional()?;
        Ok(found)
    }

    async fn save_personality(&self, p: &PersonalityProfile) -> Result<()> {
        let (player, npc) = key_params(p.key);
        self.conn.lock().execute(
            "INSERT INTO personality_profiles (player_id, npc_id, summary, friendliness,
                 extroversion, sincerity, curiosity, trust, respect, affection, annoyance,
                 admiration, romantic_interest, humor_compatibility, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(player_id, npc_id) DO UPDATE SET
                 summary = excluded.summary,
                 friendliness = excluded.friendliness,
                 extroversion = excluded.extroversion,
                 sincerity = excluded.sincerity,
                 curiosity = excluded.curiosity,
                 trust = excluded.trust,
                 respect = excluded.respect,
                 affection = excluded.affection,
                 annoyance = excluded.annoyance,
                 admiration = excluded.admiration,
                 romantic_interest = excluded.romantic_interest,
                 humor_compatibility = excluded.humor_compatibility,
                 updated_at = excluded.updated_at",
            params![
                player,
                npc,
                p.summary,
                p.friendliness,
                p.extroversion,
                p.sincerity,
                p.curiosity,
                p.trust,
                p.respect,
                p.affection,
                p.annoyance,
                p.admiration,
                p.romantic_interest,
                p.humor_compatibility,
                micros(p.updated_at),
            ],
        )?;
        Ok(())
    }

    async fn delete_personality(&self, key: RelationshipKey) -> Result<bool> {
        let (player, npc) = key_params(key);
        let deleted = self.conn.lock().execute(
            "DELETE FROM personality_profiles WHERE player_id = ?1 AND npc_id = ?2",
            params![player, npc],
        )?;
        Ok(deleted > 0)
    }

    async fn insert_episodic_memory(&self, m: &EpisodicMemory) -> Result<()> {
        let (player, npc) = key_params(m.key);
        let blob = encode_embedding(&m.embedding)?;
        self.conn.lock().execute(
            "INSERT INTO episodic_memories (id, player_id, npc_id, conversation_id, title,
                 description, emotional_impact, importance, memory_type, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                m.id.to_string(),
                player,
                npc,
                m.conversation.to_string(),
                m.title,
                m.description,
                m.emotional_impact,
                m.importance,
                m.memory_type,
                blob,
                micros(m.created_at),
            ],
        )?;
        Ok(())
    }

    async fn episodic_memories(&self, key: RelationshipKey, limit: usize) -> Result<Vec<EpisodicMemory>> {
        let (player, npc) = key_params(key);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, conversation_id, title, description, emotional_impact, importance,
                    memory_type, embedding, created_at
             FROM episodic_memories WHERE player_id = ?1 AND npc_id = ?2
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![player, npc, limit_param(limit)], |row| {
            Ok(EpisodicMemory {
                id: MemoryId(uuid_col(row, 0)?),
                key,
                conversation: ConversationId(uuid_col(row, 1)?),
                title: row.get(2)?,
                description: row.get(3)?,
                emotional_impact: row.get(4)?,
                importance: row.get(5)?,
                memory_type: row.get(6)?,
                embedding: embedding_col(row, 7)?,
                created_at: from_micros(row.get(8)?),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn upsert_preference(&self, p: &LearnedPreference) -> Result<()> {
        let (player, npc) = key_params(p.key);
        self.conn.lock().execute(
            "INSERT INTO learned_preferences (player_id, npc_id, category, item,
                 preference_level, evidence, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(player_id, npc_id, category, item) DO UPDATE SET
                 preference_level = excluded.preference_level,
                 evidence = excluded.evidence,
                 updated_at = excluded.updated_at",
            params![
                player,
                npc,
                p.category,
                p.item,
                p.preference_level,
                p.evidence,
                micros(p.updated_at),
            ],
        )?;
        Ok(())
    }

    async fn preferences(&self, key: RelationshipKey) -> Result<Vec<LearnedPreference>> {
        let (player, npc) = key_params(key);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT category, item, preference_level, evidence, updated_at
             FROM learned_preferences WHERE player_id = ?1 AND npc_id = ?2
             ORDER BY abs(preference_level) DESC, item ASC",
        )?;
        let rows = stmt.query_map(params![player, npc], |row| {
            Ok(LearnedPreference {
                key,
                category: row.get(0)?,
                item: row.get(1)?,
                preference_level: row.get(2)?,
                evidence: row.get(3)?,
                updated_at: from_micros(row.get(4)?),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

/// Extension trait that adds an `.optional()` combinator to `rusqlite::Result`.
///
/// Converts `Err(QueryReturnedNoRows)` into `Ok(None)`.
trait OptionalExt<T> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::Tone;
    use crate::personality::Archetype;

    fn key() -> RelationshipKey {
        RelationshipKey::new(PlayerId::new(), NpcId::new())
    }

    fn entry(conversation: ConversationId, message: &str, embedding: Vec<f32>) -> DialogueEntry {
        DialogueEntry {
            id: DialogueId::new(),
            conversation,
            speaker: Speaker::Npc("Abigail".into()),
            message: message.into(),
            timestamp: Utc::now(),
            embedding: Embedding(embedding),
        }
    }

    #[tokio::test]
    async fn conversation_round_trip_keeps_context() {
        let store = SqliteStore::open_in_memory().expect("open");
        let context = ContextSnapshot {
            season: Some("fall".into()),
            day_of_month: Some(13),
            time_of_day: Some(1330),
            friendship_hearts: Some(4),
            ..ContextSnapshot::default()
        };
        let c = Conversation::open(key(), context.clone(), Utc::now());
        store.insert_conversation(&c).await.expect("insert");
        let loaded = store.get_conversation(c.id).await.expect("get").expect("Some");
        assert_eq!(loaded.context, context);
        assert_eq!(loaded.key, c.key);
        assert!(loaded.is_open());
    }

    #[tokio::test]
    async fn nearest_dialogue_orders_by_distance_and_skips_mismatched_dims() {
        let store = SqliteStore::open_in_memory().expect("open");
        let k = key();
        let c = Conversation::open(k, ContextSnapshot::default(), Utc::now());
        store.insert_conversation(&c).await.expect("insert");

        store.insert_dialogue(&entry(c.id, "far", vec![1.0, 0.0])).await.expect("insert");
        store.insert_dialogue(&entry(c.id, "near", vec![0.1, 0.0])).await.expect("insert");
        store.insert_dialogue(&entry(c.id, "odd", vec![0.0, 0.0, 0.0])).await.expect("insert");
        store.insert_dialogue(&entry(c.id, "bare", vec![])).await.expect("insert");

        let hits = store
            .nearest_dialogue(k, &Embedding(vec![0.0, 0.0]), 10)
            .await
            .expect("search");
        let messages: Vec<_> = hits.iter().map(|(e, _)| e.message.as_str()).collect();
        assert_eq!(messages, ["near", "far"]);
        assert!(hits[0].1 < hits[1].1);

        let recent = store.recent_dialogue(k, 10).await.expect("recent");
        assert_eq!(recent.len(), 4);
        assert_eq!(store.dialogue_count().expect("count"), 4);
    }

    #[tokio::test]
    async fn other_relationships_are_invisible() {
        let store = SqliteStore::open_in_memory().expect("open");
        let c = Conversation::open(key(), ContextSnapshot::default(), Utc::now());
        store.insert_conversation(&c).await.expect("insert");
        store.insert_dialogue(&entry(c.id, "secret", vec![0.5])).await.expect("insert");

        let stranger = key();
        assert!(store.recent_dialogue(stranger, 5).await.expect("recent").is_empty());
        assert!(store
            .nearest_dialogue(stranger, &Embedding(vec![0.5]), 5)
            .await
            .expect("search")
            .is_empty());
    }

    #[tokio::test]
    async fn state_and_profile_upsert_and_delete() {
        let store = SqliteStore::open_in_memory().expect("open");
        let k = key();

        let mut state = EmotionalState::neutral(k);
        store.save_emotional_state(&state).await.expect("save");
        state.apply(&Tone::Friendly.fallback_update());
        store.save_emotional_state(&state).await.expect("save again");
        let loaded = store.load_emotional_state(k).await.expect("load").expect("Some");
        assert_eq!(loaded.current_mood, Mood::Happy);
        assert_eq!(loaded.last_interaction_effect, "The player was friendly and kind.");

        let profile = PersonalityProfile::from_archetype(k, &Archetype::generic());
        store.save_personality(&profile).await.expect("save");
        let loaded = store.load_personality(k).await.expect("load").expect("Some");
        assert_eq!(loaded.summary, profile.summary);

        assert!(store.delete_emotional_state(k).await.expect("delete"));
        assert!(store.delete_personality(k).await.expect("delete"));
        assert!(!store.delete_personality(k).await.expect("delete again"));
        assert!(store.load_emotional_state(k).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn names_are_unique() {
        let store = SqliteStore::open_in_memory().expect("open");
        let a = PlayerRecord {
            id: PlayerId::new(),
            name: "Ash".into(),
        };
        store.insert_player(&a).await.expect("insert");
        let dup = PlayerRecord {
            id: PlayerId::new(),
            name: "Ash".into(),
        };
        assert!(store.insert_player(&dup).await.is_err());
        assert_eq!(store.find_player("Ash").await.expect("find"), Some(a));
        assert!(store.find_player("Gary").await.expect("find").is_none());
    }

    #[test]
    fn integrity_check_passes() {
        let store = SqliteStore::open_in_memory().expect("open");
        assert!(store.integrity_check().expect("check"));
    }

    #[tokio::test]
    async fn file_store_backup_and_rotation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("valley.db");
        let config = PersistenceConfig {
            backup_count: 2,
            ..PersistenceConfig::default()
        };
        let store = SqliteStore::open(&db_path, &config).expect("open");
        store
            .insert_player(&PlayerRecord {
                id: PlayerId::new(),
                name: "Ash".into(),
            })
            .await
            .expect("insert");

        store.create_rotating_backup().expect("backup 1");
        store.create_rotating_backup().expect("backup 2");
        store.create_rotating_backup().expect("backup 3");
        assert!(dir.path().join("valley.db.bak.1").exists());
        assert!(dir.path().join("valley.db.bak.2").exists());
        assert!(!dir.path().join("valley.db.bak.3").exists());

        let restored = SqliteStore::open(dir.path().join("valley.db.bak.1"), &config).expect("open backup");
        assert!(restored.find_player("Ash").await.expect("find").is_some());
    }
}

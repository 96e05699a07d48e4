//! `MemoryEngine`: the sled-backed store behind the four memory trees
//! (entities, relations, turns, summaries) plus the staleness counters.
//!
//! Per spec §3 Ownership, the engine is shared across sessions of the same
//! user: writes serialize through a per-user exclusive lock, reads take a
//! shared lock. Locks are never held across an `.await` that leaves the
//! handler — sled itself is synchronous, so every lock scope here is a
//! plain (non-async) critical section.

use crate::entity::{Entity, EntityType};
use crate::error::{MemoryError, Result};
use crate::relation::Relation;
use crate::summary::{StalenessCounter, Summary, DEFAULT_STALENESS_MUTATION_THRESHOLD};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock as AsyncRwLock;
use voice_gateway_core::Turn;

pub struct MemoryEngine {
    entities: sled::Tree,
    relations: sled::Tree,
    turns: sled::Tree,
    summaries: sled::Tree,
    staleness: sled::Tree,
    user_locks: DashMap<String, Arc<AsyncRwLock<()>>>,
    conversation_ttl: Duration,
    staleness_threshold: u64,
    // Monotonic tiebreaker for turn ordering: wall-clock timestamps alone
    // can collide at millisecond resolution under fast sequential writes.
    turn_seq: AtomicU64,
}

impl MemoryEngine {
    pub fn open(db_path: &str, conversation_ttl: Duration) -> Result<Self> {
        let db = sled::open(db_path)?;
        Ok(Self {
            entities: db.open_tree("entities")?,
            relations: db.open_tree("relations")?,
            turns: db.open_tree("turns")?,
            summaries: db.open_tree("summaries")?,
            staleness: db.open_tree("staleness")?,
            user_locks: DashMap::new(),
            conversation_ttl,
            staleness_threshold: DEFAULT_STALENESS_MUTATION_THRESHOLD,
            turn_seq: AtomicU64::new(0),
        })
    }

    fn lock_for(&self, user_id: &str) -> Arc<AsyncRwLock<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(AsyncRwLock::new(())))
            .clone()
    }

    fn entity_key(user_id: &str, name: &str) -> Vec<u8> {
        format!("{user_id}\0{name}").into_bytes()
    }

    fn entity_prefix(user_id: &str) -> Vec<u8> {
        format!("{user_id}\0").into_bytes()
    }

    fn relation_key(user_id: &str, from: uuid::Uuid, to: uuid::Uuid, relation_type: &str) -> Vec<u8> {
        format!("{user_id}\0{from}\0{to}\0{relation_type}").into_bytes()
    }

    fn turn_key(user_id: &str, turn: &Turn, seq: u64) -> Vec<u8> {
        let millis = turn.created_at.timestamp_millis().max(0) as u64;
        format!("{user_id}\0{millis:020}\0{seq:020}\0{}", turn.turn_id).into_bytes()
    }

    /// Creates or upserts an entity by `(user_id, name)`. Upsert merges
    /// observations rather than replacing the record, preserving P5
    /// (exactly one entity per name).
    pub async fn remember(
        &self,
        user_id: &str,
        name: &str,
        entity_type: EntityType,
        observations: Vec<String>,
        is_user_edit: bool,
    ) -> Result<Entity> {
        let lock = self.lock_for(user_id);
        let _guard = lock.write().await;

        let key = Self::entity_key(user_id, name);
        let mut entity = match self.entities.get(&key)? {
            Some(bytes) => serde_json::from_slice::<Entity>(&bytes)?,
            None => Entity::new(user_id, name, entity_type),
        };
        entity.add_observations(&observations, is_user_edit);
        self.entities.insert(&key, serde_json::to_vec(&entity)?)?;
        self.record_mutation(user_id, is_user_edit)?;
        Ok(entity)
    }

    /// Appends facts to an existing entity, deduplicating. Silently no-ops
    /// (returns 0) if the entity doesn't exist, per spec §4.7.
    pub async fn add_observation(
        &self,
        user_id: &str,
        entity_name: &str,
        facts: Vec<String>,
        is_user_edit: bool,
    ) -> Result<usize> {
        let lock = self.lock_for(user_id);
        let _guard = lock.write().await;

        let key = Self::entity_key(user_id, entity_name);
        let Some(bytes) = self.entities.get(&key)? else {
            return Ok(0);
        };
        let mut entity: Entity = serde_json::from_slice(&bytes)?;
        let added = entity.add_observations(&facts, is_user_edit);
        if added > 0 {
            self.entities.insert(&key, serde_json::to_vec(&entity)?)?;
            self.record_mutation(user_id, is_user_edit)?;
        }
        Ok(added)
    }

    /// Creates a relation. No-op if either entity is missing or the triple
    /// already exists.
    pub async fn create_relation(
        &self,
        user_id: &str,
        from_name: &str,
        to_name: &str,
        relation_type: &str,
    ) -> Result<Option<Relation>> {
        let lock = self.lock_for(user_id);
        let _guard = lock.write().await;

        let Some(from) = self.find_entity_locked(user_id, from_name)? else {
            return Ok(None);
        };
        let Some(to) = self.find_entity_locked(user_id, to_name)? else {
            return Ok(None);
        };

        let key = Self::relation_key(user_id, from.id, to.id, relation_type);
        if self.relations.get(&key)?.is_some() {
            return Ok(None);
        }

        let relation = Relation::new(user_id, from.id, to.id, relation_type);
        self.relations.insert(&key, serde_json::to_vec(&relation)?)?;
        self.record_mutation(user_id, false)?;
        Ok(Some(relation))
    }

    /// Case-insensitive substring search over name and observations.
    pub async fn search_memory(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<Entity>> {
        let lock = self.lock_for(user_id);
        let _guard = lock.read().await;

        let mut matches = Vec::new();
        for entity in self.scan_entities_locked(user_id)? {
            if entity.matches_query(query) {
                matches.push(entity);
                if matches.len() >= limit {
                    break;
                }
            }
        }
        Ok(matches)
    }

    /// Returns the fresh summary, or a quick listing of the most recently
    /// updated entities if none exists or the existing one is stale.
    pub async fn get_memory_summary(&self, user_id: &str, top_n: usize) -> Result<MemorySummaryView> {
        let lock = self.lock_for(user_id);
        let _guard = lock.read().await;

        let counter = self.staleness_counter_locked(user_id)?;
        if let Some(bytes) = self.summaries.get(user_id)? {
            let summary: Summary = serde_json::from_slice(&bytes)?;
            if !counter.is_stale(self.staleness_threshold) {
                return Ok(MemorySummaryView::Fresh(summary));
            }
        }

        let mut entities = self.scan_entities_locked(user_id)?;
        entities.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        entities.truncate(top_n);
        Ok(MemorySummaryView::QuickListing(entities))
    }

    /// Persists a newly generated summary and resets the staleness counter.
    /// The caller (tool handler) is responsible for producing `prose_text`;
    /// this just commits it and clears staleness atomically with it.
    pub async fn put_summary(&self, user_id: &str, prose_text: String, generation_version: u32) -> Result<Summary> {
        let lock = self.lock_for(user_id);
        let _guard = lock.write().await;

        let summary = Summary::new(user_id, prose_text, generation_version);
        self.summaries.insert(user_id, serde_json::to_vec(&summary)?)?;
        self.staleness
            .insert(user_id, serde_json::to_vec(&StalenessCounter::default())?)?;
        Ok(summary)
    }

    pub async fn record_turn(&self, turn: &Turn) -> Result<()> {
        let lock = self.lock_for(&turn.user_id);
        let _guard = lock.write().await;

        let seq = self.turn_seq.fetch_add(1, Ordering::SeqCst);
        let key = Self::turn_key(&turn.user_id, turn, seq);
        self.turns.insert(&key, serde_json::to_vec(turn)?)?;
        Ok(())
    }

    /// Last `limit` turns by recency, oldest first (ready to fold into a
    /// prompt history in order). Relies on key order — `(millis, seq)` —
    /// rather than re-sorting by timestamp, since timestamps alone can tie.
    pub async fn get_recent_conversation(&self, user_id: &str, limit: usize) -> Result<Vec<Turn>> {
        let lock = self.lock_for(user_id);
        let _guard = lock.read().await;

        let prefix = Self::entity_prefix(user_id); // same "{user_id}\0" shape as entities
        let mut turns: Vec<Turn> = self
            .turns
            .scan_prefix(&prefix)
            .values()
            .rev()
            .take(limit)
            .filter_map(|v| v.ok())
            .filter_map(|bytes| serde_json::from_slice::<Turn>(&bytes).ok())
            .collect();
        turns.reverse();
        Ok(turns)
    }

    /// Deletes turns older than the configured TTL. Intended to run on a
    /// periodic background sweep, not per-request.
    pub async fn sweep_expired_turns(&self, user_id: &str) -> Result<usize> {
        let lock = self.lock_for(user_id);
        let _guard = lock.write().await;

        let cutoff = chrono::Utc::now() - chrono::Duration::from_std(self.conversation_ttl).unwrap_or_default();
        let prefix = Self::entity_prefix(user_id);
        let mut removed = 0;
        let keys: Vec<sled::IVec> = self
            .turns
            .scan_prefix(&prefix)
            .filter_map(|entry| entry.ok())
            .filter_map(|(key, value)| {
                let turn: Turn = serde_json::from_slice(&value).ok()?;
                if turn.created_at < cutoff {
                    Some(key)
                } else {
                    None
                }
            })
            .collect();
        for key in keys {
            self.turns.remove(&key)?;
            removed += 1;
        }
        Ok(removed)
    }

    fn record_mutation(&self, user_id: &str, is_user_edit: bool) -> Result<()> {
        let mut counter = self.staleness_counter_locked(user_id)?;
        counter.record_mutation(is_user_edit);
        self.staleness.insert(user_id, serde_json::to_vec(&counter)?)?;
        Ok(())
    }

    fn staleness_counter_locked(&self, user_id: &str) -> Result<StalenessCounter> {
        Ok(match self.staleness.get(user_id)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => StalenessCounter::default(),
        })
    }

    fn find_entity_locked(&self, user_id: &str, name: &str) -> Result<Option<Entity>> {
        let key = Self::entity_key(user_id, name);
        match self.entities.get(&key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_entities_locked(&self, user_id: &str) -> Result<Vec<Entity>> {
        let prefix = Self::entity_prefix(user_id);
        self.entities
            .scan_prefix(&prefix)
            .values()
            .map(|v| {
                let bytes = v?;
                Ok(serde_json::from_slice(&bytes)?)
            })
            .collect()
    }
}

/// What `get_memory_summary` hands back to the tool caller: either the
/// persisted prose summary, or a fallback listing when none is fresh.
pub enum MemorySummaryView {
    Fresh(Summary),
    QuickListing(Vec<Entity>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_gateway_core::TurnRole;

    fn engine() -> (MemoryEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let engine = MemoryEngine::open(dir.path().to_str().unwrap(), Duration::from_secs(48 * 3600)).unwrap();
        (engine, dir)
    }

    #[tokio::test]
    async fn remember_then_search_round_trips() {
        let (engine, _dir) = engine();
        engine
            .remember("alice", "The Armada", EntityType::Fleet, vec!["has 4 ships".to_string()], false)
            .await
            .unwrap();

        let results = engine.search_memory("alice", "armada", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "The Armada");
        assert_eq!(results[0].observations, vec!["has 4 ships".to_string()]);
    }

    #[tokio::test]
    async fn repeated_remember_does_not_duplicate_entity_or_observation() {
        let (engine, _dir) = engine();
        for _ in 0..2 {
            engine
                .remember("alice", "The Armada", EntityType::Fleet, vec!["has 4 ships".to_string()], false)
                .await
                .unwrap();
        }
        let results = engine.search_memory("alice", "armada", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].observations.len(), 1);
    }

    #[tokio::test]
    async fn add_observation_is_a_silent_noop_on_missing_entity() {
        let (engine, _dir) = engine();
        let added = engine
            .add_observation("alice", "Nonexistent", vec!["x".to_string()], false)
            .await
            .unwrap();
        assert_eq!(added, 0);
    }

    #[tokio::test]
    async fn create_relation_requires_both_entities() {
        let (engine, _dir) = engine();
        engine
            .remember("alice", "Blackbeard", EntityType::Person, vec![], false)
            .await
            .unwrap();
        let result = engine.create_relation("alice", "Blackbeard", "The Armada", "commands").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn create_relation_is_idempotent_on_triple() {
        let (engine, _dir) = engine();
        engine.remember("alice", "Blackbeard", EntityType::Person, vec![], false).await.unwrap();
        engine.remember("alice", "The Armada", EntityType::Fleet, vec![], false).await.unwrap();

        let first = engine.create_relation("alice", "Blackbeard", "The Armada", "commands").await.unwrap();
        assert!(first.is_some());
        let second = engine.create_relation("alice", "Blackbeard", "The Armada", "commands").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn summary_staleness_forces_regeneration_after_user_edit() {
        let (engine, _dir) = engine();
        engine.put_summary("alice", "Alice likes sailing.".to_string(), 1).await.unwrap();

        match engine.get_memory_summary("alice", 5).await.unwrap() {
            MemorySummaryView::Fresh(_) => {}
            MemorySummaryView::QuickListing(_) => panic!("expected a fresh summary"),
        }

        engine
            .add_observation("alice", "Alice", vec!["edited".to_string()], true)
            .await
            .ok();
        engine
            .remember("alice", "Alice", EntityType::Person, vec!["edited".to_string()], true)
            .await
            .unwrap();

        match engine.get_memory_summary("alice", 5).await.unwrap() {
            MemorySummaryView::Fresh(_) => panic!("summary should be stale after a user edit"),
            MemorySummaryView::QuickListing(_) => {}
        }
    }

    #[tokio::test]
    async fn recent_conversation_is_ordered_oldest_first() {
        let (engine, _dir) = engine();
        for i in 0..3 {
            let turn = Turn::new("alice", TurnRole::User, format!("message {i}"));
            engine.record_turn(&turn).await.unwrap();
        }
        let recent = engine.get_recent_conversation("alice", 10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "message 0");
        assert_eq!(recent[2].content, "message 2");
    }
}

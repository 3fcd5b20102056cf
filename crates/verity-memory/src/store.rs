//! Knowledge Store – the public surface of the memory layer.
//!
//! Composes the relational [`ledger`](crate::ledger) (system of record), the
//! [`GraphCache`] (adjacency and tag closure) and the [`VectorIndex`]
//! (similarity ranking).  Relational writes happen inside one SQLite
//! transaction per call; the two caches are patched only after the commit
//! succeeds, so a crash in between leaves them stale until
//! [`KnowledgeStore::rebuild_caches`] runs.
//!
//! # Example
//!
//! ```rust
//! use verity_memory::{FactInput, KnowledgeStore};
//! use verity_types::FactObject;
//!
//! let store = KnowledgeStore::open_in_memory().unwrap();
//! store
//!     .ingest_fact(FactInput::new("mug", "location", FactObject::literal("desk")))
//!     .unwrap();
//! store
//!     .ingest_fact(FactInput::new("mug", "location", FactObject::literal("sink")))
//!     .unwrap();
//!
//! let world = store.get_world_state(None).unwrap();
//! let locations = world.objects_of("mug", "location");
//! assert_eq!(locations, vec![&FactObject::literal("sink")]);
//! ```

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;
use verity_types::{
    Entity, EntityId, Event, Fact, FactObject, SourceType, TagHierarchy, WorldState,
};

use crate::graph::GraphCache;
use crate::ledger;
use crate::vector::{HashingEmbedder, VectorIndex};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum StoreError {
    /// A relational write failed; the transaction was rolled back.
    #[error("ingestion failed: {0}")]
    Ingestion(#[source] rusqlite::Error),
    #[error("query failed: {0}")]
    Query(#[source] rusqlite::Error),
    #[error("confidence must lie in [0, 1], got {0}")]
    InvalidConfidence(f64),
    #[error("summarizer failed: {0}")]
    Summarizer(String),
    #[error("corrupt ledger row: {0}")]
    Corrupt(String),
    #[error("ledger connection lock poisoned")]
    LockPoisoned,
}

fn read_err(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::FromSqlConversionFailure(col, _, cause) => {
            StoreError::Corrupt(format!("column {col}: {cause}"))
        }
        other => StoreError::Query(other),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration & collaborators
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file; `None` keeps the ledger in memory.
    pub db_path: Option<String>,
    pub embedding_dim: usize,
    /// Predicate whose facts are folded during consolidation.
    pub fold_predicate: String,
    /// Predicate of the summary fact that replaces a folded group.
    pub summary_predicate: String,
    /// Minimum group size that triggers folding.
    pub fold_threshold: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            embedding_dim: 256,
            fold_predicate: "episodic_log".to_string(),
            summary_predicate: "episodic_summary".to_string(),
            fold_threshold: 3,
        }
    }
}

/// Condenses a group of episodic entries into one summary line.
pub trait Summarizer: Send + Sync {
    fn summarize(
        &self,
        subject: &EntityId,
        entries: &[String],
    ) -> Result<String, Box<dyn StdError + Send + Sync>>;
}

/// Arguments of one ingestion call.
#[derive(Debug, Clone, PartialEq)]
pub struct FactInput {
    pub subject_id: EntityId,
    pub predicate: String,
    pub object: FactObject,
    pub subject_type: String,
    pub confidence: f64,
    pub source_type: SourceType,
    /// Keep other active facts for the same `(subject, predicate)`.
    pub allow_multiple: bool,
}

impl FactInput {
    pub fn new(
        subject_id: impl Into<EntityId>,
        predicate: impl Into<String>,
        object: FactObject,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            predicate: predicate.into(),
            object,
            subject_type: "unknown".to_string(),
            confidence: 1.0,
            source_type: SourceType::Inference,
            allow_multiple: false,
        }
    }

    pub fn subject_type(mut self, subject_type: impl Into<String>) -> Self {
        self.subject_type = subject_type.into();
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    pub fn allow_multiple(mut self, allow: bool) -> Self {
        self.allow_multiple = allow;
        self
    }
}

/// Outcome of one episode-folding pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsolidationReport {
    pub subjects_folded: usize,
    pub facts_archived: usize,
    pub summaries: Vec<Fact>,
}

/// Outcome of [`KnowledgeStore::run_sleep_cycle`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SleepReport {
    pub consolidation: ConsolidationReport,
    /// Vector documents dropped because their fact is no longer active.
    pub pruned_documents: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// KnowledgeStore
// ─────────────────────────────────────────────────────────────────────────────

pub struct KnowledgeStore {
    conn: Mutex<Connection>,
    graph: RwLock<GraphCache>,
    vectors: RwLock<VectorIndex>,
    events: Mutex<Vec<Event>>,
    summarizer: Option<Box<dyn Summarizer>>,
    config: StoreConfig,
}

impl KnowledgeStore {
    /// Open the ledger described by `config` and warm both caches from it.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let conn = match &config.db_path {
            Some(path) => ledger::open(path),
            None => ledger::open_in_memory(),
        }
        .map_err(StoreError::Query)?;
        let store = Self {
            conn: Mutex::new(conn),
            graph: RwLock::new(GraphCache::new()),
            vectors: RwLock::new(VectorIndex::new(Box::new(HashingEmbedder::new(
                config.embedding_dim,
            )))),
            events: Mutex::new(Vec::new()),
            summarizer: None,
            config,
        };
        store.rebuild_caches()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(StoreConfig::default())
    }

    pub fn with_summarizer(mut self, summarizer: Box<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Replace the vector index (e.g. to plug in a different embedder).
    /// The new index is populated from the active facts.
    pub fn with_vector_index(self, index: VectorIndex) -> Result<Self, StoreError> {
        *self.vectors_write() = index;
        self.rebuild_caches()?;
        Ok(self)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn graph_write(&self) -> RwLockWriteGuard<'_, GraphCache> {
        self.graph.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn vectors_read(&self) -> RwLockReadGuard<'_, VectorIndex> {
        self.vectors.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn vectors_write(&self) -> RwLockWriteGuard<'_, VectorIndex> {
        self.vectors.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read access to the graph cache.
    pub fn graph(&self) -> RwLockReadGuard<'_, GraphCache> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Ingestion ────────────────────────────────────────────────────────────

    pub fn ingest_fact(&self, input: FactInput) -> Result<Fact, StoreError> {
        self.ingest_fact_at(input, Utc::now())
    }

    /// Ingest with an explicit clock instant.
    ///
    /// An identical active triple is returned unchanged.  Otherwise, unless
    /// `allow_multiple` is set, every active fact sharing the
    /// `(subject, predicate)` pair is archived at `now` before the new fact
    /// is inserted.
    pub fn ingest_fact_at(&self, input: FactInput, now: DateTime<Utc>) -> Result<Fact, StoreError> {
        if !(0.0..=1.0).contains(&input.confidence) {
            return Err(StoreError::InvalidConfidence(input.confidence));
        }
        let now = now.trunc_subsecs(6);

        let (fact, archived) = {
            let mut conn = self.lock()?;
            let tx = conn.transaction().map_err(StoreError::Ingestion)?;

            if let Some(existing) =
                ledger::find_active_exact(&tx, &input.subject_id, &input.predicate, &input.object)
                    .map_err(read_err)?
            {
                debug!(fact_id = %existing.id, "duplicate fact, returning existing row");
                return Ok(existing);
            }

            ledger::ensure_entity(&tx, &input.subject_id, &input.subject_type, now)
                .map_err(StoreError::Ingestion)?;
            if let FactObject::Entity(object_id) = &input.object {
                ledger::ensure_entity(&tx, object_id, "unknown", now)
                    .map_err(StoreError::Ingestion)?;
            }

            let mut archived = Vec::new();
            if !input.allow_multiple {
                let previous = ledger::find_active(&tx, &input.subject_id, &input.predicate)
                    .map_err(read_err)?;
                for old in previous {
                    if ledger::archive(&tx, old.id, now).map_err(StoreError::Ingestion)? {
                        archived.push(old.id);
                    }
                }
            }

            let fact = Fact {
                id: Uuid::new_v4(),
                subject_id: input.subject_id,
                predicate: input.predicate,
                object: input.object,
                confidence: input.confidence,
                source_type: input.source_type,
                valid_from: now,
                valid_until: None,
            };
            ledger::insert_fact(&tx, &fact).map_err(StoreError::Ingestion)?;
            ledger::set_attribute(&tx, &fact.subject_id, &fact.predicate, fact.object.as_str(), now)
                .map_err(StoreError::Ingestion)?;
            tx.commit().map_err(StoreError::Ingestion)?;
            (fact, archived)
        };

        {
            let mut graph = self.graph_write();
            for id in &archived {
                graph.remove_fact(*id);
            }
            graph.add_fact(&fact);
        }
        self.vectors_write().add(&fact);

        if !archived.is_empty() {
            info!(
                subject = %fact.subject_id,
                predicate = %fact.predicate,
                archived = archived.len(),
                "contradicting facts archived"
            );
        }
        debug!(fact_id = %fact.id, subject = %fact.subject_id, predicate = %fact.predicate, "fact ingested");
        Ok(fact)
    }

    /// Queue a transient event for the next snapshot.
    pub fn push_event(&self, kind: impl Into<String>, payload: serde_json::Value) -> Event {
        let event = Event::new(kind, payload);
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        event
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    /// Snapshot the world at `snapshot_time` (default: now).
    ///
    /// Drains the event queue.  Events are only consumed once the relational
    /// reads have succeeded.
    pub fn get_world_state(
        &self,
        snapshot_time: Option<DateTime<Utc>>,
    ) -> Result<WorldState, StoreError> {
        let at = snapshot_time.unwrap_or_else(Utc::now);
        let (entities, facts) = {
            let conn = self.lock()?;
            (
                ledger::all_entities(&conn).map_err(read_err)?,
                ledger::facts_valid_at(&conn, at).map_err(read_err)?,
            )
        };
        let events =
            std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner));

        let mut state = WorldState::empty(at);
        state.entities = entities;
        state.facts = facts;
        state.event_queue = events;
        Ok(state)
    }

    /// Similarity search, re-validated against the ledger.
    ///
    /// Pulls `2 × limit` candidates from the vector index and keeps, in
    /// similarity order, at most `limit` that are still active.
    pub fn hybrid_search(&self, query: &str, limit: usize) -> Result<Vec<Fact>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let candidates = self.vectors_read().query(query, limit.saturating_mul(2));
        let conn = self.lock()?;
        let mut results = Vec::with_capacity(limit);
        for (fact_id, _score) in candidates {
            match ledger::fact(&conn, fact_id).map_err(read_err)? {
                Some(fact) if fact.is_active() => results.push(fact),
                _ => continue,
            }
            if results.len() == limit {
                break;
            }
        }
        Ok(results)
    }

    pub fn get_all_parent_tags(&self, tags: &[String]) -> Vec<String> {
        self.graph().parent_closure(tags)
    }

    pub fn fact(&self, id: Uuid) -> Result<Option<Fact>, StoreError> {
        let conn = self.lock()?;
        ledger::fact(&conn, id).map_err(read_err)
    }

    pub fn entity(&self, id: &str) -> Result<Option<Entity>, StoreError> {
        let conn = self.lock()?;
        ledger::entity(&conn, id).map_err(read_err)
    }

    pub fn active_facts(&self) -> Result<Vec<Fact>, StoreError> {
        let conn = self.lock()?;
        ledger::active_facts(&conn).map_err(read_err)
    }

    // ── Maintenance ──────────────────────────────────────────────────────────

    /// Rebuild the graph cache and the vector index from the active facts.
    pub fn rebuild_caches(&self) -> Result<(), StoreError> {
        let facts = self.active_facts()?;
        self.graph_write().rebuild(&facts);
        let mut vectors = self.vectors_write();
        vectors.clear();
        for fact in &facts {
            vectors.add(fact);
        }
        debug!(facts = facts.len(), "caches rebuilt");
        Ok(())
    }

    pub fn fold_episodes(&self) -> Result<ConsolidationReport, StoreError> {
        self.fold_episodes_at(Utc::now())
    }

    /// Fold every subject's active episodic entries into one summary fact
    /// once the group reaches the configured threshold.
    ///
    /// The pass runs in a single transaction: any summarizer error rolls
    /// back every group.  Without a summarizer this is a no-op.
    pub fn fold_episodes_at(&self, now: DateTime<Utc>) -> Result<ConsolidationReport, StoreError> {
        let Some(summarizer) = self.summarizer.as_deref() else {
            debug!("no summarizer configured, skipping episode folding");
            return Ok(ConsolidationReport::default());
        };
        let now = now.trunc_subsecs(6);
        let mut report = ConsolidationReport::default();

        {
            let mut conn = self.lock()?;
            let tx = conn.transaction().map_err(StoreError::Ingestion)?;

            let mut groups: BTreeMap<EntityId, Vec<Fact>> = BTreeMap::new();
            for fact in ledger::active_with_predicate(&tx, &self.config.fold_predicate)
                .map_err(read_err)?
            {
                groups.entry(fact.subject_id.clone()).or_default().push(fact);
            }

            for (subject, entries) in groups {
                if entries.len() < self.config.fold_threshold {
                    continue;
                }
                let texts: Vec<String> = entries.iter().map(|f| f.object.to_string()).collect();
                let summary = summarizer
                    .summarize(&subject, &texts)
                    .map_err(|e| StoreError::Summarizer(e.to_string()))?;

                for entry in &entries {
                    if ledger::archive(&tx, entry.id, now).map_err(StoreError::Ingestion)? {
                        report.facts_archived += 1;
                    }
                }

                let object = FactObject::literal(summary);
                let existing = ledger::find_active_exact(
                    &tx,
                    &subject,
                    &self.config.summary_predicate,
                    &object,
                )
                .map_err(read_err)?;
                let summary_fact = match existing {
                    Some(fact) => fact,
                    None => {
                        let fact = Fact {
                            id: Uuid::new_v4(),
                            subject_id: subject.clone(),
                            predicate: self.config.summary_predicate.clone(),
                            object,
                            confidence: 1.0,
                            source_type: SourceType::Inference,
                            valid_from: now,
                            valid_until: None,
                        };
                        ledger::insert_fact(&tx, &fact).map_err(StoreError::Ingestion)?;
                        ledger::set_attribute(
                            &tx,
                            &subject,
                            &fact.predicate,
                            fact.object.as_str(),
                            now,
                        )
                        .map_err(StoreError::Ingestion)?;
                        fact
                    }
                };
                report.subjects_folded += 1;
                report.summaries.push(summary_fact);
            }

            tx.commit().map_err(StoreError::Ingestion)?;
        }

        if report.subjects_folded > 0 {
            let facts = self.active_facts()?;
            self.graph_write().rebuild(&facts);
            let mut vectors = self.vectors_write();
            for fact in &report.summaries {
                vectors.add(fact);
            }
            info!(
                subjects = report.subjects_folded,
                archived = report.facts_archived,
                "episodes folded"
            );
        }
        Ok(report)
    }

    /// Maintenance pass: fold episodes, then drop vector documents whose
    /// facts are no longer active.
    pub fn run_sleep_cycle(&self) -> Result<SleepReport, StoreError> {
        let consolidation = self.fold_episodes()?;
        let active: std::collections::HashSet<Uuid> =
            self.active_facts()?.into_iter().map(|f| f.id).collect();
        let pruned_documents = self.vectors_write().retain(|id| active.contains(id));
        info!(pruned = pruned_documents, "sleep cycle complete");
        Ok(SleepReport {
            consolidation,
            pruned_documents,
        })
    }

    /// Number of documents currently held by the vector index.
    pub fn indexed_documents(&self) -> usize {
        self.vectors_read().len()
    }
}

impl TagHierarchy for KnowledgeStore {
    fn get_all_parent_tags(&self, tags: &[String]) -> Vec<String> {
        KnowledgeStore::get_all_parent_tags(self, tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashSet;
    use verity_types::IS_A;

    fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }

    fn literal(subject: &str, predicate: &str, value: &str) -> FactInput {
        FactInput::new(subject, predicate, FactObject::literal(value))
    }

    struct JoinSummarizer;

    impl Summarizer for JoinSummarizer {
        fn summarize(
            &self,
            _subject: &EntityId,
            entries: &[String],
        ) -> Result<String, Box<dyn StdError + Send + Sync>> {
            Ok(entries.join("; "))
        }
    }

    struct FailingSummarizer;

    impl Summarizer for FailingSummarizer {
        fn summarize(
            &self,
            _subject: &EntityId,
            _entries: &[String],
        ) -> Result<String, Box<dyn StdError + Send + Sync>> {
            Err("model offline".into())
        }
    }

    #[test]
    fn ingesting_identical_fact_is_idempotent() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let first = store.ingest_fact(literal("x", "location", "room_101")).unwrap();
        let second = store.ingest_fact(literal("x", "location", "room_101")).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.active_facts().unwrap().len(), 1);
        assert_eq!(store.indexed_documents(), 1);
    }

    #[test]
    fn new_object_archives_contradicting_fact() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let t = now();
        let old = store
            .ingest_fact_at(literal("x", "location", "room_101"), t)
            .unwrap();
        let new = store
            .ingest_fact_at(literal("x", "location", "room_102"), t + Duration::seconds(5))
            .unwrap();

        let old = store.fact(old.id).unwrap().unwrap();
        assert_eq!(old.valid_until, Some(t + Duration::seconds(5)));
        assert!(new.is_active());

        let graph = store.graph();
        assert!(!graph.has_edge("x", "location", &FactObject::literal("room_101")));
        assert!(graph.has_edge("x", "location", &FactObject::literal("room_102")));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn attribute_projection_follows_latest_fact() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        store
            .ingest_fact(literal("x", "location", "room_101").subject_type("robot"))
            .unwrap();
        store.ingest_fact(literal("x", "location", "room_102")).unwrap();
        let entity = store.entity("x").unwrap().unwrap();
        assert_eq!(entity.entity_type, "robot");
        assert_eq!(
            entity.attributes.get("location").map(String::as_str),
            Some("room_102")
        );
    }

    #[test]
    fn allow_multiple_keeps_parallel_facts() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        for step in ["a", "b", "c"] {
            store
                .ingest_fact(literal("x", "episodic_log", step).allow_multiple(true))
                .unwrap();
        }
        let world = store.get_world_state(None).unwrap();
        assert_eq!(world.objects_of("x", "episodic_log").len(), 3);
    }

    #[test]
    fn entity_objects_are_created_on_first_reference() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        store
            .ingest_fact(FactInput::new("cat", IS_A, FactObject::entity("animal")))
            .unwrap();
        let animal = store.entity("animal").unwrap().unwrap();
        assert_eq!(animal.entity_type, "unknown");
    }

    #[test]
    fn confidence_out_of_range_is_rejected() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let err = store
            .ingest_fact(literal("x", "p", "v").confidence(1.5))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfidence(_)));
        assert!(matches!(
            store.ingest_fact(literal("x", "p", "v").confidence(f64::NAN)),
            Err(StoreError::InvalidConfidence(_))
        ));
        assert!(store.active_facts().unwrap().is_empty());
        assert!(store.entity("x").unwrap().is_none());
    }

    #[test]
    fn snapshots_travel_through_time() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let t0 = now();
        let t1 = t0 + Duration::seconds(10);
        let t2 = t0 + Duration::seconds(20);
        store
            .ingest_fact_at(literal("x", "location", "room_101"), t0)
            .unwrap();
        store
            .ingest_fact_at(literal("x", "location", "room_102"), t2)
            .unwrap();

        let past = store.get_world_state(Some(t1)).unwrap();
        assert_eq!(
            past.objects_of("x", "location"),
            vec![&FactObject::literal("room_101")]
        );
        let present = store.get_world_state(Some(t2)).unwrap();
        assert_eq!(
            present.objects_of("x", "location"),
            vec![&FactObject::literal("room_102")]
        );
        assert_eq!(present.tick, t2.timestamp() * 60);
        assert!(present.entities.contains_key("x"));
    }

    #[test]
    fn event_queue_is_drained_by_first_snapshot() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        store.push_event("door_bell", serde_json::json!({"floor": 1}));
        let first = store.get_world_state(None).unwrap();
        assert_eq!(first.event_queue.len(), 1);
        assert_eq!(first.event_queue[0].kind, "door_bell");
        let second = store.get_world_state(None).unwrap();
        assert!(second.event_queue.is_empty());
    }

    #[test]
    fn hybrid_search_never_returns_archived_facts() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let old = store
            .ingest_fact(literal("x", "location", "kitchen table"))
            .unwrap();
        let new = store
            .ingest_fact(literal("x", "location", "garden bench"))
            .unwrap();
        // The archived fact's document is still indexed until a sleep cycle.
        assert_eq!(store.indexed_documents(), 2);

        let hits = store.hybrid_search("location kitchen table", 5).unwrap();
        assert!(hits.iter().all(|f| f.id != old.id));
        assert_eq!(hits.first().map(|f| f.id), Some(new.id));
        assert!(store.hybrid_search("kitchen", 0).unwrap().is_empty());
    }

    #[test]
    fn hybrid_search_respects_limit() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        for i in 0..6 {
            store
                .ingest_fact(literal(&format!("s{i}"), "color", "red"))
                .unwrap();
        }
        assert_eq!(store.hybrid_search("color red", 4).unwrap().len(), 4);
        assert!(store.hybrid_search("color red", 0).unwrap().is_empty());
    }

    #[test]
    fn parent_tags_close_over_cycles() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        store
            .ingest_fact(FactInput::new("a", IS_A, FactObject::entity("b")))
            .unwrap();
        store
            .ingest_fact(FactInput::new("b", IS_A, FactObject::entity("a")))
            .unwrap();
        let tags: HashSet<String> = store
            .get_all_parent_tags(&["a".to_string()])
            .into_iter()
            .collect();
        assert_eq!(tags, HashSet::from(["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn tag_hierarchy_trait_delegates_to_closure() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        store
            .ingest_fact(FactInput::new("cat", IS_A, FactObject::literal("animal")))
            .unwrap();
        let hierarchy: &dyn TagHierarchy = &store;
        assert_eq!(
            hierarchy.get_all_parent_tags(&["cat".to_string()]),
            vec!["cat".to_string(), "animal".to_string()]
        );
    }

    #[test]
    fn fold_without_summarizer_is_a_no_op() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        for step in ["a", "b", "c"] {
            store
                .ingest_fact(literal("x", "episodic_log", step).allow_multiple(true))
                .unwrap();
        }
        assert_eq!(store.fold_episodes().unwrap(), ConsolidationReport::default());
        assert_eq!(store.active_facts().unwrap().len(), 3);
    }

    #[test]
    fn fold_archives_large_groups_only() {
        let store = KnowledgeStore::open_in_memory()
            .unwrap()
            .with_summarizer(Box::new(JoinSummarizer));
        let t = now();
        for step in ["step 0", "step 1", "step 2"] {
            store
                .ingest_fact_at(literal("x", "episodic_log", step).allow_multiple(true), t)
                .unwrap();
        }
        for step in ["one", "two"] {
            store
                .ingest_fact_at(literal("y", "episodic_log", step).allow_multiple(true), t)
                .unwrap();
        }

        let report = store.fold_episodes_at(t + Duration::seconds(1)).unwrap();
        assert_eq!(report.subjects_folded, 1);
        assert_eq!(report.facts_archived, 3);
        assert_eq!(
            report.summaries[0].object,
            FactObject::literal("step 0; step 1; step 2")
        );

        let world = store.get_world_state(Some(t + Duration::seconds(2))).unwrap();
        assert!(world.objects_of("x", "episodic_log").is_empty());
        assert_eq!(world.objects_of("x", "episodic_summary").len(), 1);
        assert_eq!(world.objects_of("y", "episodic_log").len(), 2);

        let graph = store.graph();
        assert!(graph.has_edge(
            "x",
            "episodic_summary",
            &FactObject::literal("step 0; step 1; step 2")
        ));
        assert!(!graph.has_edge("x", "episodic_log", &FactObject::literal("step 0")));
    }

    #[test]
    fn summarizer_failure_leaves_ledger_untouched() {
        let store = KnowledgeStore::open_in_memory()
            .unwrap()
            .with_summarizer(Box::new(FailingSummarizer));
        for step in ["a", "b", "c"] {
            store
                .ingest_fact(literal("x", "episodic_log", step).allow_multiple(true))
                .unwrap();
        }
        let err = store.fold_episodes().unwrap_err();
        assert!(matches!(err, StoreError::Summarizer(_)));
        let active = store.active_facts().unwrap();
        assert_eq!(active.len(), 3);
        assert!(active.iter().all(|f| f.predicate == "episodic_log"));
    }

    #[test]
    fn sleep_cycle_prunes_stale_documents() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        store.ingest_fact(literal("x", "mood", "calm")).unwrap();
        store.ingest_fact(literal("x", "mood", "alert")).unwrap();
        assert_eq!(store.indexed_documents(), 2);

        let report = store.run_sleep_cycle().unwrap();
        assert_eq!(report.pruned_documents, 1);
        assert_eq!(store.indexed_documents(), 1);
    }

    #[test]
    fn file_backed_store_reopens_with_warm_caches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let config = StoreConfig {
            db_path: Some(path.to_string_lossy().into_owned()),
            ..StoreConfig::default()
        };
        {
            let store = KnowledgeStore::open(config.clone()).unwrap();
            store
                .ingest_fact(FactInput::new("poodle", IS_A, FactObject::entity("dog")))
                .unwrap();
        }
        let store = KnowledgeStore::open(config).unwrap();
        assert_eq!(
            store.get_all_parent_tags(&["poodle".to_string()]),
            vec!["poodle".to_string(), "dog".to_string()]
        );
        assert_eq!(store.indexed_documents(), 1);
    }
}

//! Entities, temporal facts and world snapshots.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Reserved predicate linking a tag to its parent tag.
pub const IS_A: &str = "is_a";

/// Per-day retention of non-axiom confidence.
const DAILY_DECAY: f64 = 0.9;

// ─────────────────────────────────────────────────────────────────────────────
// EntityId
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque entity identifier.
///
/// Any string is accepted so that tags (`"animal"`) and agents (`"agent.1"`)
/// can be subjects directly; [`EntityId::generate`] mints a fresh UUID.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A new random (UUID v4) identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entity
// ─────────────────────────────────────────────────────────────────────────────

/// A node of the knowledge graph.
///
/// `attributes` is a projection of the facts where this entity is the
/// subject: the latest object ingested per predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// FactObject
// ─────────────────────────────────────────────────────────────────────────────

/// Raised when a wire-level object pair does not carry exactly one value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FactObjectError {
    #[error("a fact object needs either an entity id or a literal, got neither")]
    Missing,
    #[error("a fact object cannot be both an entity id and a literal")]
    Ambiguous,
}

/// The object position of a fact: another entity or a literal string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactObject {
    Entity(EntityId),
    Literal(String),
}

impl FactObject {
    pub fn entity(id: impl Into<EntityId>) -> Self {
        Self::Entity(id.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// Build from the `(object_entity_id?, object_literal?)` wire pair.
    pub fn from_parts(
        entity: Option<EntityId>,
        literal: Option<String>,
    ) -> Result<Self, FactObjectError> {
        match (entity, literal) {
            (Some(id), None) => Ok(Self::Entity(id)),
            (None, Some(value)) => Ok(Self::Literal(value)),
            (None, None) => Err(FactObjectError::Missing),
            (Some(_), Some(_)) => Err(FactObjectError::Ambiguous),
        }
    }

    /// The stringified object: the entity id or the literal itself.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Entity(id) => id.as_str(),
            Self::Literal(value) => value,
        }
    }

    pub fn entity_id(&self) -> Option<&EntityId> {
        match self {
            Self::Entity(id) => Some(id),
            Self::Literal(_) => None,
        }
    }

    pub fn literal_value(&self) -> Option<&str> {
        match self {
            Self::Entity(_) => None,
            Self::Literal(value) => Some(value),
        }
    }
}

impl fmt::Display for FactObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SourceType
// ─────────────────────────────────────────────────────────────────────────────

/// Provenance of a fact.  Only axioms are exempt from confidence decay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Axiom,
    #[serde(alias = "doc")]
    Document,
    Web,
    #[default]
    Inference,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Axiom => "axiom",
            SourceType::Document => "document",
            SourceType::Web => "web",
            SourceType::Inference => "inference",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "axiom" => Some(SourceType::Axiom),
            "document" | "doc" => Some(SourceType::Document),
            "web" => Some(SourceType::Web),
            "inference" => Some(SourceType::Inference),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fact
// ─────────────────────────────────────────────────────────────────────────────

/// A versioned `(subject, predicate, object)` triple.
///
/// A fact is *active* while `valid_until` is `None`.  Archival closes the
/// window; rows are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: Uuid,
    pub subject_id: EntityId,
    pub predicate: String,
    pub object: FactObject,
    pub confidence: f64,
    pub source_type: SourceType,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl Fact {
    pub fn is_active(&self) -> bool {
        self.valid_until.is_none()
    }

    /// `valid_from <= at < valid_until` (an open window never ends).
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && self.valid_until.is_none_or(|until| at < until)
    }

    /// Confidence as seen at `now`.
    ///
    /// ```text
    /// axiom            → 1.0
    /// valid_from > now → confidence
    /// otherwise        → confidence × 0.9^(age_hours / 24)
    /// ```
    ///
    /// ```
    /// use chrono::{Duration, Utc};
    /// use uuid::Uuid;
    /// use verity_types::{EntityId, Fact, FactObject, SourceType};
    ///
    /// let now = Utc::now();
    /// let fact = Fact {
    ///     id: Uuid::new_v4(),
    ///     subject_id: EntityId::from("mug"),
    ///     predicate: "location".into(),
    ///     object: FactObject::literal("desk"),
    ///     confidence: 0.8,
    ///     source_type: SourceType::Inference,
    ///     valid_from: now - Duration::hours(24),
    ///     valid_until: None,
    /// };
    /// assert!((fact.current_confidence(now) - 0.72).abs() < 1e-3);
    /// ```
    pub fn current_confidence(&self, now: DateTime<Utc>) -> f64 {
        if self.source_type == SourceType::Axiom {
            return 1.0;
        }
        if self.valid_from > now {
            return self.confidence;
        }
        let age_hours = (now - self.valid_from).num_milliseconds() as f64 / 3_600_000.0;
        self.confidence * DAILY_DECAY.powf(age_hours.max(0.0) / 24.0)
    }

    /// Text indexed for similarity search.
    pub fn document_text(&self) -> String {
        format!("Fact: {} {}", self.predicate, self.object)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events & snapshots
// ─────────────────────────────────────────────────────────────────────────────

/// A transient occurrence queued for the next world snapshot.  Never
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Point-in-time view of the world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldState {
    pub snapshot_time: DateTime<Utc>,
    /// Coarse tick counter: snapshot Unix seconds × 60.
    pub tick: i64,
    /// Every known entity; existence is not filtered by time.
    pub entities: BTreeMap<EntityId, Entity>,
    /// Facts valid at `snapshot_time`, ordered by `valid_from`.
    pub facts: Vec<Fact>,
    /// Events drained from the store when this snapshot was taken.
    #[serde(default)]
    pub event_queue: Vec<Event>,
}

impl WorldState {
    /// An empty snapshot taken at `at`.
    pub fn empty(at: DateTime<Utc>) -> Self {
        Self {
            snapshot_time: at,
            tick: at.timestamp() * 60,
            entities: BTreeMap::new(),
            facts: Vec::new(),
            event_queue: Vec::new(),
        }
    }

    /// Objects of the facts matching `(subject, predicate)` in this snapshot.
    pub fn objects_of(&self, subject: &str, predicate: &str) -> Vec<&FactObject> {
        self.facts
            .iter()
            .filter(|f| f.subject_id.as_str() == subject && f.predicate == predicate)
            .map(|f| &f.object)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn fact(source_type: SourceType, valid_from: DateTime<Utc>) -> Fact {
        Fact {
            id: Uuid::new_v4(),
            subject_id: EntityId::from("robot"),
            predicate: "battery".into(),
            object: FactObject::literal("low"),
            confidence: 0.8,
            source_type,
            valid_from,
            valid_until: None,
        }
    }

    #[test]
    fn inference_confidence_decays_ten_percent_per_day() {
        let now = Utc::now();
        let f = fact(SourceType::Inference, now - Duration::hours(24));
        assert!((f.current_confidence(now) - 0.8 * 0.9).abs() < 1e-3);
    }

    #[test]
    fn two_days_compound() {
        let now = Utc::now();
        let f = fact(SourceType::Web, now - Duration::hours(48));
        assert!((f.current_confidence(now) - 0.8 * 0.81).abs() < 1e-3);
    }

    #[test]
    fn axiom_confidence_is_one() {
        let now = Utc::now();
        let f = fact(SourceType::Axiom, now - Duration::hours(24));
        assert_eq!(f.current_confidence(now), 1.0);
    }

    #[test]
    fn future_fact_is_not_decayed() {
        let now = Utc::now();
        let f = fact(SourceType::Inference, now + Duration::hours(5));
        assert_eq!(f.current_confidence(now), 0.8);
    }

    #[test]
    fn validity_window_is_half_open() {
        let t0 = Utc::now();
        let mut f = fact(SourceType::Inference, t0);
        f.valid_until = Some(t0 + Duration::seconds(10));
        assert!(f.is_valid_at(t0));
        assert!(f.is_valid_at(t0 + Duration::seconds(9)));
        assert!(!f.is_valid_at(t0 + Duration::seconds(10)));
        assert!(!f.is_valid_at(t0 - Duration::seconds(1)));
        assert!(!f.is_active());
    }

    #[test]
    fn fact_object_from_parts_requires_exactly_one() {
        assert_eq!(
            FactObject::from_parts(None, Some("x".into())),
            Ok(FactObject::literal("x"))
        );
        assert_eq!(
            FactObject::from_parts(Some("e1".into()), None),
            Ok(FactObject::entity("e1"))
        );
        assert_eq!(
            FactObject::from_parts(None, None),
            Err(FactObjectError::Missing)
        );
        assert_eq!(
            FactObject::from_parts(Some("e1".into()), Some("x".into())),
            Err(FactObjectError::Ambiguous)
        );
    }

    #[test]
    fn source_type_accepts_doc_alias() {
        let s: SourceType = serde_json::from_str("\"doc\"").unwrap();
        assert_eq!(s, SourceType::Document);
        assert_eq!(SourceType::parse("doc"), Some(SourceType::Document));
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"document\"");
    }

    #[test]
    fn entity_id_serializes_as_plain_string() {
        let id = EntityId::from("agent.1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"agent.1\"");
        assert_ne!(EntityId::generate(), EntityId::generate());
    }

    #[test]
    fn document_text_mentions_predicate_and_object() {
        let f = fact(SourceType::Inference, Utc::now());
        assert_eq!(f.document_text(), "Fact: battery low");
    }
}

//! Fact Ledger – the relational system of record.
//!
//! Every function takes a plain [`Connection`] so it can run either directly
//! or inside a [`rusqlite::Transaction`] (which derefs to one).  Callers own
//! the transaction boundary.
//!
//! # Storage layout
//!
//! | table      | columns                                                                                              |
//! |------------|------------------------------------------------------------------------------------------------------|
//! | `entities` | `id`, `type`, `attributes` (JSON object), `created_at`, `updated_at`                                 |
//! | `facts`    | `id`, `subject_id`, `predicate`, `object_entity_id`, `object_literal`, `confidence`, `source_type`, `valid_from`, `valid_until` |
//!
//! Timestamps are fixed-width RFC-3339 UTC text with microsecond precision,
//! so comparing them lexically in SQL compares them in time.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;
use verity_types::{Entity, EntityId, Fact, FactObject, SourceType};

const FACT_COLUMNS: &str = "id, subject_id, predicate, object_entity_id, object_literal, \
                            confidence, source_type, valid_from, valid_until";

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS entities (
        id         TEXT NOT NULL PRIMARY KEY,
        type       TEXT NOT NULL,
        attributes TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS facts (
        id               TEXT NOT NULL PRIMARY KEY,
        subject_id       TEXT NOT NULL REFERENCES entities(id),
        predicate        TEXT NOT NULL,
        object_entity_id TEXT REFERENCES entities(id),
        object_literal   TEXT,
        confidence       REAL NOT NULL,
        source_type      TEXT NOT NULL,
        valid_from       TEXT NOT NULL,
        valid_until      TEXT,
        CHECK ((object_entity_id IS NULL) != (object_literal IS NULL))
    );
    CREATE INDEX IF NOT EXISTS idx_facts_subject_predicate
        ON facts (subject_id, predicate, valid_until);
    CREATE INDEX IF NOT EXISTS idx_facts_predicate
        ON facts (predicate, valid_until);
    CREATE INDEX IF NOT EXISTS idx_facts_valid_from
        ON facts (valid_from);
";

/// Open (or create) a ledger database at `path`.
pub fn open(path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

/// Open a ledger in a private in-memory database.
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

pub fn encode_ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_fact(row: &Row<'_>) -> rusqlite::Result<Fact> {
    let id: String = row.get(0)?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    let subject: String = row.get(1)?;
    let object_entity: Option<String> = row.get(3)?;
    let object_literal: Option<String> = row.get(4)?;
    let object = FactObject::from_parts(object_entity.map(EntityId::from), object_literal)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let source: String = row.get(6)?;
    let source_type = SourceType::parse(&source).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            Type::Text,
            format!("unknown source type '{source}'").into(),
        )
    })?;
    let valid_from: String = row.get(7)?;
    let valid_until: Option<String> = row.get(8)?;
    Ok(Fact {
        id,
        subject_id: EntityId::from(subject),
        predicate: row.get(2)?,
        object,
        confidence: row.get(5)?,
        source_type,
        valid_from: decode_ts(7, &valid_from)?,
        valid_until: valid_until.map(|raw| decode_ts(8, &raw)).transpose()?,
    })
}

fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let id: String = row.get(0)?;
    let attributes: String = row.get(2)?;
    let attributes: BTreeMap<String, String> = serde_json::from_str(&attributes)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let created_at: String = row.get(3)?;
    let updated_at: String = row.get(4)?;
    Ok(Entity {
        id: EntityId::from(id),
        entity_type: row.get(1)?,
        attributes,
        created_at: decode_ts(3, &created_at)?,
        updated_at: decode_ts(4, &updated_at)?,
    })
}

fn query_facts<P: rusqlite::Params>(
    conn: &Connection,
    filter: &str,
    params: P,
) -> rusqlite::Result<Vec<Fact>> {
    let sql = format!("SELECT {FACT_COLUMNS} FROM facts {filter}");
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params, row_to_fact)?;
    rows.collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────────────────────────────────────

/// Create `id` on first reference.  A later reference with a type other than
/// `"unknown"` overwrites the stored type.
pub fn ensure_entity(
    conn: &Connection,
    id: &EntityId,
    entity_type: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    let ts = encode_ts(now);
    conn.execute(
        "INSERT OR IGNORE INTO entities (id, type, attributes, created_at, updated_at)
         VALUES (?1, ?2, '{}', ?3, ?3)",
        params![id.as_str(), entity_type, ts],
    )?;
    if entity_type != "unknown" {
        conn.execute(
            "UPDATE entities SET type = ?2, updated_at = ?3 WHERE id = ?1 AND type != ?2",
            params![id.as_str(), entity_type, ts],
        )?;
    }
    Ok(())
}

/// Project `predicate → value` onto the entity's attribute map.
pub fn set_attribute(
    conn: &Connection,
    id: &EntityId,
    predicate: &str,
    value: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    let raw: String = conn.query_row(
        "SELECT attributes FROM entities WHERE id = ?1",
        params![id.as_str()],
        |row| row.get(0),
    )?;
    let mut attributes: BTreeMap<String, String> = serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    attributes.insert(predicate.to_string(), value.to_string());
    let raw = serde_json::to_string(&attributes)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    conn.execute(
        "UPDATE entities SET attributes = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.as_str(), raw, encode_ts(now)],
    )?;
    Ok(())
}

pub fn entity(conn: &Connection, id: &str) -> rusqlite::Result<Option<Entity>> {
    conn.query_row(
        "SELECT id, type, attributes, created_at, updated_at FROM entities WHERE id = ?1",
        params![id],
        row_to_entity,
    )
    .optional()
}

pub fn all_entities(conn: &Connection) -> rusqlite::Result<BTreeMap<EntityId, Entity>> {
    let mut stmt = conn
        .prepare_cached("SELECT id, type, attributes, created_at, updated_at FROM entities")?;
    let rows = stmt.query_map([], row_to_entity)?;
    let mut entities = BTreeMap::new();
    for row in rows {
        let entity = row?;
        entities.insert(entity.id.clone(), entity);
    }
    Ok(entities)
}

// ─────────────────────────────────────────────────────────────────────────────
// Facts
// ─────────────────────────────────────────────────────────────────────────────

pub fn insert_fact(conn: &Connection, fact: &Fact) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO facts
             (id, subject_id, predicate, object_entity_id, object_literal,
              confidence, source_type, valid_from, valid_until)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            fact.id.to_string(),
            fact.subject_id.as_str(),
            fact.predicate,
            fact.object.entity_id().map(EntityId::as_str),
            fact.object.literal_value(),
            fact.confidence,
            fact.source_type.as_str(),
            encode_ts(fact.valid_from),
            fact.valid_until.map(encode_ts),
        ],
    )?;
    Ok(())
}

/// Close the validity window of an active fact.  Returns `false` when the
/// fact was already archived.
pub fn archive(conn: &Connection, id: Uuid, at: DateTime<Utc>) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE facts SET valid_until = ?2 WHERE id = ?1 AND valid_until IS NULL",
        params![id.to_string(), encode_ts(at)],
    )?;
    Ok(changed == 1)
}

pub fn fact(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<Fact>> {
    let sql = format!("SELECT {FACT_COLUMNS} FROM facts WHERE id = ?1");
    conn.query_row(&sql, params![id.to_string()], row_to_fact)
        .optional()
}

/// The active fact with this exact triple, if any.
pub fn find_active_exact(
    conn: &Connection,
    subject: &EntityId,
    predicate: &str,
    object: &FactObject,
) -> rusqlite::Result<Option<Fact>> {
    let facts = match object {
        FactObject::Entity(id) => query_facts(
            conn,
            "WHERE subject_id = ?1 AND predicate = ?2 AND object_entity_id = ?3
               AND valid_until IS NULL",
            params![subject.as_str(), predicate, id.as_str()],
        )?,
        FactObject::Literal(value) => query_facts(
            conn,
            "WHERE subject_id = ?1 AND predicate = ?2 AND object_literal = ?3
               AND valid_until IS NULL",
            params![subject.as_str(), predicate, value],
        )?,
    };
    Ok(facts.into_iter().next())
}

/// All active facts sharing `(subject, predicate)`.
pub fn find_active(
    conn: &Connection,
    subject: &EntityId,
    predicate: &str,
) -> rusqlite::Result<Vec<Fact>> {
    query_facts(
        conn,
        "WHERE subject_id = ?1 AND predicate = ?2 AND valid_until IS NULL
         ORDER BY valid_from, id",
        params![subject.as_str(), predicate],
    )
}

pub fn active_with_predicate(conn: &Connection, predicate: &str) -> rusqlite::Result<Vec<Fact>> {
    query_facts(
        conn,
        "WHERE predicate = ?1 AND valid_until IS NULL ORDER BY valid_from, id",
        params![predicate],
    )
}

pub fn active_facts(conn: &Connection) -> rusqlite::Result<Vec<Fact>> {
    query_facts(conn, "WHERE valid_until IS NULL ORDER BY valid_from, id", params![])
}

/// Facts with `valid_from <= at < valid_until` (or no end).
pub fn facts_valid_at(conn: &Connection, at: DateTime<Utc>) -> rusqlite::Result<Vec<Fact>> {
    query_facts(
        conn,
        "WHERE valid_from <= ?1 AND (valid_until IS NULL OR valid_until > ?1)
         ORDER BY valid_from, id",
        params![encode_ts(at)],
    )
}

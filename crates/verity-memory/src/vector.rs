//! Vector Index – similarity ranking over fact text.
//!
//! The index is only a ranking aid: it may hold documents for facts that have
//! since been archived, so every hit must be re-validated against the ledger
//! before it is returned to a caller.
//!
//! Text is embedded through the [`Embedder`] trait.  [`HashingEmbedder`] is a
//! deterministic, model-free default (signed feature hashing over lowercase
//! tokens) that gives lexical-overlap similarity without any model files.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use verity_types::{Fact, SourceType};

// ─────────────────────────────────────────────────────────────────────────────
// Embedding
// ─────────────────────────────────────────────────────────────────────────────

/// Turns text into a dense vector.  Implementations must be deterministic.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
    fn dimensions(&self) -> usize;
}

/// Signed feature hashing of lowercase alphanumeric tokens, L2-normalised.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    /// `dimensions` is clamped to at least 1.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

/// 64-bit FNV-1a; stable across runs and platforms.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            let h = fnv1a(token.as_bytes());
            let slot = (h % self.dimensions as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[slot] += sign;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Compute the cosine similarity between two equal-length vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` if either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Documents
// ─────────────────────────────────────────────────────────────────────────────

/// Metadata mirrored from the ledger row at indexing time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub subject_id: String,
    pub predicate: String,
    pub object: String,
    pub valid_from: DateTime<Utc>,
    pub confidence: f64,
    pub source_type: SourceType,
}

#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub fact_id: Uuid,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
}

// ─────────────────────────────────────────────────────────────────────────────
// VectorIndex
// ─────────────────────────────────────────────────────────────────────────────

pub struct VectorIndex {
    embedder: Box<dyn Embedder>,
    documents: HashMap<Uuid, IndexedDocument>,
}

impl VectorIndex {
    pub fn new(embedder: Box<dyn Embedder>) -> Self {
        Self {
            embedder,
            documents: HashMap::new(),
        }
    }

    /// Index (or re-index) the document for `fact`.
    pub fn add(&mut self, fact: &Fact) {
        let text = fact.document_text();
        let embedding = self.embedder.embed(&text);
        self.documents.insert(
            fact.id,
            IndexedDocument {
                fact_id: fact.id,
                text,
                embedding,
                metadata: DocumentMetadata {
                    subject_id: fact.subject_id.to_string(),
                    predicate: fact.predicate.clone(),
                    object: fact.object.to_string(),
                    valid_from: fact.valid_from,
                    confidence: fact.confidence,
                    source_type: fact.source_type,
                },
            },
        );
    }

    pub fn remove(&mut self, fact_id: Uuid) -> bool {
        self.documents.remove(&fact_id).is_some()
    }

    pub fn get(&self, fact_id: Uuid) -> Option<&IndexedDocument> {
        self.documents.get(&fact_id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn clear(&mut self) {
        self.documents.clear();
    }

    /// Keep only the documents whose fact id satisfies `keep`; returns how
    /// many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&Uuid) -> bool) -> usize {
        let before = self.documents.len();
        self.documents.retain(|id, _| keep(id));
        before - self.documents.len()
    }

    /// The `top_k` documents most similar to `text`, highest first.  Equal
    /// scores are ordered by fact id so results are reproducible.
    pub fn query(&self, text: &str, top_k: usize) -> Vec<(Uuid, f32)> {
        if top_k == 0 {
            return Vec::new();
        }
        let query = self.embedder.embed(text);
        let mut scored: Vec<(Uuid, f32)> = self
            .documents
            .values()
            .map(|doc| (doc.fact_id, cosine_similarity(&doc.embedding, &query)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(top_k);
        scored
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new(Box::new(HashingEmbedder::default()))
    }
}

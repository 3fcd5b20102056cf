//! # verity-memory
//!
//! The Knowledge Store: what the agent currently believes, and what it used
//! to believe.
//!
//! ## Modules
//!
//! - [`ledger`] – SQLite system of record for entities and temporal facts.
//! - [`graph`] – in-memory `petgraph` mirror of the active facts, answering
//!   adjacency and `is_a` tag-closure queries.
//! - [`vector`] – similarity index over fact text with a pluggable
//!   [`Embedder`](vector::Embedder).
//! - [`store`] – [`KnowledgeStore`], composing the three: ingestion with
//!   contradiction resolution, temporal snapshots, hybrid search and episode
//!   folding.

pub mod graph;
pub mod ledger;
pub mod store;
pub mod vector;

pub use graph::{GraphCache, NodeKey};
pub use store::{
    ConsolidationReport, FactInput, KnowledgeStore, SleepReport, StoreConfig, StoreError,
    Summarizer,
};
pub use vector::{Embedder, HashingEmbedder, VectorIndex};

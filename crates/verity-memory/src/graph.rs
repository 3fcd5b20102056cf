//! Graph Cache – an in-memory multigraph mirror of the active facts.
//!
//! Uses `petgraph`'s [`StableDiGraph`] so that node and edge indices survive
//! edge removal; every fact maps to exactly one edge, keyed by fact id.
//! The cache is derived data: [`GraphCache::rebuild`] reconstructs it from
//! the ledger at any time.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use uuid::Uuid;
use verity_types::{Fact, FactObject, IS_A};

/// Graph node identity.  Entity ids and literal values live in separate
/// namespaces so that a literal `"42"` never aliases an entity `"42"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKey {
    Entity(String),
    Literal(String),
}

impl NodeKey {
    pub fn of_object(object: &FactObject) -> Self {
        match object {
            FactObject::Entity(id) => NodeKey::Entity(id.as_str().to_string()),
            FactObject::Literal(value) => NodeKey::Literal(value.clone()),
        }
    }

    /// The bare identifier or literal text.
    pub fn label(&self) -> &str {
        match self {
            NodeKey::Entity(id) | NodeKey::Literal(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FactEdge {
    pub fact_id: Uuid,
    pub predicate: String,
}

#[derive(Debug, Default)]
pub struct GraphCache {
    graph: StableDiGraph<NodeKey, FactEdge>,
    nodes: HashMap<NodeKey, NodeIndex>,
    edges: HashMap<Uuid, EdgeIndex>,
}

impl GraphCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_facts<'a>(facts: impl IntoIterator<Item = &'a Fact>) -> Self {
        let mut cache = Self::new();
        for fact in facts {
            cache.add_fact(fact);
        }
        cache
    }

    /// Discard everything and reload from `facts`.
    pub fn rebuild<'a>(&mut self, facts: impl IntoIterator<Item = &'a Fact>) {
        *self = Self::from_facts(facts);
    }

    fn ensure_node(&mut self, key: NodeKey) -> NodeIndex {
        if let Some(idx) = self.nodes.get(&key) {
            return *idx;
        }
        let idx = self.graph.add_node(key.clone());
        self.nodes.insert(key, idx);
        idx
    }

    /// Add the edge for `fact`.  Adding the same fact twice is a no-op.
    pub fn add_fact(&mut self, fact: &Fact) {
        if self.edges.contains_key(&fact.id) {
            return;
        }
        let subject = self.ensure_node(NodeKey::Entity(fact.subject_id.as_str().to_string()));
        let object = self.ensure_node(NodeKey::of_object(&fact.object));
        let edge = self.graph.add_edge(
            subject,
            object,
            FactEdge {
                fact_id: fact.id,
                predicate: fact.predicate.clone(),
            },
        );
        self.edges.insert(fact.id, edge);
    }

    /// Remove the edge for `fact_id`.  Returns `false` if it was not cached.
    pub fn remove_fact(&mut self, fact_id: Uuid) -> bool {
        match self.edges.remove(&fact_id) {
            Some(edge) => self.graph.remove_edge(edge).is_some(),
            None => false,
        }
    }

    pub fn contains_fact(&self, fact_id: Uuid) -> bool {
        self.edges.contains_key(&fact_id)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether an edge `subject --predicate--> object` is cached.
    pub fn has_edge(&self, subject: &str, predicate: &str, object: &FactObject) -> bool {
        let (Some(from), Some(to)) = (
            self.nodes.get(&NodeKey::Entity(subject.to_string())),
            self.nodes.get(&NodeKey::of_object(object)),
        ) else {
            return false;
        };
        self.graph
            .edges_connecting(*from, *to)
            .any(|e| e.weight().predicate == predicate)
    }

    /// Outgoing `(predicate, target)` pairs of an entity.
    pub fn outgoing(&self, subject: &str) -> Vec<(String, NodeKey)> {
        let Some(idx) = self.nodes.get(&NodeKey::Entity(subject.to_string())) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(*idx, Direction::Outgoing)
            .map(|e| (e.weight().predicate.clone(), self.graph[e.target()].clone()))
            .collect()
    }

    /// Breadth-first closure over `is_a` edges.
    ///
    /// Returns `tags` followed by every discovered ancestor, each once.  A
    /// parent is identified by its label whether it was stored as an entity
    /// or a literal, and traversal continues from the entity of that name.
    /// The visited set makes cycles harmless.
    pub fn parent_closure(&self, tags: &[String]) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut closure = Vec::new();
        let mut queue = VecDeque::new();
        let mut visited: HashSet<NodeIndex> = HashSet::new();

        for tag in tags {
            if seen.insert(tag.clone()) {
                closure.push(tag.clone());
            }
            if let Some(idx) = self.nodes.get(&NodeKey::Entity(tag.clone())) {
                queue.push_back(*idx);
            }
        }

        while let Some(idx) = queue.pop_front() {
            if !visited.insert(idx) {
                continue;
            }
            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                if edge.weight().predicate != IS_A {
                    continue;
                }
                let parent = self.graph[edge.target()].label();
                if seen.insert(parent.to_string()) {
                    closure.push(parent.to_string());
                }
                if let Some(next) = self.nodes.get(&NodeKey::Entity(parent.to_string())) {
                    if !visited.contains(next) {
                        queue.push_back(*next);
                    }
                }
            }
        }
        closure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use verity_types::{EntityId, SourceType};

    fn fact(subject: &str, predicate: &str, object: FactObject) -> Fact {
        Fact {
            id: Uuid::new_v4(),
            subject_id: EntityId::from(subject),
            predicate: predicate.into(),
            object,
            confidence: 1.0,
            source_type: SourceType::Axiom,
            valid_from: Utc::now(),
            valid_until: None,
        }
    }

    fn tags(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn add_and_remove_edges() {
        let mut g = GraphCache::new();
        let f = fact("x", "location", FactObject::literal("room_101"));
        g.add_fact(&f);
        g.add_fact(&f);
        assert_eq!(g.edge_count(), 1);
        assert!(g.has_edge("x", "location", &FactObject::literal("room_101")));

        assert!(g.remove_fact(f.id));
        assert!(!g.remove_fact(f.id));
        assert!(!g.has_edge("x", "location", &FactObject::literal("room_101")));
    }

    #[test]
    fn literal_and_entity_objects_do_not_alias() {
        let mut g = GraphCache::new();
        g.add_fact(&fact("x", "likes", FactObject::entity("y")));
        assert!(g.has_edge("x", "likes", &FactObject::entity("y")));
        assert!(!g.has_edge("x", "likes", &FactObject::literal("y")));
    }

    #[test]
    fn closure_walks_chains_of_entities_and_literals() {
        let mut g = GraphCache::new();
        g.add_fact(&fact("poodle", IS_A, FactObject::entity("dog")));
        g.add_fact(&fact("dog", IS_A, FactObject::literal("mammal")));
        g.add_fact(&fact("mammal", IS_A, FactObject::entity("animal")));
        g.add_fact(&fact("dog", "color", FactObject::literal("brown")));

        let closure = g.parent_closure(&tags(&["poodle"]));
        assert_eq!(closure, tags(&["poodle", "dog", "mammal", "animal"]));
    }

    #[test]
    fn closure_terminates_on_cycles() {
        let mut g = GraphCache::new();
        g.add_fact(&fact("a", IS_A, FactObject::entity("b")));
        g.add_fact(&fact("b", IS_A, FactObject::entity("a")));

        let closure: HashSet<String> = g.parent_closure(&tags(&["a"])).into_iter().collect();
        assert_eq!(closure, HashSet::from(["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn closure_of_unknown_tag_is_itself() {
        let g = GraphCache::new();
        assert_eq!(g.parent_closure(&tags(&["lonely"])), tags(&["lonely"]));
    }

    #[test]
    fn rebuild_replaces_contents() {
        let mut g = GraphCache::new();
        g.add_fact(&fact("x", "p", FactObject::literal("1")));
        let fresh = fact("y", "p", FactObject::literal("2"));
        g.rebuild([&fresh]);
        assert_eq!(g.edge_count(), 1);
        assert!(g.contains_fact(fresh.id));
        assert_eq!(g.outgoing("y"), vec![("p".to_string(), NodeKey::Literal("2".into()))]);
        assert!(g.outgoing("x").is_empty());
    }
}

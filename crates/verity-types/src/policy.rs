//! Principles and judgement payloads.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A rule-based value the agent holds.
///
/// `logic` is a JSON rule tree interpreted by the policy evaluator; it
/// evaluates to a cost, where `+inf` is a hard veto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Principle {
    pub id: String,
    /// The value this principle protects, e.g. `"val.privacy"`.
    pub affects: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub logic: Value,
}

impl Principle {
    pub fn new(id: impl Into<String>, affects: impl Into<String>, logic: Value) -> Self {
        Self {
            id: id.into(),
            affects: affects.into(),
            description: None,
            logic,
        }
    }
}

/// Everything a principle may inspect about a candidate action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JudgementContext {
    pub agent_id: String,
    pub action_id: String,
    #[serde(default)]
    pub action_args: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub world_state: Map<String, Value>,
}

impl JudgementContext {
    pub fn new(agent_id: impl Into<String>, action_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            action_id: action_id.into(),
            action_args: Map::new(),
            tags: Vec::new(),
            world_state: Map::new(),
        }
    }

    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.action_args = args;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_world_state(mut self, world_state: Map<String, Value>) -> Self {
        self.world_state = world_state;
        self
    }
}

/// One principle's share of a judgement's cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostContribution {
    pub principle_id: String,
    pub cost: f64,
    pub affects: String,
}

/// Outcome of a judgement that was not vetoed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgementResult {
    pub allowed: bool,
    pub total_cost: f64,
    /// Principles with a strictly positive cost, in evaluation order.
    pub breakdown: Vec<CostContribution>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn judgement_context_wire_defaults() {
        let ctx: JudgementContext =
            serde_json::from_value(json!({"agent_id": "a", "action_id": "open_door"})).unwrap();
        assert!(ctx.action_args.is_empty());
        assert!(ctx.tags.is_empty());
        assert!(ctx.world_state.is_empty());
    }

    #[test]
    fn principle_wire_format_without_description() {
        let p: Principle = serde_json::from_value(json!({
            "id": "p.no_nukes",
            "affects": "safety",
            "logic": {"==": [{"var": "action.id"}, "launch_nukes"]}
        }))
        .unwrap();
        assert_eq!(p.id, "p.no_nukes");
        assert!(p.description.is_none());
        let back = serde_json::to_value(&p).unwrap();
        assert!(back.get("description").is_none());
    }

    #[test]
    fn builder_sets_tags() {
        let ctx = JudgementContext::new("a", "eat").with_tags(["food", "snack"]);
        assert_eq!(ctx.tags, vec!["food".to_string(), "snack".to_string()]);
    }
}

//! Skills, goals and plans.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::policy::Principle;

/// The planning view of a skill: what it needs and what it achieves.
/// Execution lives elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Skill {
    pub id: String,
    #[serde(default)]
    pub preconditions: BTreeMap<String, String>,
    #[serde(default)]
    pub postconditions: BTreeMap<String, String>,
}

impl Skill {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            preconditions: BTreeMap::new(),
            postconditions: BTreeMap::new(),
        }
    }

    pub fn requires(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.preconditions.insert(key.into(), value.into());
        self
    }

    pub fn achieves(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.postconditions.insert(key.into(), value.into());
        self
    }

    /// `"achieves k1=v1, k2=v2"`
    pub fn rationale(&self) -> String {
        let mut out = String::from("achieves ");
        for (i, (k, v)) in self.postconditions.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{k}={v}");
        }
        out
    }
}

/// A desired world state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub description: String,
    pub target_state: BTreeMap<String, String>,
}

impl Goal {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            target_state: BTreeMap::new(),
        }
    }

    pub fn with_target(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.target_state.insert(key.into(), value.into());
        self
    }
}

/// The agent a plan is made for.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    #[serde(default)]
    pub allowed_skills: Vec<String>,
    #[serde(default)]
    pub principles: Vec<Principle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub skill_id: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Base plus moral cost of this transition.
    pub cost: f64,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// An ordered sequence of skills.  An empty plan means no path was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    pub total_cost: f64,
    #[serde(default)]
    pub risk_score: f64,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
    #[serde(default)]
    pub confidence_rationale: Option<String>,
}

fn default_confidence() -> f64 {
    1.0
}

impl Plan {
    pub fn empty() -> Self {
        Self {
            steps: Vec::new(),
            total_cost: 0.0,
            risk_score: 0.0,
            confidence_score: default_confidence(),
            confidence_rationale: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn skill_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.skill_id.as_str()).collect()
    }
}

impl Default for Plan {
    fn default() -> Self {
        Self::empty()
    }
}

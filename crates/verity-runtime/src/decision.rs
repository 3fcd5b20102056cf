//! [`DecisionCore`] – explicit composition of store, evaluator and planner.
//!
//! There is no process-wide default instance: the host builds one from a
//! [`CoreConfig`] at startup and passes it where it is needed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use verity_kernel::{Evaluator, EvaluatorConfig};
use verity_memory::{KnowledgeStore, StoreConfig, StoreError, Summarizer};
use verity_types::{AgentProfile, Goal, Plan, TagHierarchy};

use crate::planner::{Planner, PlannerConfig};
use crate::skills::SkillRegistry;

/// Configuration of every core component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub store: StoreConfig,
    pub evaluator: EvaluatorConfig,
    pub planner: PlannerConfig,
}

pub struct DecisionCore {
    store: Arc<KnowledgeStore>,
    evaluator: Arc<Evaluator>,
    planner: Planner,
}

impl DecisionCore {
    pub fn new(config: CoreConfig) -> Result<Self, StoreError> {
        Self::build(config, None)
    }

    /// Like [`DecisionCore::new`], with a summarizer for episode folding.
    pub fn with_summarizer(
        config: CoreConfig,
        summarizer: Box<dyn Summarizer>,
    ) -> Result<Self, StoreError> {
        Self::build(config, Some(summarizer))
    }

    fn build(config: CoreConfig, summarizer: Option<Box<dyn Summarizer>>) -> Result<Self, StoreError> {
        let mut store = KnowledgeStore::open(config.store)?;
        if let Some(summarizer) = summarizer {
            store = store.with_summarizer(summarizer);
        }
        let store = Arc::new(store);
        let evaluator = Arc::new(Evaluator::new(config.evaluator));
        let hierarchy: Arc<dyn TagHierarchy> = store.clone();
        let planner = Planner::new(config.planner, Arc::clone(&evaluator), SkillRegistry::new())
            .with_tag_hierarchy(hierarchy);
        info!(
            ledger = store.config().db_path.as_deref().unwrap_or(":memory:"),
            safety_mode = ?evaluator.config().safety_mode,
            "decision core ready"
        );
        Ok(Self {
            store,
            evaluator,
            planner,
        })
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    pub fn evaluator(&self) -> &Arc<Evaluator> {
        &self.evaluator
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn skills(&self) -> &SkillRegistry {
        self.planner.skills()
    }

    pub fn skills_mut(&mut self) -> &mut SkillRegistry {
        self.planner.skills_mut()
    }

    /// Snapshot the store now and plan from that snapshot.
    ///
    /// Taking the snapshot drains the store's event queue.
    pub fn plan_for(&self, agent: &AgentProfile, goal: &Goal) -> Result<Plan, StoreError> {
        let world = self.store.get_world_state(None)?;
        Ok(self.planner.generate_plan(agent, goal, &world))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verity_memory::FactInput;
    use verity_types::{FactObject, IS_A, Principle, Skill};

    fn core() -> DecisionCore {
        let mut core = DecisionCore::new(CoreConfig::default()).unwrap();
        core.skills_mut().extend([
            Skill::new("get_key").achieves("has_key", "true"),
            Skill::new("open_door")
                .requires("has_key", "true")
                .achieves("door_open", "true"),
            Skill::new("kick_door").achieves("door_open", "true"),
        ]);
        core
    }

    fn agent(principles: Vec<Principle>) -> AgentProfile {
        AgentProfile {
            id: "robot".into(),
            allowed_skills: vec!["get_key".into(), "open_door".into(), "kick_door".into()],
            principles,
        }
    }

    #[test]
    fn plans_from_store_snapshot() {
        let core = core();
        core.store()
            .ingest_fact(FactInput::new("robot", "has_key", FactObject::literal("true")))
            .unwrap();
        let goal = Goal::new("leave").with_target("door_open", "true");
        let plan = core.plan_for(&agent(Vec::new()), &goal).unwrap();
        // Both `open_door` and `kick_door` are one step away; insertion order
        // breaks the tie in favour of the first allowed skill.
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.total_cost, 1.0);
    }

    #[test]
    fn store_tag_hierarchy_reaches_principles() {
        let core = core();
        core.store()
            .ingest_fact(FactInput::new("kick_door", IS_A, FactObject::entity("violent")))
            .unwrap();
        let no_violence = Principle::new(
            "p.no_violence",
            "val.safety",
            json!({"if": [{"in": ["violent", {"var": "tags"}]}, "inf", 0]}),
        );
        let goal = Goal::new("leave").with_target("door_open", "true");
        let plan = core.plan_for(&agent(vec![no_violence]), &goal).unwrap();
        assert_eq!(plan.skill_ids(), ["get_key", "open_door"]);
        assert!(
            core.evaluator()
                .history()
                .iter()
                .any(|r| r.veto && r.action_id == "kick_door")
        );
    }

    #[test]
    fn config_deserialises_with_partial_sections() {
        let config: CoreConfig = serde_json::from_value(json!({
            "evaluator": {"safety_mode": "fail_open"},
            "planner": {"max_expansions": 50}
        }))
        .unwrap();
        assert_eq!(config.planner.max_expansions, 50);
        assert_eq!(config.planner.base_cost, 1.0);
        assert_eq!(config.evaluator.audit_capacity, 100);
        assert_eq!(config.store.fold_threshold, 3);
    }
}

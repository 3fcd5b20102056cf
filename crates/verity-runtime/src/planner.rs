//! [`Planner`] – goal-oriented action planning.
//!
//! # Algorithm
//!
//! A*-style best-first search over abstract world states, where a state is a
//! sorted `key → value` map extracted from a [`WorldState`] snapshot:
//!
//! - `"{subject}:{predicate}" → object` for every fact, plus
//! - `predicate → object` for facts about the planning agent itself.
//!
//! - g(n) = accumulated cost: per transition, the base cost plus the moral
//!   cost the [`Evaluator`] assigns to the skill.
//! - h(n) = number of goal entries the state does not yet satisfy.
//!
//! The frontier is ordered by `(g + h, g)`; remaining ties are broken by
//! insertion order.  A vetoed transition is pruned, never fatal.  The first
//! goal state popped from the frontier ends the search; an exhausted
//! frontier (or expansion budget) yields [`Plan::empty`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::Utc;
//! use verity_kernel::Evaluator;
//! use verity_runtime::{Planner, PlannerConfig, SkillRegistry};
//! use verity_types::{AgentProfile, Goal, Skill, WorldState};
//!
//! let skills: SkillRegistry = [
//!     Skill::new("get_key").achieves("has_key", "true"),
//!     Skill::new("open_door")
//!         .requires("has_key", "true")
//!         .achieves("door_open", "true"),
//! ]
//! .into_iter()
//! .collect();
//! let planner = Planner::new(PlannerConfig::default(), Arc::new(Evaluator::default()), skills);
//!
//! let agent = AgentProfile {
//!     id: "agent".into(),
//!     allowed_skills: vec!["open_door".into(), "get_key".into()],
//!     principles: Vec::new(),
//! };
//! let goal = Goal::new("get out").with_target("door_open", "true");
//!
//! let plan = planner.generate_plan(&agent, &goal, &WorldState::empty(Utc::now()));
//! assert_eq!(plan.skill_ids(), ["get_key", "open_door"]);
//! assert_eq!(plan.total_cost, 2.0);
//! ```

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use verity_kernel::Evaluator;
use verity_types::{
    AgentProfile, Goal, JudgementContext, Plan, PlanStep, Skill, TagHierarchy, WorldState,
};

use crate::skills::SkillRegistry;

/// Canonical planning state.
pub type State = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Cost of every transition before moral cost is added.
    pub base_cost: f64,
    /// States expanded before the search gives up.
    pub max_expansions: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            base_cost: 1.0,
            max_expansions: 10_000,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Flatten a snapshot into planning state.  Later facts win on key clashes.
pub fn extract_state(agent_id: &str, world: &WorldState) -> State {
    let mut state = State::new();
    for fact in &world.facts {
        let value = fact.object.to_string();
        state.insert(
            format!("{}:{}", fact.subject_id, fact.predicate),
            value.clone(),
        );
        if fact.subject_id.as_str() == agent_id {
            state.insert(fact.predicate.clone(), value);
        }
    }
    state
}

/// Every `(key, value)` in `conditions` is present and equal in `state`.
pub fn satisfies(state: &State, conditions: &BTreeMap<String, String>) -> bool {
    conditions.iter().all(|(k, v)| state.get(k) == Some(v))
}

fn unmet(state: &State, target: &BTreeMap<String, String>) -> f64 {
    target.iter().filter(|(k, v)| state.get(*k) != Some(*v)).count() as f64
}

/// The state as the `world_state` map handed to the evaluator.
pub fn state_map(state: &State) -> Map<String, Value> {
    state
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Search bookkeeping
// ─────────────────────────────────────────────────────────────────────────────

/// Arena node; `parent` indexes back into the arena.
struct SearchNode {
    state: State,
    parent: Option<usize>,
    step: Option<PlanStep>,
    moral_cost: f64,
}

/// Frontier entry.  Ordering is reversed so `BinaryHeap` pops the smallest
/// `(f, g, seq)` first.
#[derive(Debug, Clone, Copy)]
struct FrontierEntry {
    f_score: f64,
    g_score: f64,
    seq: u64,
    node: usize,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierEntry {}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.g_score.total_cmp(&self.g_score))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Planner
// ─────────────────────────────────────────────────────────────────────────────

pub struct Planner {
    config: PlannerConfig,
    evaluator: Arc<Evaluator>,
    skills: SkillRegistry,
    tags: Option<Arc<dyn TagHierarchy>>,
}

impl Planner {
    pub fn new(config: PlannerConfig, evaluator: Arc<Evaluator>, skills: SkillRegistry) -> Self {
        Self {
            config,
            evaluator,
            skills,
            tags: None,
        }
    }

    /// Expand judgement tags through `hierarchy` for every transition.
    pub fn with_tag_hierarchy(mut self, hierarchy: Arc<dyn TagHierarchy>) -> Self {
        self.tags = Some(hierarchy);
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn skills(&self) -> &SkillRegistry {
        &self.skills
    }

    pub fn skills_mut(&mut self) -> &mut SkillRegistry {
        &mut self.skills
    }

    /// Moral cost of moving into `next` via `skill`, or `None` on a veto.
    ///
    /// The judgement is tagged with the skill id so `is_a` facts about the
    /// skill reach the principles.
    fn moral_cost(&self, agent: &AgentProfile, skill: &Skill, next: &State) -> Option<f64> {
        let context = JudgementContext::new(agent.id.clone(), skill.id.clone())
            .with_tags([skill.id.clone()])
            .with_world_state(state_map(next));
        match self
            .evaluator
            .judge(context, &agent.principles, self.tags.as_deref())
        {
            Ok(judgement) => Some(judgement.total_cost),
            Err(violation) => {
                debug!(skill = %skill.id, principle = %violation.principle_id, "transition pruned");
                None
            }
        }
    }

    /// Search for the cheapest skill sequence taking `world` to `goal`.
    pub fn generate_plan(&self, agent: &AgentProfile, goal: &Goal, world: &WorldState) -> Plan {
        let allowed: Vec<&Skill> = self.skills.resolve(&agent.allowed_skills).collect();
        let start = extract_state(&agent.id, world);

        let mut frontier = BinaryHeap::new();
        frontier.push(FrontierEntry {
            f_score: unmet(&start, &goal.target_state),
            g_score: 0.0,
            seq: 0,
            node: 0,
        });
        let mut nodes = vec![SearchNode {
            state: start,
            parent: None,
            step: None,
            moral_cost: 0.0,
        }];
        let mut visited: HashSet<State> = HashSet::new();
        let mut seq = 0u64;
        let mut expansions = 0usize;

        while let Some(entry) = frontier.pop() {
            let state = nodes[entry.node].state.clone();
            if visited.contains(&state) {
                continue;
            }
            if satisfies(&state, &goal.target_state) {
                let plan = reconstruct(&nodes, entry.node, entry.g_score);
                info!(
                    agent = %agent.id,
                    goal = %goal.description,
                    steps = plan.steps.len(),
                    total_cost = plan.total_cost,
                    expansions,
                    "plan found"
                );
                return plan;
            }
            if expansions >= self.config.max_expansions {
                warn!(
                    agent = %agent.id,
                    goal = %goal.description,
                    max_expansions = self.config.max_expansions,
                    "expansion budget exhausted"
                );
                return Plan::empty();
            }
            expansions += 1;
            visited.insert(state.clone());

            for skill in &allowed {
                if !satisfies(&state, &skill.preconditions) {
                    continue;
                }
                let mut next = state.clone();
                next.extend(
                    skill
                        .postconditions
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone())),
                );
                if visited.contains(&next) {
                    continue;
                }
                let Some(moral_cost) = self.moral_cost(agent, skill, &next) else {
                    continue;
                };

                let step_cost = self.config.base_cost + moral_cost;
                let g_score = entry.g_score + step_cost;
                seq += 1;
                frontier.push(FrontierEntry {
                    f_score: g_score + unmet(&next, &goal.target_state),
                    g_score,
                    seq,
                    node: nodes.len(),
                });
                nodes.push(SearchNode {
                    state: next,
                    parent: Some(entry.node),
                    step: Some(PlanStep {
                        skill_id: skill.id.clone(),
                        params: Map::new(),
                        cost: step_cost,
                        rationale: Some(skill.rationale()),
                    }),
                    moral_cost,
                });
            }
        }

        debug!(agent = %agent.id, goal = %goal.description, expansions, "no plan reaches the goal");
        Plan::empty()
    }
}

fn reconstruct(nodes: &[SearchNode], goal_node: usize, total_cost: f64) -> Plan {
    let mut steps = Vec::new();
    let mut risk_score = 0.0;
    let mut cursor = Some(goal_node);
    while let Some(idx) = cursor {
        let node = &nodes[idx];
        if let Some(step) = &node.step {
            steps.push(step.clone());
            risk_score += node.moral_cost;
        }
        cursor = node.parent;
    }
    steps.reverse();
    Plan {
        steps,
        total_cost,
        risk_score,
        ..Plan::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use verity_kernel::EvaluatorConfig;
    use verity_types::{EntityId, Fact, FactObject, Principle, SourceType};

    fn planner(skills: Vec<Skill>) -> Planner {
        Planner::new(
            PlannerConfig::default(),
            Arc::new(Evaluator::new(EvaluatorConfig::default())),
            skills.into_iter().collect(),
        )
    }

    fn agent(allowed: &[&str], principles: Vec<Principle>) -> AgentProfile {
        AgentProfile {
            id: "agent".into(),
            allowed_skills: allowed.iter().map(|s| s.to_string()).collect(),
            principles,
        }
    }

    fn door_skills() -> Vec<Skill> {
        vec![
            Skill::new("A").achieves("has_key", "true"),
            Skill::new("B")
                .requires("has_key", "true")
                .achieves("door_open", "true"),
        ]
    }

    fn empty_world() -> WorldState {
        WorldState::empty(Utc::now())
    }

    fn veto_action(action: &str) -> Principle {
        Principle::new(
            format!("p.no_{action}"),
            "safety",
            json!({"if": [{"==": [{"var": "action.id"}, action]}, "inf", 0]}),
        )
    }

    #[test]
    fn finds_minimal_two_step_plan() {
        let planner = planner(door_skills());
        let goal = Goal::new("open the door").with_target("door_open", "true");
        let plan = planner.generate_plan(&agent(&["B", "A"], Vec::new()), &goal, &empty_world());

        assert_eq!(plan.skill_ids(), ["A", "B"]);
        assert_eq!(plan.total_cost, 2.0);
        assert_eq!(plan.risk_score, 0.0);
        assert_eq!(plan.steps[0].cost, 1.0);
        assert!(plan.steps[0].params.is_empty());
        assert_eq!(plan.steps[1].rationale.as_deref(), Some("achieves door_open=true"));
    }

    #[test]
    fn unreachable_goal_yields_empty_plan() {
        let planner = planner(door_skills());
        let goal = Goal::new("fly").with_target("airborne", "true");
        let plan = planner.generate_plan(&agent(&["A", "B"], Vec::new()), &goal, &empty_world());
        assert!(plan.is_empty());
        assert_eq!(plan.total_cost, 0.0);
    }

    #[test]
    fn skills_outside_allowed_list_are_ignored() {
        let planner = planner(door_skills());
        let goal = Goal::new("open the door").with_target("door_open", "true");
        let plan = planner.generate_plan(&agent(&["B"], Vec::new()), &goal, &empty_world());
        assert!(plan.is_empty());
    }

    #[test]
    fn already_satisfied_goal_needs_no_steps() {
        let planner = planner(door_skills());
        let mut world = empty_world();
        world.facts.push(Fact {
            id: uuid::Uuid::new_v4(),
            subject_id: EntityId::from("agent"),
            predicate: "door_open".into(),
            object: FactObject::literal("true"),
            confidence: 1.0,
            source_type: SourceType::Axiom,
            valid_from: Utc::now(),
            valid_until: None,
        });
        let goal = Goal::new("open the door").with_target("door_open", "true");
        let plan = planner.generate_plan(&agent(&["A", "B"], Vec::new()), &goal, &world);
        assert!(plan.is_empty());
    }

    #[test]
    fn vetoed_skills_are_routed_around() {
        let mut skills = door_skills();
        skills.push(Skill::new("smash").achieves("door_open", "true"));
        let planner = planner(skills);
        let goal = Goal::new("open the door").with_target("door_open", "true");

        let free = planner.generate_plan(&agent(&["A", "B", "smash"], Vec::new()), &goal, &empty_world());
        assert_eq!(free.skill_ids(), ["smash"]);

        let careful = planner.generate_plan(
            &agent(&["A", "B", "smash"], vec![veto_action("smash")]),
            &goal,
            &empty_world(),
        );
        assert_eq!(careful.skill_ids(), ["A", "B"]);
    }

    #[test]
    fn moral_cost_steers_towards_cheaper_path() {
        let mut skills = door_skills();
        skills.push(Skill::new("smash").achieves("door_open", "true"));
        let planner = planner(skills);
        let goal = Goal::new("open the door").with_target("door_open", "true");
        let vandalism = Principle::new(
            "p.property",
            "val.property",
            json!({"if": [{"==": [{"var": "action.id"}, "smash"]}, 5, 0]}),
        );

        let plan = planner.generate_plan(
            &agent(&["A", "B", "smash"], vec![vandalism]),
            &goal,
            &empty_world(),
        );
        assert_eq!(plan.skill_ids(), ["A", "B"]);
        assert_eq!(plan.total_cost, 2.0);
    }

    #[test]
    fn risk_score_sums_moral_cost() {
        let planner = planner(door_skills());
        let goal = Goal::new("open the door").with_target("door_open", "true");
        let toll = Principle::new("p.toll", "val.cost", json!(0.5));
        let plan = planner.generate_plan(&agent(&["A", "B"], vec![toll]), &goal, &empty_world());
        assert_eq!(plan.skill_ids(), ["A", "B"]);
        assert_eq!(plan.total_cost, 3.0);
        assert_eq!(plan.risk_score, 1.0);
        assert_eq!(plan.steps[0].cost, 1.5);
    }

    #[test]
    fn expansion_budget_is_respected() {
        let planner = Planner::new(
            PlannerConfig {
                max_expansions: 1,
                ..PlannerConfig::default()
            },
            Arc::new(Evaluator::default()),
            door_skills().into_iter().collect(),
        );
        let goal = Goal::new("open the door").with_target("door_open", "true");
        let plan = planner.generate_plan(&agent(&["A", "B"], Vec::new()), &goal, &empty_world());
        assert!(plan.is_empty());
    }

    #[test]
    fn state_extraction_adds_agent_shorthand() {
        let mut world = empty_world();
        for (subject, predicate, value) in [("agent", "location", "hall"), ("door", "state", "closed")] {
            world.facts.push(Fact {
                id: uuid::Uuid::new_v4(),
                subject_id: EntityId::from(subject),
                predicate: predicate.into(),
                object: FactObject::literal(value),
                confidence: 1.0,
                source_type: SourceType::Inference,
                valid_from: Utc::now(),
                valid_until: None,
            });
        }
        let state = extract_state("agent", &world);
        assert_eq!(state.get("agent:location").map(String::as_str), Some("hall"));
        assert_eq!(state.get("location").map(String::as_str), Some("hall"));
        assert_eq!(state.get("door:state").map(String::as_str), Some("closed"));
        assert!(!state.contains_key("state"));
    }
}

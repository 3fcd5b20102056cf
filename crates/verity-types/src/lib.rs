//! `verity-types` – the shared data model of the decision substrate.
//!
//! - [`fact`] – entities, temporal facts, world snapshots and transient
//!   events produced by the knowledge store.
//! - [`policy`] – principles and the judgement context/result exchanged with
//!   the policy evaluator.
//! - [`plan`] – skills, goals, agent profiles and the plans produced by the
//!   planner.
//!
//! The [`TagHierarchy`] trait is the seam between the evaluator and the
//! knowledge store: the evaluator only needs tag closure, not the store.

pub mod fact;
pub mod plan;
pub mod policy;

pub use fact::{
    Entity, EntityId, Event, Fact, FactObject, FactObjectError, SourceType, WorldState, IS_A,
};
pub use plan::{AgentProfile, Goal, Plan, PlanStep, Skill};
pub use policy::{CostContribution, JudgementContext, JudgementResult, Principle};

/// Anything that can expand a tag list with its transitive `is_a` ancestors.
pub trait TagHierarchy: Send + Sync {
    /// Return the input tags followed by every ancestor reachable through
    /// [`IS_A`] edges, without duplicates.
    fn get_all_parent_tags(&self, tags: &[String]) -> Vec<String>;
}

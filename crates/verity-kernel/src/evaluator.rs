//! [`Evaluator`] – prices a candidate action against a set of principles.
//!
//! Each principle's rule tree is evaluated against an evaluation record built
//! from the [`JudgementContext`].  Costs are summed; a principle that costs
//! `+inf` vetoes the action outright and [`Evaluator::judge`] returns a
//! [`PolicyViolation`] without looking at the remaining principles.
//!
//! A rule that fails to parse or evaluate never escapes `judge`: it is priced
//! at the sentinel of the configured [`SafetyMode`] (`+inf` when failing
//! closed, `0` when failing open).
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use verity_kernel::{Evaluator, EvaluatorConfig};
//! use verity_types::{JudgementContext, Principle};
//!
//! let evaluator = Evaluator::new(EvaluatorConfig::default());
//! let principles = vec![Principle::new(
//!     "p.no_nukes",
//!     "safety",
//!     json!({"if": [{"==": [{"var": "action.id"}, "launch_nukes"]}, "inf", 0]}),
//! )];
//!
//! let wave = JudgementContext::new("agent", "wave");
//! assert_eq!(evaluator.judge(wave, &principles, None).unwrap().total_cost, 0.0);
//!
//! let launch = JudgementContext::new("agent", "launch_nukes");
//! let violation = evaluator.judge(launch, &principles, None).unwrap_err();
//! assert_eq!(violation.principle_id, "p.no_nukes");
//! assert!(evaluator.history().last().unwrap().veto);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use verity_types::{CostContribution, JudgementContext, JudgementResult, Principle, TagHierarchy};

use crate::audit::{AuditLog, JudgementRecord};
use crate::logic::{self, Rule};

const VETO_REASON: &str = "principle evaluated to infinity (hard veto)";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// How a malformed rule is priced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyMode {
    /// Malformed rules cost `+inf` and therefore veto.
    #[default]
    FailClosed,
    /// Malformed rules cost nothing.
    FailOpen,
}

impl SafetyMode {
    pub fn sentinel(self) -> f64 {
        match self {
            SafetyMode::FailClosed => f64::INFINITY,
            SafetyMode::FailOpen => 0.0,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fail_closed" => Some(SafetyMode::FailClosed),
            "fail_open" => Some(SafetyMode::FailOpen),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub safety_mode: SafetyMode,
    /// Judgements kept in the audit history.
    pub audit_capacity: usize,
    /// Cached `(rule, data)` results.
    pub cache_capacity: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            safety_mode: SafetyMode::FailClosed,
            audit_capacity: 100,
            cache_capacity: 1024,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PolicyViolation
// ─────────────────────────────────────────────────────────────────────────────

/// A hard veto.  The candidate action is infeasible.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("policy violation by '{principle_id}': {reason}")]
pub struct PolicyViolation {
    pub principle_id: String,
    pub reason: String,
    /// The evaluation record the principle was judged against.
    pub record: Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// Result cache
// ─────────────────────────────────────────────────────────────────────────────

type CacheKey = (String, String);

/// Bounded FIFO cache of `(rule json, data json) → cost`.
#[derive(Debug)]
struct ResultCache {
    capacity: usize,
    costs: HashMap<CacheKey, f64>,
    order: VecDeque<CacheKey>,
}

impl ResultCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            costs: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &CacheKey) -> Option<f64> {
        self.costs.get(key).copied()
    }

    fn insert(&mut self, key: CacheKey, cost: f64) {
        if self.capacity == 0 || self.costs.contains_key(&key) {
            return;
        }
        while self.order.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.costs.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.costs.insert(key, cost);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Evaluator
// ─────────────────────────────────────────────────────────────────────────────

/// Thread-safe policy evaluator.  Share it as `Arc<Evaluator>`.
pub struct Evaluator {
    config: EvaluatorConfig,
    audit: Mutex<AuditLog>,
    cache: Mutex<ResultCache>,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self {
            audit: Mutex::new(AuditLog::new(config.audit_capacity)),
            cache: Mutex::new(ResultCache::new(config.cache_capacity)),
            config,
        }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    fn audit(&self) -> MutexGuard<'_, AuditLog> {
        self.audit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache(&self) -> MutexGuard<'_, ResultCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Judge `context` against `principles`.
    ///
    /// When `tags` is given, the context's tags are replaced by their
    /// closure before any principle runs.
    pub fn judge(
        &self,
        mut context: JudgementContext,
        principles: &[Principle],
        tags: Option<&dyn TagHierarchy>,
    ) -> Result<JudgementResult, PolicyViolation> {
        if let Some(hierarchy) = tags {
            context.tags = hierarchy.get_all_parent_tags(&context.tags);
        }
        let record = evaluation_record(&context);
        let data_key = record.to_string();

        let mut total_cost = 0.0;
        let mut breakdown = Vec::new();
        for principle in principles {
            let cost = self.cost_of(principle, &record, &data_key);
            if cost == f64::INFINITY {
                warn!(
                    agent = %context.agent_id,
                    action = %context.action_id,
                    principle = %principle.id,
                    "action vetoed"
                );
                self.audit().record(JudgementRecord::vetoed(
                    &context.agent_id,
                    &context.action_id,
                    &principle.id,
                    VETO_REASON,
                ));
                return Err(PolicyViolation {
                    principle_id: principle.id.clone(),
                    reason: VETO_REASON.to_string(),
                    record,
                });
            }
            if cost > 0.0 {
                debug!(principle = %principle.id, affects = %principle.affects, cost, "principle contributes");
                total_cost += cost;
                breakdown.push(CostContribution {
                    principle_id: principle.id.clone(),
                    cost,
                    affects: principle.affects.clone(),
                });
            }
        }

        if breakdown.is_empty() {
            debug!(action = %context.action_id, "clean judgement");
        } else {
            info!(action = %context.action_id, total_cost, "judgement");
        }
        self.audit().record(JudgementRecord::clean(
            &context.agent_id,
            &context.action_id,
            total_cost,
            breakdown.clone(),
        ));
        Ok(JudgementResult {
            allowed: true,
            total_cost,
            breakdown,
        })
    }

    fn cost_of(&self, principle: &Principle, record: &Value, data_key: &str) -> f64 {
        let key = (principle.logic.to_string(), data_key.to_string());
        if let Some(cost) = self.cache().get(&key) {
            return cost;
        }
        let cost = match Rule::parse(&principle.logic)
            .and_then(|rule| rule.evaluate(record))
            .and_then(|value| logic::cost_of(&value))
        {
            Ok(cost) => cost,
            Err(e) => {
                let sentinel = self.config.safety_mode.sentinel();
                error!(principle = %principle.id, error = %e, sentinel, "rule evaluation failed");
                sentinel
            }
        };
        self.cache().insert(key, cost);
        cost
    }

    /// Audit entries, oldest first.
    pub fn history(&self) -> Vec<JudgementRecord> {
        self.audit().entries().cloned().collect()
    }

    pub fn clear_history(&self) {
        self.audit().clear();
    }

    /// Number of cached rule results.
    pub fn cached_results(&self) -> usize {
        self.cache().costs.len()
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(EvaluatorConfig::default())
    }
}

/// The data record principles are evaluated against.
///
/// `action` merges the action id with its arguments so rules can address
/// `action.id` and `action.<arg>` alike.
pub fn evaluation_record(context: &JudgementContext) -> Value {
    let mut action = Map::new();
    action.insert("id".to_string(), Value::String(context.action_id.clone()));
    for (key, value) in &context.action_args {
        action.insert(key.clone(), value.clone());
    }
    json!({
        "agent_id": context.agent_id,
        "action_id": context.action_id,
        "action_args": context.action_args,
        "action": action,
        "tags": context.tags,
        "world_state": context.world_state,
    })
}

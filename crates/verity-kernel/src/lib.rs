//! `verity-kernel` – Policy Evaluation
//!
//! Prices candidate actions against the agent's principles and enforces hard
//! vetoes. It does not plan; it judges and keeps a record of every judgement.
//!
//! # Modules
//!
//! - [`logic`] – the rule language principles are written in: parsing into
//!   the closed [`Rule`][logic::Rule] type, evaluation against a JSON record,
//!   and the mapping from a rule result to a cost.
//! - [`audit`] – [`AuditLog`][audit::AuditLog]: a bounded FIFO history of
//!   clean and vetoed judgements.
//! - [`evaluator`] – [`Evaluator`][evaluator::Evaluator]: tag expansion,
//!   per-principle costing, veto detection and the result cache.

pub mod audit;
pub mod evaluator;
pub mod logic;

pub use audit::{AuditLog, JudgementRecord};
pub use evaluator::{Evaluator, EvaluatorConfig, PolicyViolation, SafetyMode, evaluation_record};
pub use logic::{LogicError, Rule};

//! `verity-runtime` – Decision Engine
//!
//! Turns goals into plans. The planner searches over abstract world states
//! extracted from the knowledge store and asks the policy evaluator to price
//! every transition it considers.
//!
//! # Modules
//!
//! - [`planner`] – [`Planner`][planner::Planner]: A*-style goal-oriented
//!   action planning with moral transition costs and veto pruning.
//! - [`skills`] – [`SkillRegistry`][skills::SkillRegistry]: the catalogue of
//!   skill descriptors the planner may expand.
//! - [`decision`] – [`DecisionCore`][decision::DecisionCore]: builds the store,
//!   evaluator and planner from one [`CoreConfig`][decision::CoreConfig] and wires
//!   the store in as the evaluator's tag hierarchy.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export
//!   to Jaeger, Grafana Tempo, or any OTLP-compatible collector.

pub mod decision;
pub mod planner;
pub mod skills;
pub mod telemetry;

pub use decision::{CoreConfig, DecisionCore};
pub use planner::{Planner, PlannerConfig, State, extract_state, satisfies, state_map};
pub use skills::SkillRegistry;
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};

//! [`AuditLog`] – bounded judgement history.
//!
//! Every judgement the evaluator makes, clean or vetoed, is appended here.
//! The log keeps a rolling window of the most recent `capacity` entries and
//! evicts the oldest first.
//!
//! # Example
//!
//! ```rust
//! use verity_kernel::audit::{AuditLog, JudgementRecord};
//!
//! let mut log = AuditLog::new(2);
//! log.record(JudgementRecord::clean("agent", "wave", 0.0, Vec::new()));
//! log.record(JudgementRecord::clean("agent", "walk", 1.0, Vec::new()));
//! log.record(JudgementRecord::vetoed("agent", "jump", "p.no_jumping", "too risky"));
//!
//! let actions: Vec<_> = log.entries().map(|r| r.action_id.as_str()).collect();
//! assert_eq!(actions, ["walk", "jump"]);
//! ```

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use verity_types::CostContribution;

/// One audited judgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgementRecord {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub action_id: String,
    /// `+inf` for a veto.
    pub total_cost: f64,
    #[serde(default)]
    pub breakdown: Vec<CostContribution>,
    pub veto: bool,
    #[serde(default)]
    pub vetoed_by: Option<String>,
    #[serde(default)]
    pub violation_reason: Option<String>,
}

impl JudgementRecord {
    pub fn clean(
        agent_id: impl Into<String>,
        action_id: impl Into<String>,
        total_cost: f64,
        breakdown: Vec<CostContribution>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            agent_id: agent_id.into(),
            action_id: action_id.into(),
            total_cost,
            breakdown,
            veto: false,
            vetoed_by: None,
            violation_reason: None,
        }
    }

    pub fn vetoed(
        agent_id: impl Into<String>,
        action_id: impl Into<String>,
        principle_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            agent_id: agent_id.into(),
            action_id: action_id.into(),
            total_cost: f64::INFINITY,
            breakdown: Vec::new(),
            veto: true,
            vetoed_by: Some(principle_id.into()),
            violation_reason: Some(reason.into()),
        }
    }
}

/// FIFO ring buffer of [`JudgementRecord`]s.
#[derive(Debug, Clone)]
pub struct AuditLog {
    capacity: usize,
    entries: VecDeque<JudgementRecord>,
}

impl AuditLog {
    /// A capacity of 0 disables auditing.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, entry: JudgementRecord) {
        if self.capacity == 0 {
            return;
        }
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &JudgementRecord> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&JudgementRecord> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(100)
    }
}

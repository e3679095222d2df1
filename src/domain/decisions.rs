//! Decision causality records: the full gate tree for every evaluated signal.

use chrono::{DateTime, Utc};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    Executed,
    Blocked,
    DryRun,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Executed => "executed",
            DecisionOutcome::Blocked => "blocked",
            DecisionOutcome::DryRun => "dry_run",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "executed" => Some(DecisionOutcome::Executed),
            "blocked" => Some(DecisionOutcome::Blocked),
            "dry_run" => Some(DecisionOutcome::DryRun),
            _ => None,
        }
    }
}

/// One evaluated gate: name, verdict, optional detail for the audit trail
/// (e.g. `"spread 0.09 > max 0.05"`).
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub name: &'static str,
    pub passed: bool,
    pub detail: Option<String>,
}

impl GateOutcome {
    pub fn pass(name: &'static str) -> Self {
        Self {
            name,
            passed: true,
            detail: None,
        }
    }

    pub fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewDecision {
    pub signal_id: String,
    pub market_id: String,
    pub outcome: DecisionOutcome,
    pub blocking_gate: Option<String>,
    pub gates_passed: i64,
    pub gates_total: i64,
    pub near_miss: bool,
    pub scores: Value,
    pub gate_details: Value,
    pub signal_snapshot: Value,
}

#[derive(Debug, Clone)]
pub struct DecisionRecord {
    pub id: i64,
    pub signal_id: String,
    pub market_id: String,
    pub outcome: DecisionOutcome,
    pub blocking_gate: Option<String>,
    pub gates_passed: i64,
    pub gates_total: i64,
    pub near_miss: bool,
    pub scores: Value,
    pub gate_details: Value,
    pub signal_snapshot: Value,
    pub created_at: DateTime<Utc>,
}

/// Per-gate aggregate from `filter_cost`: how often each gate was the one
/// that blocked.
#[derive(Debug, Clone)]
pub struct GateStat {
    pub gate: String,
    pub blocks: i64,
}

/// `filter_cost(days)` report.
#[derive(Debug, Clone)]
pub struct FilterCostReport {
    pub days: i64,
    pub total: i64,
    pub blocked: i64,
    pub pass_rate: f64,
    pub per_gate: Vec<GateStat>,
}

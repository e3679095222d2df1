//! Decision causality tracker: every evaluated signal leaves a record of
//! the full gate tree, whether it was admitted, blocked or simulated.

use crate::domain::decisions::{
    DecisionOutcome, DecisionRecord, FilterCostReport, GateOutcome, NewDecision,
};
use crate::domain::repositories::DecisionRepository;
use crate::domain::signal::EnterSignal;
use anyhow::Result;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::error;

pub struct DecisionTracker {
    repo: Arc<dyn DecisionRepository>,
}

impl DecisionTracker {
    pub fn new(repo: Arc<dyn DecisionRepository>) -> Arc<Self> {
        Arc::new(Self { repo })
    }

    /// Record one decision. Failures are swallowed: analytics must never
    /// block the trading path.
    pub async fn record(
        &self,
        signal: &EnterSignal,
        outcome: DecisionOutcome,
        gates: &[GateOutcome],
    ) {
        let gates_total = gates.len() as i64;
        let gates_passed = gates.iter().filter(|g| g.passed).count() as i64;
        let blocking_gate = gates
            .iter()
            .find(|g| !g.passed)
            .map(|g| g.name.to_string());
        let near_miss =
            outcome == DecisionOutcome::Blocked && gates_passed >= gates_total - 1;

        let mut gate_details = Map::new();
        for gate in gates {
            gate_details.insert(
                gate.name.to_string(),
                json!({
                    "passed": gate.passed,
                    "detail": gate.detail,
                }),
            );
        }

        let decision = NewDecision {
            signal_id: signal.signal_id.clone(),
            market_id: signal.market_id.clone(),
            outcome,
            blocking_gate,
            gates_passed,
            gates_total,
            near_miss,
            scores: json!({
                "edge": signal.edge(),
                "confidence": signal.confidence,
                "kelly": signal.kelly,
                "quality_score": signal.quality_score,
            }),
            gate_details: Value::Object(gate_details),
            signal_snapshot: serde_json::to_value(signal).unwrap_or(Value::Null),
        };

        if let Err(e) = self.repo.insert(&decision).await {
            error!(
                "DecisionTracker: failed to record decision for {}: {:#}",
                signal.signal_id, e
            );
        }
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<DecisionRecord>> {
        self.repo.recent(limit).await
    }

    pub async fn near_misses(&self, days: i64, limit: i64) -> Result<Vec<DecisionRecord>> {
        self.repo.near_misses(days, limit).await
    }

    /// What each gate costs: per-gate block counts and the overall pass rate.
    pub async fn filter_cost(&self, days: i64) -> Result<FilterCostReport> {
        let (total, blocked, per_gate) = self.repo.gate_stats(days).await?;
        let pass_rate = if total > 0 {
            (total - blocked) as f64 / total as f64
        } else {
            1.0
        };
        Ok(FilterCostReport {
            days,
            total,
            blocked,
            pass_rate,
            per_gate,
        })
    }
}

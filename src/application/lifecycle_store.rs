//! Owner of the in-memory position lifecycle overlay.
//!
//! The trading process is the single writer; invalid transitions are logged
//! and dropped rather than propagated, since the durable execution row is
//! the accounting source of truth.

use crate::domain::trading::lifecycle::{PositionRecord, PositionState};
use crate::domain::trading::types::Side;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{info, warn};

/// Terminal records linger for inspection before garbage collection.
const TERMINAL_RETENTION_MINUTES: i64 = 60;

#[derive(Default)]
pub struct LifecycleStore {
    positions: Mutex<HashMap<String, PositionRecord>>,
}

impl LifecycleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, position_id: &str, execution_id: i64, market_id: &str, side: Side) {
        let record = PositionRecord::new(
            position_id.to_string(),
            execution_id,
            market_id.to_string(),
            side,
        );
        self.positions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(position_id.to_string(), record);
    }

    /// PENDING -> ENTERED with the fill. Prices are YES-denominated.
    pub fn mark_entered(&self, position_id: &str, fill_price_yes: f64, shares: f64) {
        self.with_record(position_id, |record| {
            record.enter(fill_price_yes, shares).map(|_| ())
        });
    }

    pub fn scale_in(&self, position_id: &str, price_yes: f64, shares: f64) {
        self.with_record(position_id, |record| {
            record.scale_in(price_yes, shares).map(|_| ())
        });
    }

    pub fn partial_exit(&self, position_id: &str, exit_price_yes: f64, shares: f64) {
        self.with_record(position_id, |record| {
            record.partial_exit(exit_price_yes, shares).map(|_| ())
        });
    }

    pub fn close(&self, position_id: &str, exit_price_yes: f64, note: &str) {
        self.with_record(position_id, |record| {
            record.close(exit_price_yes, note).map(|_| ())
        });
    }

    pub fn cancel(&self, position_id: &str, note: &str) {
        self.with_record(position_id, |record| record.cancel(note).map(|_| ()));
    }

    pub fn get(&self, position_id: &str) -> Option<PositionRecord> {
        self.positions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(position_id)
            .cloned()
    }

    pub fn state_of(&self, position_id: &str) -> Option<PositionState> {
        self.get(position_id).map(|r| r.state)
    }

    pub fn len(&self) -> usize {
        self.positions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel PENDING positions past their 5-minute timeout. Returns the
    /// affected position ids.
    pub fn sweep_expired_pending(&self) -> Vec<String> {
        let now = Utc::now();
        let mut guard = self.positions.lock().unwrap_or_else(|e| e.into_inner());
        let mut cancelled = Vec::new();
        for (id, record) in guard.iter_mut() {
            if record.pending_expired(now) {
                match record.cancel("pending timeout") {
                    Ok(()) => {
                        info!("LifecycleStore: position {} timed out in PENDING", id);
                        cancelled.push(id.clone());
                    }
                    Err(e) => warn!("LifecycleStore: sweep failed for {}: {}", id, e),
                }
            }
        }
        cancelled
    }

    /// Drop terminal records past the retention window.
    pub fn gc_terminal(&self) -> usize {
        let cutoff = Utc::now() - Duration::minutes(TERMINAL_RETENTION_MINUTES);
        let mut guard = self.positions.lock().unwrap_or_else(|e| e.into_inner());
        let before = guard.len();
        guard.retain(|_, record| !(record.state.is_terminal() && record.updated_at < cutoff));
        before - guard.len()
    }

    fn with_record<F>(&self, position_id: &str, f: F)
    where
        F: FnOnce(&mut PositionRecord) -> Result<(), crate::domain::trading::lifecycle::LifecycleError>,
    {
        let mut guard = self.positions.lock().unwrap_or_else(|e| e.into_inner());
        match guard.get_mut(position_id) {
            Some(record) => {
                if let Err(e) = f(record) {
                    warn!("LifecycleStore: {} on {}: {}", e, position_id, record.state.as_str());
                }
            }
            None => warn!("LifecycleStore: unknown position {}", position_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_enter_close_flow() {
        let store = LifecycleStore::new();
        store.create("p1", 1, "m1", Side::Up);
        assert_eq!(store.state_of("p1"), Some(PositionState::Pending));

        store.mark_entered("p1", 0.50, 2.0);
        assert_eq!(store.state_of("p1"), Some(PositionState::Entered));

        store.close("p1", 0.60, "tp");
        let record = store.get("p1").unwrap();
        assert_eq!(record.state, PositionState::Closed);
        assert!((record.realized_pnl - 0.20).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_transition_is_swallowed() {
        let store = LifecycleStore::new();
        store.create("p1", 1, "m1", Side::Up);
        // PENDING -> CLOSED is not allowed; the store logs and drops it.
        store.close("p1", 0.60, "tp");
        assert_eq!(store.state_of("p1"), Some(PositionState::Pending));
    }

    #[test]
    fn test_unknown_position_is_ignored() {
        let store = LifecycleStore::new();
        store.close("ghost", 0.60, "tp");
        assert!(store.is_empty());
    }

    #[test]
    fn test_scale_in_reweights_average() {
        let store = LifecycleStore::new();
        store.create("p1", 1, "m1", Side::Up);
        store.mark_entered("p1", 0.40, 1.0);
        store.scale_in("p1", 0.60, 1.0);

        let record = store.get("p1").unwrap();
        assert_eq!(record.state, PositionState::Scaling);
        assert!((record.avg_price - 0.50).abs() < 1e-9);
        assert!((record.current_shares - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_gc_keeps_fresh_terminal_records() {
        let store = LifecycleStore::new();
        store.create("p1", 1, "m1", Side::Up);
        store.cancel("p1", "gone");
        // Still within the retention window.
        assert_eq!(store.gc_terminal(), 0);
        assert_eq!(store.len(), 1);
    }
}

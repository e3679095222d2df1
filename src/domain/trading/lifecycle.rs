//! Position Lifecycle State Machine
//!
//! Tracks each position from PENDING through a terminal state. The record is
//! an in-memory overlay over `trade_executions`; the durable row is the
//! source of truth for restart recovery, this overlay carries the
//! finer-grained state (scaling, hedging, partial exits) plus a bounded
//! event trail.
//!
//! Prices in this overlay are YES-denominated: a DOWN position's average and
//! exit prices are `1 - <NO token price>`, which is what makes the side sign
//! in `realized_pnl` recover held-token economics.

use crate::domain::trading::types::Side;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

const MAX_EVENTS: usize = 50;
const PENDING_TIMEOUT_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Pending,
    Entered,
    Scaling,
    Hedged,
    PartialExit,
    Closed,
    Cancelled,
}

impl PositionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionState::Pending => "PENDING",
            PositionState::Entered => "ENTERED",
            PositionState::Scaling => "SCALING",
            PositionState::Hedged => "HEDGED",
            PositionState::PartialExit => "PARTIAL_EXIT",
            PositionState::Closed => "CLOSED",
            PositionState::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PositionState::Closed | PositionState::Cancelled)
    }

    /// Allowed transition targets from this state. Terminal states have an
    /// empty set.
    pub fn allowed_transitions(&self) -> &'static [PositionState] {
        use PositionState::*;
        match self {
            Pending => &[Entered, Cancelled],
            Entered => &[Scaling, Hedged, PartialExit, Closed],
            Scaling => &[Entered, Hedged, PartialExit, Closed],
            Hedged => &[Entered, PartialExit, Closed],
            PartialExit => &[Closed, Entered],
            Closed | Cancelled => &[],
        }
    }

    pub fn can_transition(&self, to: PositionState) -> bool {
        self.allowed_transitions().contains(&to)
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: PositionState,
        to: PositionState,
    },
}

#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub at: DateTime<Utc>,
    pub from: PositionState,
    pub to: PositionState,
    pub note: String,
}

/// In-memory lifecycle record for one position.
#[derive(Debug, Clone)]
pub struct PositionRecord {
    pub id: String,
    pub execution_id: i64,
    pub market_id: String,
    pub side: Side,
    pub state: PositionState,
    pub initial_shares: f64,
    pub current_shares: f64,
    pub avg_price: f64,
    pub realized_pnl: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub events: Vec<LifecycleEvent>,
}

impl PositionRecord {
    pub fn new(id: String, execution_id: i64, market_id: String, side: Side) -> Self {
        let now = Utc::now();
        Self {
            id,
            execution_id,
            market_id,
            side,
            state: PositionState::Pending,
            initial_shares: 0.0,
            current_shares: 0.0,
            avg_price: 0.0,
            realized_pnl: 0.0,
            created_at: now,
            updated_at: now,
            events: Vec::new(),
        }
    }

    fn pnl_sign(&self) -> f64 {
        if self.side.is_yes() { 1.0 } else { -1.0 }
    }

    /// Record a transition, enforcing the allowed-transition table and the
    /// event-log bound.
    pub fn transition(
        &mut self,
        to: PositionState,
        note: impl Into<String>,
    ) -> Result<(), LifecycleError> {
        if !self.state.can_transition(to) {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        let now = Utc::now();
        self.events.push(LifecycleEvent {
            at: now,
            from: self.state,
            to,
            note: note.into(),
        });
        if self.events.len() > MAX_EVENTS {
            let overflow = self.events.len() - MAX_EVENTS;
            self.events.drain(..overflow);
        }
        self.state = to;
        self.updated_at = now;
        Ok(())
    }

    /// PENDING -> ENTERED on fill.
    pub fn enter(&mut self, fill_price: f64, shares: f64) -> Result<(), LifecycleError> {
        self.transition(PositionState::Entered, format!("filled @ {:.4}", fill_price))?;
        self.initial_shares = shares;
        self.current_shares = shares;
        self.avg_price = fill_price;
        Ok(())
    }

    /// Add to the position; `avg_price` becomes the size-weighted mean.
    pub fn scale_in(&mut self, price: f64, shares: f64) -> Result<(), LifecycleError> {
        self.transition(
            PositionState::Scaling,
            format!("scale-in {:.2} @ {:.4}", shares, price),
        )?;
        let total = self.current_shares + shares;
        if total > 0.0 {
            self.avg_price = (self.avg_price * self.current_shares + price * shares) / total;
        }
        self.current_shares = total;
        self.initial_shares = self.initial_shares.max(total);
        Ok(())
    }

    /// Close part of the position, banking realized P&L.
    pub fn partial_exit(&mut self, exit_price: f64, shares: f64) -> Result<(), LifecycleError> {
        self.transition(
            PositionState::PartialExit,
            format!("partial exit {:.2} @ {:.4}", shares, exit_price),
        )?;
        let shares = shares.min(self.current_shares);
        self.realized_pnl += (exit_price - self.avg_price) * shares * self.pnl_sign();
        self.current_shares = (self.current_shares - shares).max(0.0);
        Ok(())
    }

    /// Close the remainder of the position.
    pub fn close(&mut self, exit_price: f64, note: impl Into<String>) -> Result<(), LifecycleError> {
        self.transition(PositionState::Closed, note)?;
        self.realized_pnl += (exit_price - self.avg_price) * self.current_shares * self.pnl_sign();
        self.current_shares = 0.0;
        Ok(())
    }

    pub fn cancel(&mut self, note: impl Into<String>) -> Result<(), LifecycleError> {
        self.transition(PositionState::Cancelled, note)
    }

    /// A PENDING position older than 5 minutes is abandoned by its owner.
    pub fn pending_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == PositionState::Pending
            && now - self.created_at > Duration::minutes(PENDING_TIMEOUT_MINUTES)
    }
}

//! Internal broadcast bus. Subscribers (admin surfaces, dashboards) are
//! external; the core only publishes.

use crate::domain::control::BotState;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum BotEvent {
    ConfigChanged {
        key: String,
        value: f64,
    },
    StateChanged {
        state: BotState,
        reason: String,
    },
    PositionOpened {
        execution_id: i64,
        market_id: String,
    },
    PositionClosed {
        execution_id: i64,
        reason: String,
        pnl_usd: f64,
    },
    CircuitBreaker {
        daily_pnl: f64,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BotEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Fire-and-forget; a bus with no subscribers is normal.
    pub fn publish(&self, event: BotEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers_and_tolerates_none() {
        let bus = EventBus::new(8);
        // No subscribers yet; publish must not panic or error out.
        bus.publish(BotEvent::CircuitBreaker { daily_pnl: -10.0 });

        let mut rx = bus.subscribe();
        bus.publish(BotEvent::StateChanged {
            state: BotState::Paused,
            reason: "test".to_string(),
        });
        match rx.recv().await.unwrap() {
            BotEvent::StateChanged { state, reason } => {
                assert_eq!(state, BotState::Paused);
                assert_eq!(reason, "test");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}

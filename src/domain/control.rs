use chrono::{DateTime, Utc};

/// Coarse run-state of the bot, persisted as the singleton `bot_control` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    Running,
    Paused,
    Stopped,
    Draining,
}

impl BotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotState::Running => "running",
            BotState::Paused => "paused",
            BotState::Stopped => "stopped",
            BotState::Draining => "draining",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(BotState::Running),
            "paused" => Some(BotState::Paused),
            "stopped" => Some(BotState::Stopped),
            "draining" => Some(BotState::Draining),
            _ => None,
        }
    }

    /// Only `running` admits new trades.
    pub fn admits_new_trades(&self) -> bool {
        matches!(self, BotState::Running)
    }

    /// The settlement monitor keeps working in every state except `stopped`.
    pub fn monitor_active(&self) -> bool {
        !matches!(self, BotState::Stopped)
    }
}

#[derive(Debug, Clone)]
pub struct ControlRow {
    pub state: BotState,
    pub changed_at: DateTime<Utc>,
    pub reason: String,
}

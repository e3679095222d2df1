pub mod audit_log;
pub mod bot_control;
pub mod bridge;
pub mod config_store;
pub mod decision_tracker;
pub mod events;
pub mod execution_log;
pub mod lifecycle_store;
pub mod monitor;
pub mod notify;
pub mod risk_manager;
pub mod system;

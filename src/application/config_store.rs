//! Runtime-mutable trading policy store.
//!
//! Typed, range-validated numeric parameters backed by `trading_config`.
//! The in-memory cache is write-through: an accepted batch persists in one
//! transaction, then lands in the cache, then is announced via audit event
//! and broadcast.

use crate::application::audit_log::{AuditAttrs, AuditLog};
use crate::application::events::{BotEvent, EventBus};
use crate::domain::audit;
use crate::domain::repositories::ConfigRepository;
use crate::domain::settings::{ALL_KEYS, ConfigRule, ValueKind, rule_for};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::{info, warn};

/// Read-side view onto the risk manager, used only to compute update
/// warnings. Breaks the construction cycle between the two components.
pub trait ExposureView: Send + Sync {
    fn open_count(&self) -> usize;
    fn total_exposure_usd(&self) -> f64;
}

#[derive(Debug, Clone, Default)]
pub struct ConfigUpdateOutcome {
    pub updated: Vec<String>,
    /// key -> rejection message; rejected keys never block the rest of the
    /// batch.
    pub errors: HashMap<String, String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConfigDetail {
    pub key: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub kind: ValueKind,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

pub struct ConfigStore {
    repo: Arc<dyn ConfigRepository>,
    audit: Arc<AuditLog>,
    events: EventBus,
    cache: RwLock<HashMap<String, f64>>,
    exposure: OnceLock<Arc<dyn ExposureView>>,
}

impl ConfigStore {
    /// Load persisted values over the environment defaults and seed any keys
    /// the store has never seen, so `get_detailed` always reports the full
    /// policy surface.
    pub async fn load(
        repo: Arc<dyn ConfigRepository>,
        audit: Arc<AuditLog>,
        events: EventBus,
        defaults: &HashMap<String, f64>,
    ) -> Result<Arc<Self>> {
        let mut cache: HashMap<String, f64> = HashMap::new();
        for key in ALL_KEYS {
            cache.insert((*key).to_string(), defaults.get(*key).copied().unwrap_or(0.0));
        }

        let persisted = repo.load_all().await?;
        let persisted_keys: Vec<String> = persisted.iter().map(|r| r.key.clone()).collect();
        for row in persisted {
            if rule_for(&row.key).is_some() {
                cache.insert(row.key, row.value);
            } else {
                warn!("ConfigStore: ignoring unknown persisted key {}", row.key);
            }
        }

        let missing: Vec<(String, f64)> = cache
            .iter()
            .filter(|(key, _)| !persisted_keys.contains(key))
            .map(|(key, value)| (key.clone(), *value))
            .collect();
        if !missing.is_empty() {
            repo.upsert_many(&missing, "system").await?;
            info!("ConfigStore: seeded {} default keys", missing.len());
        }

        Ok(Arc::new(Self {
            repo,
            audit,
            events,
            cache: RwLock::new(cache),
            exposure: OnceLock::new(),
        }))
    }

    pub fn set_exposure_view(&self, view: Arc<dyn ExposureView>) {
        let _ = self.exposure.set(view);
    }

    pub fn get(&self, key: &str) -> f64 {
        let guard = self.cache.read().unwrap_or_else(|e| e.into_inner());
        match guard.get(key) {
            Some(v) => *v,
            None => {
                warn!("ConfigStore: get of unknown key {}", key);
                0.0
            }
        }
    }

    pub fn get_all(&self) -> HashMap<String, f64> {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub async fn get_detailed(&self) -> Result<Vec<ConfigDetail>> {
        let rows = self.repo.load_all().await?;
        let cache = self.get_all();
        let mut details: Vec<ConfigDetail> = ALL_KEYS
            .iter()
            .map(|key| {
                let rule: ConfigRule = rule_for(key).expect("every listed key has a rule");
                let row = rows.iter().find(|r| r.key == *key);
                ConfigDetail {
                    key: (*key).to_string(),
                    value: cache.get(*key).copied().unwrap_or(0.0),
                    min: rule.min,
                    max: rule.max,
                    kind: rule.kind,
                    updated_at: row.map(|r| r.updated_at),
                    updated_by: row.map(|r| r.updated_by.clone()),
                }
            })
            .collect();
        details.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(details)
    }

    /// Validate and apply a batch of changes. Per-key rejections never block
    /// the rest of the batch; accepted changes persist in one transaction.
    pub async fn update(
        &self,
        changes: &HashMap<String, f64>,
        actor: &str,
    ) -> Result<ConfigUpdateOutcome> {
        let mut outcome = ConfigUpdateOutcome::default();
        let mut accepted: Vec<(String, f64)> = Vec::new();

        for (key, value) in changes {
            match rule_for(key) {
                None => {
                    outcome
                        .errors
                        .insert(key.clone(), format!("unknown config key '{}'", key));
                }
                Some(rule) => match rule.check(*value) {
                    Ok(()) => accepted.push((key.clone(), *value)),
                    Err(msg) => {
                        outcome.errors.insert(key.clone(), msg);
                    }
                },
            }
        }

        if accepted.is_empty() {
            return Ok(outcome);
        }

        self.collect_warnings(&accepted, &mut outcome.warnings);

        self.repo.upsert_many(&accepted, actor).await?;
        {
            let mut guard = self.cache.write().unwrap_or_else(|e| e.into_inner());
            for (key, value) in &accepted {
                guard.insert(key.clone(), *value);
            }
        }

        for (key, value) in &accepted {
            info!("ConfigStore: {} = {} (by {})", key, value, actor);
            outcome.updated.push(key.clone());
            self.events.publish(BotEvent::ConfigChanged {
                key: key.clone(),
                value: *value,
            });
        }

        self.audit
            .log(
                audit::CONFIG_CHANGE,
                AuditAttrs::detail(json!({
                    "changes": accepted
                        .iter()
                        .map(|(k, v)| (k.clone(), *v))
                        .collect::<HashMap<_, _>>(),
                    "actor": actor,
                    "warnings": outcome.warnings,
                })),
            )
            .await;

        Ok(outcome)
    }

    /// Warnings are advisory: the new limits stand, existing positions are
    /// simply above them until the monitor winds positions down.
    fn collect_warnings(&self, accepted: &[(String, f64)], warnings: &mut Vec<String>) {
        let Some(view) = self.exposure.get() else {
            return;
        };
        for (key, value) in accepted {
            match key.as_str() {
                "max_open_positions" => {
                    let open = view.open_count();
                    if (open as f64) > *value {
                        warnings.push(format!(
                            "max_open_positions {} is below current open count {}",
                            value, open
                        ));
                    }
                }
                "max_total_exposure_usd" => {
                    let exposure = view.total_exposure_usd();
                    if exposure > *value {
                        warnings.push(format!(
                            "max_total_exposure_usd {} is below current exposure {:.2}",
                            value, exposure
                        ));
                    }
                }
                _ => {}
            }
        }
    }
}

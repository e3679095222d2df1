//! Application wiring: builds every component against the persistent store
//! and the external ports, then starts the long-running tasks.

use crate::application::audit_log::AuditLog;
use crate::application::bot_control::BotControl;
use crate::application::bridge::{BridgeSettings, EdgeLinearSizer, TraderBridge};
use crate::application::config_store::ConfigStore;
use crate::application::decision_tracker::DecisionTracker;
use crate::application::events::EventBus;
use crate::application::execution_log::ExecutionLog;
use crate::application::lifecycle_store::LifecycleStore;
use crate::application::monitor::SettlementMonitor;
use crate::application::notify::LogEmailTransport;
use crate::application::notify::dispatcher::NotificationDispatcher;
use crate::application::notify::webhook_worker::WebhookWorker;
use crate::application::risk_manager::RiskManager;
use crate::config::Settings;
use crate::domain::ports::{ClobVenue, EmailTransport};
use crate::domain::repositories::ExecutionRepository;
use crate::domain::signal::EnterSignal;
use crate::infrastructure::clob::client::{ClobClient, ClobCredentials};
use crate::infrastructure::persistence::database::Database;
use crate::infrastructure::persistence::repositories::{
    SqliteAuditRepository, SqliteConfigRepository, SqliteControlRepository,
    SqliteDecisionRepository, SqliteEmailPrefRepository, SqliteExecutionRepository,
    SqliteWebhookQueueRepository, SqliteWebhookRepository,
};
use crate::infrastructure::sink::dry_run_csv::DryRunCsv;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::info;

const SIGNAL_CHANNEL_CAPACITY: usize = 256;
const WEBHOOK_DRAIN_INTERVAL: Duration = Duration::from_secs(5);

pub struct Application {
    pub settings: Settings,
    pub database: Database,
    pub audit: Arc<AuditLog>,
    pub config: Arc<ConfigStore>,
    pub control: Arc<BotControl>,
    pub risk: Arc<RiskManager>,
    pub executions: Arc<ExecutionLog>,
    pub decisions: Arc<DecisionTracker>,
    pub lifecycle: Arc<LifecycleStore>,
    pub monitor: Arc<SettlementMonitor>,
    pub bridge: Arc<TraderBridge>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub events: EventBus,

    execution_repo: Arc<dyn ExecutionRepository>,
    signal_tx: mpsc::Sender<EnterSignal>,
    signal_rx: Mutex<Option<mpsc::Receiver<EnterSignal>>>,
    webhook_worker: Mutex<Option<WebhookWorker>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Application {
    /// Production wiring: real CLOB client, log-only email transport.
    pub async fn build(settings: Settings) -> Result<Self> {
        let credentials = settings.has_clob_credentials().then(|| ClobCredentials {
            api_key: settings.clob_api_key.clone(),
            api_secret: settings.clob_api_secret.clone(),
            passphrase: settings.clob_passphrase.clone(),
        });
        let venue: Arc<dyn ClobVenue> =
            Arc::new(ClobClient::new(settings.clob_base_url.clone(), credentials));
        let email: Arc<dyn EmailTransport> = Arc::new(LogEmailTransport);
        Self::build_with_ports(settings, venue, email).await
    }

    /// Wiring with injected ports; tests drive this with scripted fakes.
    pub async fn build_with_ports(
        settings: Settings,
        venue: Arc<dyn ClobVenue>,
        email: Arc<dyn EmailTransport>,
    ) -> Result<Self> {
        let database = Database::new(&settings.database_url).await?;

        let execution_repo: Arc<dyn ExecutionRepository> =
            Arc::new(SqliteExecutionRepository::new(database.clone()));
        let audit_repo = Arc::new(SqliteAuditRepository::new(database.clone()));
        let config_repo = Arc::new(SqliteConfigRepository::new(database.clone()));
        let control_repo = Arc::new(SqliteControlRepository::new(database.clone()));
        let decision_repo = Arc::new(SqliteDecisionRepository::new(database.clone()));
        let webhook_repo = Arc::new(SqliteWebhookRepository::new(database.clone()));
        let email_pref_repo = Arc::new(SqliteEmailPrefRepository::new(database.clone()));
        let queue_repo = Arc::new(SqliteWebhookQueueRepository::new(database.clone()));

        let events = EventBus::default();

        let audit = Arc::new(AuditLog::new(audit_repo.clone(), execution_repo.clone()));
        let dispatcher = NotificationDispatcher::new(
            webhook_repo.clone(),
            queue_repo.clone(),
            email_pref_repo.clone(),
            email,
            audit_repo.clone(),
        );
        audit.set_notifier(dispatcher.clone());

        let config = ConfigStore::load(
            config_repo,
            audit.clone(),
            events.clone(),
            &settings.policy_defaults,
        )
        .await?;
        let control = BotControl::load(control_repo, audit.clone(), events.clone()).await?;
        let risk = RiskManager::new(
            config.clone(),
            control.clone(),
            audit.clone(),
            events.clone(),
        );
        config.set_exposure_view(risk.clone());

        let executions = ExecutionLog::new(execution_repo.clone());
        let decisions = DecisionTracker::new(decision_repo);
        let lifecycle = Arc::new(LifecycleStore::new());

        let live = settings.is_live();
        let monitor = SettlementMonitor::new(
            venue.clone(),
            config.clone(),
            control.clone(),
            risk.clone(),
            executions.clone(),
            lifecycle.clone(),
            audit.clone(),
            events.clone(),
            live,
            settings.monitor_interval_secs,
        );

        let bridge = TraderBridge::new(
            venue,
            config.clone(),
            control.clone(),
            risk.clone(),
            executions.clone(),
            decisions.clone(),
            lifecycle.clone(),
            monitor.clone(),
            audit.clone(),
            events.clone(),
            EdgeLinearSizer::new(risk.clone()),
            DryRunCsv::new(settings.dry_run_csv_path.clone()),
            BridgeSettings {
                live,
                cooldown_minutes: settings.market_cooldown_minutes,
                max_poll_ms: settings.max_poll_ms,
                poll_interval_ms: settings.poll_interval_ms,
                balance_cache_ttl: Duration::from_secs(settings.balance_cache_ttl_secs),
            },
        );

        let webhook_worker =
            WebhookWorker::new(queue_repo, webhook_repo, WEBHOOK_DRAIN_INTERVAL);

        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            settings,
            database,
            audit,
            config,
            control,
            risk,
            executions,
            decisions,
            lifecycle,
            monitor,
            bridge,
            dispatcher,
            events,
            execution_repo,
            signal_tx,
            signal_rx: Mutex::new(Some(signal_rx)),
            webhook_worker: Mutex::new(Some(webhook_worker)),
            shutdown_tx,
        })
    }

    /// Startup sequence: repair and reconcile durable state, rehydrate the
    /// ledger, then launch the monitor, the bridge and the webhook worker.
    pub async fn start(&self) -> Result<()> {
        let repaired = self
            .audit
            .auto_repair(self.settings.max_audit_age_hours)
            .await?;
        if repaired > 0 {
            info!("Application: auto-repaired {} stale executions", repaired);
        }
        let stale = self.audit.reconcile().await?;
        if !stale.is_empty() {
            info!("Application: {} positions flagged stale", stale.len());
        }

        self.risk
            .reconcile_from_store(self.execution_repo.as_ref())
            .await?;
        self.monitor.rehydrate().await?;
        self.monitor.start(self.shutdown_tx.subscribe());

        if let Some(signal_rx) = self.signal_rx.lock().await.take() {
            let bridge = self.bridge.clone();
            let shutdown = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                bridge.run(signal_rx, shutdown).await;
            });
        }

        if let Some(worker) = self.webhook_worker.lock().await.take() {
            let shutdown = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                worker.run(shutdown).await;
            });
        }

        info!("Application: started");
        Ok(())
    }

    /// Upstream scanners push normalized signals through this sender.
    pub fn signal_sender(&self) -> mpsc::Sender<EnterSignal> {
        self.signal_tx.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.monitor.stop();
    }
}

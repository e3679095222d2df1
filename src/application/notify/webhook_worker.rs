//! Background drain of the durable webhook queue.

use crate::domain::repositories::{WebhookQueueRepository, WebhookRepository};
use crate::infrastructure::core::http_client_factory::HttpClientFactory;
use reqwest_middleware::ClientWithMiddleware;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const USER_AGENT: &str = "PolySignal/1.0";
const BATCH_SIZE: i64 = 20;

pub struct WebhookWorker {
    queue: Arc<dyn WebhookQueueRepository>,
    webhooks: Arc<dyn WebhookRepository>,
    client: ClientWithMiddleware,
    drain_interval: Duration,
}

impl WebhookWorker {
    pub fn new(
        queue: Arc<dyn WebhookQueueRepository>,
        webhooks: Arc<dyn WebhookRepository>,
        drain_interval: Duration,
    ) -> Self {
        Self {
            queue,
            webhooks,
            // Deliveries carry their own failure accounting; no blind retry.
            client: HttpClientFactory::create_raw_client(),
            drain_interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("WebhookWorker: started");
        let mut ticker = tokio::time::interval(self.drain_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.drain_batch().await;
                }
                _ = shutdown.changed() => {
                    info!("WebhookWorker: shutting down");
                    break;
                }
            }
        }
    }

    pub async fn drain_batch(&self) {
        let batch = match self.queue.next_batch(BATCH_SIZE).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!("WebhookWorker: queue read failed: {:#}", e);
                return;
            }
        };

        for delivery in batch {
            let webhook = match self.webhooks.get(delivery.webhook_id).await {
                Ok(Some(webhook)) if webhook.active => webhook,
                Ok(_) => {
                    let _ = self
                        .queue
                        .mark_failed(delivery.id, "webhook missing or inactive")
                        .await;
                    continue;
                }
                Err(e) => {
                    warn!("WebhookWorker: webhook lookup failed: {:#}", e);
                    continue;
                }
            };

            match self.deliver(&webhook.url, &delivery.payload).await {
                Ok(()) => {
                    debug!(
                        "WebhookWorker: delivered {} to webhook {}",
                        delivery.event, webhook.id
                    );
                    if let Err(e) = self.queue.mark_delivered(delivery.id).await {
                        warn!("WebhookWorker: mark_delivered failed: {:#}", e);
                    }
                    if let Err(e) = self.webhooks.record_success(webhook.id).await {
                        warn!("WebhookWorker: record_success failed: {:#}", e);
                    }
                }
                Err(error) => {
                    warn!(
                        "WebhookWorker: delivery {} to webhook {} failed: {}",
                        delivery.id, webhook.id, error
                    );
                    if let Err(e) = self.queue.mark_failed(delivery.id, &error).await {
                        warn!("WebhookWorker: mark_failed failed: {:#}", e);
                    }
                    match self.webhooks.record_failure(webhook.id, &error).await {
                        Ok(true) => warn!(
                            "WebhookWorker: webhook {} deactivated after consecutive failures",
                            webhook.id
                        ),
                        Ok(false) => {}
                        Err(e) => warn!("WebhookWorker: record_failure failed: {:#}", e),
                    }
                }
            }
        }
    }

    async fn deliver(&self, url: &str, payload: &serde_json::Value) -> Result<(), String> {
        let response = self
            .client
            .post(url)
            .header("User-Agent", USER_AGENT)
            .json(payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("HTTP {}", status))
        }
    }
}

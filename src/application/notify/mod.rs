pub mod dispatcher;
pub mod priority;
pub mod throttle;
pub mod webhook_worker;

use crate::domain::ports::EmailTransport;
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Default transport: logs instead of sending. Real transports (SMTP,
/// provider APIs) are wired in from outside the core.
pub struct LogEmailTransport;

#[async_trait]
impl EmailTransport for LogEmailTransport {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
        info!("Email (log transport) to {}: {}", to, subject);
        Ok(())
    }
}

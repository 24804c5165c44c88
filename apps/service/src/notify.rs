//! Alert notification channels

use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::{error, warn};
use url::Url;

use crate::monitoring::types::{Alert, AlertSeverity};

/// Delivers an alert to the outside world. One attempt, no retries.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<()>;

    fn name(&self) -> &str;
}

/// Writes alerts to the service log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        match alert.severity {
            AlertSeverity::Critical => error!(
                alert_id = %alert.id,
                endpoint = %alert.endpoint_id,
                severity = %alert.severity,
                "{}",
                alert.message
            ),
            AlertSeverity::Warning | AlertSeverity::Performance => warn!(
                alert_id = %alert.id,
                endpoint = %alert.endpoint_id,
                severity = %alert.severity,
                "{}",
                alert.message
            ),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// POSTs each alert as JSON to a webhook
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(alert)
            .send()
            .await
            .map_err(|e| anyhow!("failed to send webhook notification: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow!("webhook returned status: {}", response.status()));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// Fans an alert out to every channel
#[derive(Default)]
pub struct NotifierSet {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: impl Notifier + 'static) -> Self {
        self.channels.push(Box::new(channel));
        self
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }
}

#[async_trait]
impl Notifier for NotifierSet {
    /// Every channel is tried. The first failure is returned.
    async fn notify(&self, alert: &Alert) -> Result<()> {
        let mut first_error = None;

        for channel in &self.channels {
            if let Err(e) = channel.notify(alert).await {
                warn!(channel = channel.name(), alert_id = %alert.id, error = %e, "notification failed");
                first_error.get_or_insert(e.context(format!("{} channel", channel.name())));
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn name(&self) -> &str {
        "set"
    }
}

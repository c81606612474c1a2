//! Alert notification channels.
//!
//! Every channel is independently fallible. The alert engine dispatches to all
//! channels registered on a rule and only logs individual failures.

use super::error::{MonitoringError, Result};
use super::{Alert, AlertRule, AlertSeverity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Log,
    Dashboard,
    Email,
    Webhook,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Log => "log",
            ChannelType::Dashboard => "dashboard",
            ChannelType::Email => "email",
            ChannelType::Webhook => "webhook",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn channel_type(&self) -> ChannelType;

    /// Deliver one alert. `rule` is None for alerts raised by per-request checks.
    async fn send(&self, alert: &Alert, rule: Option<&AlertRule>) -> Result<()>;
}

/// Writes alerts to the tracing log at a level matching their severity.
#[derive(Debug, Default, Clone)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Log
    }

    async fn send(&self, alert: &Alert, rule: Option<&AlertRule>) -> Result<()> {
        let source = rule.map(|r| r.id.as_str()).unwrap_or(alert.alert_type.as_str());
        let log_message = format!(
            "[ALERT {}] {} - {}",
            alert.severity.as_str().to_uppercase(),
            source,
            alert.description
        );

        match alert.severity {
            AlertSeverity::Critical | AlertSeverity::High => error!("{}", log_message),
            AlertSeverity::Medium => warn!("{}", log_message),
            AlertSeverity::Low => info!("{}", log_message),
        }
        Ok(())
    }
}

/// Payload pushed to live dashboard subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardUpdate {
    pub alert: Alert,
    pub rule_name: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Publishes alerts on a broadcast channel consumed by dashboards.
#[derive(Debug, Clone)]
pub struct DashboardChannel {
    sender: broadcast::Sender<DashboardUpdate>,
}

impl DashboardChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardUpdate> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl NotificationChannel for DashboardChannel {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Dashboard
    }

    async fn send(&self, alert: &Alert, rule: Option<&AlertRule>) -> Result<()> {
        let update = DashboardUpdate {
            alert: alert.clone(),
            rule_name: rule.map(|r| r.name.clone()),
            published_at: Utc::now(),
        };

        match self.sender.send(update) {
            Ok(receivers) => debug!("Dashboard update delivered to {} subscribers", receivers),
            // No dashboard connected is not a delivery failure
            Err(_) => debug!("No dashboard subscribers for alert {}", alert.id),
        }
        Ok(())
    }
}

fn build_client(timeout_seconds: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent(concat!("agent-monitor/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| MonitoringError::Configuration(format!("Failed to create HTTP client: {e}")))
}

/// Sends alert emails through an HTTP relay.
#[derive(Debug, Clone)]
pub struct EmailChannel {
    recipients: Vec<String>,
    relay_url: Option<String>,
    client: Client,
}

impl EmailChannel {
    pub fn new(
        recipients: Vec<String>,
        relay_url: Option<String>,
        timeout_seconds: u64,
    ) -> Result<Self> {
        Ok(Self {
            recipients,
            relay_url,
            client: build_client(timeout_seconds)?,
        })
    }

    pub fn render_subject(alert: &Alert) -> String {
        let scope = alert
            .agent_type
            .map(|a| a.to_string())
            .unwrap_or_else(|| "system".to_string());
        format!(
            "[{}] {} alert for {}",
            alert.severity.as_str().to_uppercase(),
            alert.alert_type,
            scope
        )
    }

    pub fn render_body(alert: &Alert, rule: Option<&AlertRule>) -> String {
        let mut body = format!(
            "{}\n\nMetric: {}\nObserved: {:.2}\nThreshold: {:.2}\nRaised at: {}\n",
            alert.description,
            alert.metric_name,
            alert.current_value,
            alert.threshold_value,
            alert.created_at.to_rfc3339()
        );
        if let Some(rule) = rule {
            body.push_str(&format!("Rule: {} ({})\n", rule.name, rule.description));
        }
        if let Some(recommendation) = &alert.recommendation {
            body.push_str(&format!("\nRecommendation: {recommendation}\n"));
        }
        body
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Email
    }

    async fn send(&self, alert: &Alert, rule: Option<&AlertRule>) -> Result<()> {
        if self.recipients.is_empty() {
            return Err(MonitoringError::channel("email", "no recipients configured"));
        }

        let subject = Self::render_subject(alert);
        let body = Self::render_body(alert, rule);

        let Some(relay_url) = &self.relay_url else {
            info!(
                "Email relay not configured; alert email for {} recipients: {}",
                self.recipients.len(),
                subject
            );
            return Ok(());
        };

        let response = self
            .client
            .post(relay_url)
            .json(&json!({
                "to": self.recipients,
                "subject": subject,
                "text": body,
            }))
            .send()
            .await
            .map_err(|e| MonitoringError::channel("email", format!("relay request failed: {e}")))?;

        if response.status().is_success() {
            debug!("Alert email {} accepted by relay", alert.id);
            Ok(())
        } else {
            Err(MonitoringError::channel(
                "email",
                format!("relay returned status {}", response.status()),
            ))
        }
    }
}

/// POSTs alert and rule JSON to a configured endpoint.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    url: String,
    client: Client,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            client: build_client(timeout_seconds)?,
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Webhook
    }

    async fn send(&self, alert: &Alert, rule: Option<&AlertRule>) -> Result<()> {
        let payload = json!({
            "alert": alert,
            "rule": rule,
            "sent_at": Utc::now(),
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MonitoringError::channel("webhook", format!("HTTP request failed: {e}")))?;

        if response.status().is_success() {
            debug!("Webhook notification sent for alert {}", alert.id);
            Ok(())
        } else {
            Err(MonitoringError::channel(
                "webhook",
                format!("endpoint returned status {}", response.status()),
            ))
        }
    }
}

use super::channels::{ChannelType, LogChannel, NotificationChannel};
use super::error::{MonitoringError, Result};
use super::{
    is_known_metric, AgentType, HealthScoringEngine, HealthSnapshot, Metric, MetricStore,
    PipelineMetrics, RequestStatus, SystemSnapshot,
};
use crate::config::AlertingConfig;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration as StdDuration, Instant};
use tokio::sync::{watch, Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Channels used for alerts raised by per-request checks.
const IMMEDIATE_CHANNELS: [ChannelType; 2] = [ChannelType::Log, ChannelType::Dashboard];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }

    /// Minimum time between two alerts for the same rule and scope.
    pub fn cooldown(&self) -> Duration {
        match self {
            AlertSeverity::Critical => Duration::minutes(5),
            AlertSeverity::High => Duration::minutes(15),
            AlertSeverity::Medium => Duration::minutes(30),
            AlertSeverity::Low => Duration::minutes(60),
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = MonitoringError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(AlertSeverity::Low),
            "medium" => Ok(AlertSeverity::Medium),
            "high" => Ok(AlertSeverity::High),
            "critical" => Ok(AlertSeverity::Critical),
            other => Err(MonitoringError::Validation(format!(
                "unknown alert severity: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOperator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

impl ComparisonOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Gte => ">=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Lte => "<=",
            ComparisonOperator::Eq => "==",
        }
    }

    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::Gt => value > threshold,
            ComparisonOperator::Gte => value >= threshold,
            ComparisonOperator::Lt => value < threshold,
            ComparisonOperator::Lte => value <= threshold,
            ComparisonOperator::Eq => (value - threshold).abs() < f64::EPSILON,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub metric_name: String,
    pub operator: ComparisonOperator,
    pub threshold: f64,
    pub severity: AlertSeverity,
    /// Declared window. Evaluation always uses the engine's health window.
    pub time_window_minutes: i64,
    /// None makes the rule apply to every agent and to system aggregates.
    pub agent_type: Option<AgentType>,
    pub enabled: bool,
    pub channels: Vec<ChannelType>,
}

impl AlertRule {
    pub fn applies_to(&self, agent_type: AgentType) -> bool {
        self.agent_type.map_or(true, |scope| scope == agent_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub alert_type: String,
    pub rule_id: Option<String>,
    pub agent_type: Option<AgentType>,
    pub metric_name: String,
    pub current_value: f64,
    pub threshold_value: f64,
    pub description: String,
    pub recommendation: Option<String>,
    pub window_minutes: i64,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    #[allow(clippy::too_many_arguments)]
    fn new(
        created_at: DateTime<Utc>,
        severity: AlertSeverity,
        alert_type: impl Into<String>,
        rule_id: Option<String>,
        agent_type: Option<AgentType>,
        metric_name: impl Into<String>,
        current_value: f64,
        threshold_value: f64,
        description: String,
        window_minutes: i64,
    ) -> Self {
        let metric_name = metric_name.into();
        Self {
            id: Uuid::new_v4(),
            created_at,
            severity,
            alert_type: alert_type.into(),
            rule_id,
            agent_type,
            recommendation: recommendation_for(&metric_name),
            metric_name,
            current_value,
            threshold_value,
            description,
            window_minutes,
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved: false,
            resolved_by: None,
            resolved_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertFilter {
    pub severity: Option<AlertSeverity>,
    pub agent_type: Option<AgentType>,
    pub acknowledged: Option<bool>,
    pub resolved: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AlertFilter {
    pub fn matches(&self, alert: &Alert) -> bool {
        self.severity.map_or(true, |s| alert.severity == s)
            && self.agent_type.map_or(true, |a| alert.agent_type == Some(a))
            && self.acknowledged.map_or(true, |ack| alert.acknowledged == ack)
            && self.resolved.map_or(true, |res| alert.resolved == res)
            && self.since.map_or(true, |since| alert.created_at >= since)
    }
}

/// Outcome of one evaluation cycle.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub evaluated_agents: usize,
    pub system: SystemSnapshot,
    pub alerts: Vec<Alert>,
}

type CooldownKey = (String, Option<AgentType>);

struct EvaluationWorker {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Evaluates alert rules against live health snapshots.
///
/// Each (rule, scope) pair is either quiet or cooling down. A breach while
/// quiet fires an alert and starts the severity's cooldown; breaches during
/// the cooldown are suppressed. Cooldown state lives in memory only, so a
/// restart resets suppression.
pub struct AlertEngine {
    store: Arc<dyn MetricStore>,
    health: Arc<HealthScoringEngine>,
    config: AlertingConfig,
    metrics: PipelineMetrics,
    rules: RwLock<Vec<AlertRule>>,
    cooldowns: Mutex<HashMap<CooldownKey, DateTime<Utc>>>,
    channels: HashMap<ChannelType, Arc<dyn NotificationChannel>>,
    worker: AsyncMutex<Option<EvaluationWorker>>,
}

impl fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertEngine")
            .field("config", &self.config)
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl AlertEngine {
    pub fn new(
        store: Arc<dyn MetricStore>,
        health: Arc<HealthScoringEngine>,
        config: AlertingConfig,
        metrics: PipelineMetrics,
    ) -> Self {
        let mut channels: HashMap<ChannelType, Arc<dyn NotificationChannel>> = HashMap::new();
        channels.insert(ChannelType::Log, Arc::new(LogChannel));

        Self {
            store,
            health,
            config,
            metrics,
            rules: RwLock::new(Self::default_alert_rules()),
            cooldowns: Mutex::new(HashMap::new()),
            channels,
            worker: AsyncMutex::new(None),
        }
    }

    /// Register a channel, replacing any existing channel of the same type.
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.insert(channel.channel_type(), channel);
        self
    }

    /// Default rule set seeded at startup
    pub fn default_alert_rules() -> Vec<AlertRule> {
        use ComparisonOperator::{Gt, Lt};

        let rule = |id: &str,
                    name: &str,
                    description: &str,
                    metric_name: &str,
                    operator: ComparisonOperator,
                    threshold: f64,
                    severity: AlertSeverity,
                    time_window_minutes: i64,
                    channels: &[ChannelType]| AlertRule {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            metric_name: metric_name.to_string(),
            operator,
            threshold,
            severity,
            time_window_minutes,
            agent_type: None,
            enabled: true,
            channels: channels.to_vec(),
        };

        vec![
            rule(
                "critical_latency",
                "Critical Response Latency",
                "Average response time above 10 seconds",
                "avg_latency_ms",
                Gt,
                10_000.0,
                AlertSeverity::Critical,
                5,
                &[
                    ChannelType::Log,
                    ChannelType::Dashboard,
                    ChannelType::Email,
                    ChannelType::Webhook,
                ],
            ),
            rule(
                "high_latency",
                "High Response Latency",
                "Average response time above 5 seconds",
                "avg_latency_ms",
                Gt,
                5_000.0,
                AlertSeverity::High,
                5,
                &[ChannelType::Log, ChannelType::Dashboard, ChannelType::Webhook],
            ),
            rule(
                "high_error_rate",
                "High Error Rate",
                "More than 10% of requests failing",
                "error_rate",
                Gt,
                0.10,
                AlertSeverity::High,
                10,
                &[ChannelType::Log, ChannelType::Dashboard, ChannelType::Email],
            ),
            rule(
                "low_health_score",
                "Low Agent Health Score",
                "Agent health score below 60",
                "health_score",
                Lt,
                60.0,
                AlertSeverity::Medium,
                15,
                &[ChannelType::Log, ChannelType::Dashboard],
            ),
            rule(
                "cost_spike",
                "Cost Spike",
                "Spend above $50 in the evaluation window",
                "total_cost",
                Gt,
                50.0,
                AlertSeverity::High,
                60,
                &[ChannelType::Log, ChannelType::Dashboard, ChannelType::Email],
            ),
            rule(
                "low_cache_hit_rate",
                "Low Cache Hit Rate",
                "Fewer than 30% of requests served from cache",
                "cache_hit_rate",
                Lt,
                0.30,
                AlertSeverity::Low,
                30,
                &[ChannelType::Log, ChannelType::Dashboard],
            ),
        ]
    }

    pub async fn list_rules(&self) -> Vec<AlertRule> {
        self.rules.read().await.clone()
    }

    /// Add a rule, or replace the rule with the same id.
    pub async fn add_custom_rule(&self, rule: AlertRule) -> Result<()> {
        validate_rule(&rule)?;

        let mut rules = self.rules.write().await;
        if let Some(existing) = rules.iter_mut().find(|r| r.id == rule.id) {
            *existing = rule;
            info!("Updated alert rule: {}", existing.id);
        } else {
            info!("Added new alert rule: {}", rule.id);
            rules.push(rule);
        }
        Ok(())
    }

    /// Remove a rule and forget its cooldown state.
    pub async fn remove_rule(&self, rule_id: &str) -> bool {
        let mut rules = self.rules.write().await;
        let initial_len = rules.len();
        rules.retain(|rule| rule.id != rule_id);
        let removed = rules.len() < initial_len;

        if removed {
            self.cooldowns
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _), _| id != rule_id);
            info!("Removed alert rule: {}", rule_id);
        }

        removed
    }

    pub async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        self.store.list_alerts(filter).await
    }

    pub async fn acknowledge_alert(&self, id: Uuid, actor: &str) -> Result<Alert> {
        let actor = validate_actor(actor)?;
        let alert = self
            .store
            .acknowledge_alert(id, actor, Utc::now())
            .await?
            .ok_or_else(|| MonitoringError::AlertNotFound { id: id.to_string() })?;

        info!("Alert {} acknowledged by {}", id, actor);
        Ok(alert)
    }

    pub async fn resolve_alert(&self, id: Uuid, actor: &str) -> Result<Alert> {
        let actor = validate_actor(actor)?;
        let alert = self
            .store
            .resolve_alert(id, actor, Utc::now())
            .await?
            .ok_or_else(|| MonitoringError::AlertNotFound { id: id.to_string() })?;

        info!("Alert {} resolved by {}", id, actor);
        Ok(alert)
    }

    /// Per-request checks that bypass rules and cooldowns.
    pub fn check_metric(&self, metric: &Metric) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let now = Utc::now();
        let agent = metric.agent_type;

        let latency_threshold = self.config.immediate_latency_threshold_ms;
        if metric.total_latency_ms > latency_threshold {
            alerts.push(Alert::new(
                now,
                AlertSeverity::High,
                "slow_request",
                None,
                Some(agent),
                "total_latency_ms",
                metric.total_latency_ms,
                latency_threshold,
                format!(
                    "Request {} for {} took {:.2}ms (threshold {:.2}ms)",
                    metric.request_id, agent, metric.total_latency_ms, latency_threshold
                ),
                0,
            ));
        }

        if metric.status == RequestStatus::Error {
            alerts.push(Alert::new(
                now,
                AlertSeverity::Medium,
                "request_error",
                None,
                Some(agent),
                "status",
                1.0,
                0.0,
                format!(
                    "Request {} for {} failed: {} ({})",
                    metric.request_id,
                    agent,
                    metric.error_message.as_deref().unwrap_or("no message"),
                    metric.error_type.as_deref().unwrap_or("unknown error")
                ),
                0,
            ));
        }

        let cost_threshold = self.config.immediate_cost_threshold;
        if metric.cost_estimate > cost_threshold {
            alerts.push(Alert::new(
                now,
                AlertSeverity::Medium,
                "expensive_request",
                None,
                Some(agent),
                "cost_estimate",
                metric.cost_estimate,
                cost_threshold,
                format!(
                    "Request {} for {} cost ${:.2} (threshold ${:.2}) using {}",
                    metric.request_id,
                    agent,
                    metric.cost_estimate,
                    cost_threshold,
                    metric.model_name
                ),
                0,
            ));
        }

        alerts
    }

    /// Raise alerts produced by [`check_metric`](Self::check_metric).
    pub async fn raise_immediate(&self, alerts: Vec<Alert>) {
        for alert in alerts {
            if let Err(e) = self.raise(&alert, None).await {
                error!("Failed to persist immediate alert {}: {}", alert.id, e);
            }
        }
    }

    /// Evaluate every enabled rule against the given snapshots at time `now`.
    ///
    /// Records cooldowns for the alerts it returns; the caller is expected to
    /// raise them.
    pub async fn evaluate_at(
        &self,
        snapshots: &[HealthSnapshot],
        system: &SystemSnapshot,
        now: DateTime<Utc>,
    ) -> Vec<(Alert, AlertRule)> {
        let rules: Vec<AlertRule> = self
            .rules
            .read()
            .await
            .iter()
            .filter(|rule| rule.enabled)
            .filter(|rule| {
                let known = is_known_metric(&rule.metric_name);
                if !known {
                    warn!(
                        rule_id = %rule.id,
                        "Skipping rule with unknown metric {}", rule.metric_name
                    );
                }
                known
            })
            .cloned()
            .collect();

        let mut fired = Vec::new();

        for snapshot in snapshots {
            for rule in rules.iter().filter(|r| r.applies_to(snapshot.agent_type)) {
                let Some(value) = snapshot.metric_value(&rule.metric_name) else {
                    continue;
                };
                if let Some(alert) = self.check_rule(rule, Some(snapshot.agent_type), value, now) {
                    fired.push((alert, rule.clone()));
                }
            }
        }

        for rule in rules.iter().filter(|r| r.agent_type.is_none()) {
            let Some(value) = system.metric_value(&rule.metric_name) else {
                continue;
            };
            if let Some(alert) = self.check_rule(rule, None, value, now) {
                fired.push((alert, rule.clone()));
            }
        }

        fired
    }

    fn check_rule(
        &self,
        rule: &AlertRule,
        scope: Option<AgentType>,
        value: f64,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        if !rule.operator.evaluate(value, rule.threshold) {
            return None;
        }

        if !self.try_start_cooldown((rule.id.clone(), scope), rule.severity, now) {
            self.metrics.alerts_suppressed_total.inc();
            debug!(rule_id = %rule.id, "Alert suppressed by cooldown");
            return None;
        }

        let scope_label = scope
            .map(|a| a.to_string())
            .unwrap_or_else(|| "system".to_string());

        Some(Alert::new(
            now,
            rule.severity,
            rule.id.clone(),
            Some(rule.id.clone()),
            scope,
            rule.metric_name.clone(),
            value,
            rule.threshold,
            format!(
                "{} for {}: {} is {:.2} (threshold {} {:.2})",
                rule.name,
                scope_label,
                rule.metric_name,
                value,
                rule.operator.symbol(),
                rule.threshold
            ),
            rule.time_window_minutes,
        ))
    }

    /// Returns true and records `now` if the key is not cooling down.
    fn try_start_cooldown(
        &self,
        key: CooldownKey,
        severity: AlertSeverity,
        now: DateTime<Utc>,
    ) -> bool {
        let mut cooldowns = self.cooldowns.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(last_fired) = cooldowns.get(&key) {
            if now - *last_fired < severity.cooldown() {
                return false;
            }
        }
        cooldowns.insert(key, now);
        true
    }

    /// Persist an alert, then notify its channels.
    ///
    /// Channels are notified even when persistence fails; the persistence
    /// error is returned afterwards.
    pub async fn raise(&self, alert: &Alert, rule: Option<&AlertRule>) -> Result<()> {
        let persisted = self.store.insert_alert(alert).await;
        if let Err(e) = &persisted {
            error!("Failed to persist alert {}: {}", alert.id, e);
        }

        self.metrics
            .alerts_fired_total
            .with_label_values(&[alert.severity.as_str()])
            .inc();

        self.dispatch(alert, rule).await;
        persisted
    }

    async fn dispatch(&self, alert: &Alert, rule: Option<&AlertRule>) {
        let channel_types: Vec<ChannelType> = match rule {
            Some(rule) => rule.channels.clone(),
            None => IMMEDIATE_CHANNELS.to_vec(),
        };

        let deliveries = channel_types
            .into_iter()
            .filter_map(|channel_type| match self.channels.get(&channel_type) {
                Some(channel) => Some((channel_type, channel.clone())),
                None => {
                    debug!("Channel {} not configured, skipping", channel_type);
                    None
                }
            })
            .map(|(channel_type, channel)| async move {
                (channel_type, channel.send(alert, rule).await)
            });

        for (channel_type, result) in join_all(deliveries).await {
            if let Err(e) = result {
                warn!(
                    alert_id = %alert.id,
                    "Notification via {} failed: {}", channel_type, e
                );
                self.metrics
                    .channel_failures_total
                    .with_label_values(&[channel_type.as_str()])
                    .inc();
            }
        }
    }

    /// One full evaluation cycle: health, system aggregates, rules, dispatch.
    pub async fn run_cycle(&self) -> Result<EvaluationReport> {
        let started = Instant::now();
        let now = Utc::now();
        let window = self.config.health_window_minutes;

        let snapshots = self.health.try_compute_health(None, window).await?;
        let system = self.health.system_snapshot(&snapshots, window);

        let mut first_error: Option<MonitoringError> = None;

        if self.config.persist_health_snapshots {
            if let Err(e) = self.persist_snapshots(&snapshots, &system).await {
                warn!("Failed to persist health snapshots: {}", e);
                first_error.get_or_insert(e);
            }
        }

        let fired = self.evaluate_at(&snapshots, &system, now).await;
        let mut alerts = Vec::with_capacity(fired.len());
        for (alert, rule) in fired {
            if let Err(e) = self.raise(&alert, Some(&rule)).await {
                first_error.get_or_insert(e);
            }
            alerts.push(alert);
        }

        self.metrics.evaluation_cycles_total.inc();
        self.metrics
            .evaluation_duration_seconds
            .observe(started.elapsed().as_secs_f64());

        debug!(
            "Alert evaluation cycle: {} agents, {} alerts in {}ms",
            snapshots.len(),
            alerts.len(),
            started.elapsed().as_millis()
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(EvaluationReport {
                evaluated_agents: snapshots.len(),
                system,
                alerts,
            }),
        }
    }

    async fn persist_snapshots(
        &self,
        snapshots: &[HealthSnapshot],
        system: &SystemSnapshot,
    ) -> Result<()> {
        for snapshot in snapshots {
            self.store.insert_health_snapshot(snapshot).await?;
        }
        self.store.insert_system_snapshot(system).await
    }

    /// Start the evaluation loop as a background task
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return Err(MonitoringError::Service(
                "Alert evaluation loop is already running".to_string(),
            ));
        }

        info!(
            "Starting alert evaluation loop with {} second interval",
            self.config.evaluation_interval_seconds
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            engine.evaluation_loop(shutdown_rx).await;
        });

        *worker = Some(EvaluationWorker {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Signal the loop to exit and wait for any in-flight cycle to finish.
    pub async fn stop(&self) {
        let Some(worker) = self.worker.lock().await.take() else {
            return;
        };

        info!("Stopping alert evaluation loop");
        if worker.shutdown_tx.send(true).is_err() {
            debug!("Alert evaluation loop already exited");
        }
        if let Err(e) = worker.handle.await {
            error!("Alert evaluation loop terminated abnormally: {}", e);
        }
    }

    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.is_some()
    }

    async fn evaluation_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = StdDuration::from_secs(self.config.evaluation_interval_seconds);
        let backoff = StdDuration::from_secs(self.config.error_backoff_seconds);

        loop {
            let delay = match self.run_cycle().await {
                Ok(report) => {
                    if !report.alerts.is_empty() {
                        info!("Evaluation cycle raised {} alerts", report.alerts.len());
                    }
                    interval
                }
                Err(e) => {
                    error!("Alert evaluation cycle failed: {}", e);
                    self.metrics.evaluation_failures_total.inc();
                    backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("Alert evaluation loop stopped");
    }
}

fn validate_rule(rule: &AlertRule) -> Result<()> {
    let invalid = |reason: &str| MonitoringError::InvalidRule {
        rule_id: rule.id.clone(),
        reason: reason.to_string(),
    };

    if rule.id.trim().is_empty() {
        return Err(invalid("rule id must not be empty"));
    }
    if rule.name.trim().is_empty() {
        return Err(invalid("rule name must not be empty"));
    }
    if !is_known_metric(&rule.metric_name) {
        return Err(MonitoringError::UnknownMetric {
            name: rule.metric_name.clone(),
        });
    }
    if !rule.threshold.is_finite() {
        return Err(invalid("threshold must be a finite number"));
    }
    if rule.time_window_minutes <= 0 {
        return Err(invalid("time window must be positive"));
    }
    Ok(())
}

fn validate_actor(actor: &str) -> Result<&str> {
    let actor = actor.trim();
    if actor.is_empty() {
        return Err(MonitoringError::Validation(
            "actor must not be empty".to_string(),
        ));
    }
    Ok(actor)
}

fn recommendation_for(metric_name: &str) -> Option<String> {
    let text = match metric_name {
        "avg_latency_ms" | "p95_latency_ms" | "p99_latency_ms" | "max_latency_ms"
        | "total_latency_ms" => {
            "Check model provider latency, consider a faster model or enable response caching"
        }
        "error_rate" | "failed_requests" | "status" => {
            "Inspect recent error messages and provider status; enable fallback models"
        }
        "health_score" | "avg_health_score" | "unhealthy_agents" => {
            "Review error rate and latency for the affected agents"
        }
        "total_cost" | "cost_estimate" => {
            "Review model selection and analysis depth; see cost recommendations"
        }
        "cache_hit_rate" => "Review cache keys and TTLs for frequently repeated analyses",
        "timeout_rate" => "Increase provider timeouts or reduce analysis depth",
        "rate_limit_rate" => "Spread requests over time or raise provider rate limits",
        _ => return None,
    };
    Some(text.to_string())
}

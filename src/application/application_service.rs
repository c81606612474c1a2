use crate::application::DependencyContainer;
use crate::monitoring::{
    AgentType, Alert, AlertFilter, AlertRule, CostAnalysis, DashboardUpdate, EvaluationReport,
    HealthSnapshot, Recommendation, Result, SystemSnapshot,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

/// Caller-facing operations of the monitoring pipeline
pub struct ApplicationService {
    container: Arc<DependencyContainer>,
}

/// Live view used by dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct RealTimeMetrics {
    pub generated_at: DateTime<Utc>,
    pub system: SystemSnapshot,
    pub agents: Vec<HealthSnapshot>,
    /// Open unacknowledged alerts per severity.
    pub unacknowledged_alerts: BTreeMap<String, usize>,
}

impl ApplicationService {
    pub fn new(container: Arc<DependencyContainer>) -> Self {
        Self { container }
    }

    pub async fn get_health_status(&self) -> anyhow::Result<bool> {
        self.container.health_check().await
    }

    /// Health per agent. `agent_type` is parsed leniently (`seo-discoverability`
    /// and `SEO_DISCOVERABILITY` both work).
    pub async fn get_agent_health(
        &self,
        agent_type: Option<&str>,
        window_minutes: i64,
    ) -> Result<Vec<HealthSnapshot>> {
        let agent_type = agent_type.map(str::parse::<AgentType>).transpose()?;
        self.container
            .health_engine
            .compute_health(agent_type, window_minutes)
            .await
    }

    pub async fn get_real_time_metrics(&self, window_minutes: i64) -> Result<RealTimeMetrics> {
        let health = &self.container.health_engine;
        let agents = health.compute_health(None, window_minutes).await?;
        let system = health.system_snapshot(&agents, window_minutes);

        let open = AlertFilter {
            acknowledged: Some(false),
            resolved: Some(false),
            ..Default::default()
        };
        let mut unacknowledged_alerts = BTreeMap::new();
        match self.container.alert_engine.list_alerts(&open).await {
            Ok(alerts) => {
                for alert in alerts {
                    *unacknowledged_alerts
                        .entry(alert.severity.as_str().to_string())
                        .or_insert(0) += 1;
                }
            }
            Err(e) => warn!("Failed to count open alerts: {}", e),
        }

        Ok(RealTimeMetrics {
            generated_at: Utc::now(),
            system,
            agents,
            unacknowledged_alerts,
        })
    }

    pub async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        self.container.alert_engine.list_alerts(filter).await
    }

    pub async fn acknowledge_alert(&self, id: Uuid, actor: &str) -> Result<Alert> {
        self.container.alert_engine.acknowledge_alert(id, actor).await
    }

    pub async fn resolve_alert(&self, id: Uuid, actor: &str) -> Result<Alert> {
        self.container.alert_engine.resolve_alert(id, actor).await
    }

    pub async fn analyze_costs(&self, window_hours: i64) -> Result<Vec<CostAnalysis>> {
        self.container.cost_analyzer.analyze_costs(window_hours).await
    }

    pub async fn generate_recommendations(&self, window_hours: i64) -> Result<Vec<Recommendation>> {
        self.container
            .recommender
            .generate_recommendations(window_hours)
            .await
    }

    pub async fn mark_recommendation_implemented(&self, id: Uuid) -> Result<Recommendation> {
        self.container.recommender.mark_implemented(id).await
    }

    pub async fn record_actual_savings(&self, id: Uuid, daily_savings: f64) -> Result<Recommendation> {
        self.container
            .recommender
            .record_actual_savings(id, daily_savings)
            .await
    }

    pub async fn evaluate_once(&self) -> Result<EvaluationReport> {
        self.container.alert_engine.run_cycle().await
    }

    pub async fn list_rules(&self) -> Vec<AlertRule> {
        self.container.alert_engine.list_rules().await
    }

    pub async fn add_custom_rule(&self, rule: AlertRule) -> Result<()> {
        self.container.alert_engine.add_custom_rule(rule).await
    }

    pub async fn remove_rule(&self, rule_id: &str) -> bool {
        self.container.alert_engine.remove_rule(rule_id).await
    }

    pub fn subscribe_dashboard(&self) -> broadcast::Receiver<DashboardUpdate> {
        self.container.dashboard.subscribe()
    }

    /// Pipeline self-metrics in Prometheus text format
    pub fn pipeline_metrics_text(&self) -> anyhow::Result<String> {
        self.container.pipeline_metrics.gather_text()
    }
}

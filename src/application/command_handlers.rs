use crate::application::{ApplicationLifecycle, ApplicationService};
use crate::database_setup::DatabaseSetup;
use crate::monitoring::{AgentType, AlertFilter, AlertSeverity};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Runs the pipeline until a shutdown signal arrives
pub struct ServerCommandHandler {
    service: Arc<ApplicationService>,
    lifecycle: Arc<ApplicationLifecycle>,
}

impl ServerCommandHandler {
    pub fn new(service: Arc<ApplicationService>, lifecycle: Arc<ApplicationLifecycle>) -> Self {
        Self { service, lifecycle }
    }

    pub async fn run_server(&self) -> Result<()> {
        self.lifecycle.start_background_services().await?;

        let mut updates = self.service.subscribe_dashboard();
        let dashboard_task = tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => info!(
                        severity = %update.alert.severity,
                        "Dashboard update: {}",
                        update.alert.description
                    ),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Dashboard feed lagged, skipped {} updates", skipped)
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        info!("Agent monitor running. Press Ctrl+C to stop");
        self.lifecycle.wait_for_shutdown().await;

        let result = self.lifecycle.shutdown().await;
        dashboard_task.abort();
        result
    }
}

pub struct HealthCommandHandler {
    service: Arc<ApplicationService>,
}

impl HealthCommandHandler {
    pub fn new(service: Arc<ApplicationService>) -> Self {
        Self { service }
    }

    pub async fn run_health_check(&self, agent: Option<&str>, window_minutes: i64) -> Result<()> {
        match self.service.get_health_status().await {
            Ok(true) => info!("Metric store is healthy"),
            _ => error!("Metric store health check failed"),
        }

        let snapshots = self.service.get_agent_health(agent, window_minutes).await?;
        if snapshots.is_empty() {
            info!("No agent activity in the last {} minutes", window_minutes);
        }
        print_json(&snapshots)
    }

    pub async fn show_realtime(&self, window_minutes: i64) -> Result<()> {
        let metrics = self.service.get_real_time_metrics(window_minutes).await?;
        print_json(&metrics)
    }
}

pub struct AlertCommandHandler {
    service: Arc<ApplicationService>,
}

impl AlertCommandHandler {
    pub fn new(service: Arc<ApplicationService>) -> Self {
        Self { service }
    }

    pub async fn list_alerts(
        &self,
        severity: Option<&str>,
        agent: Option<&str>,
        unacknowledged_only: bool,
        limit: usize,
    ) -> Result<()> {
        let filter = AlertFilter {
            severity: severity.map(str::parse::<AlertSeverity>).transpose()?,
            agent_type: agent.map(str::parse::<AgentType>).transpose()?,
            acknowledged: unacknowledged_only.then_some(false),
            limit: Some(limit),
            ..Default::default()
        };
        let alerts = self.service.list_alerts(&filter).await?;
        print_json(&alerts)
    }

    pub async fn acknowledge(&self, id: Uuid, actor: &str) -> Result<()> {
        let alert = self.service.acknowledge_alert(id, actor).await?;
        info!("Alert {} acknowledged by {}", id, actor);
        print_json(&alert)
    }

    pub async fn resolve(&self, id: Uuid, actor: &str) -> Result<()> {
        let alert = self.service.resolve_alert(id, actor).await?;
        info!("Alert {} resolved by {}", id, actor);
        print_json(&alert)
    }

    pub async fn list_rules(&self) -> Result<()> {
        print_json(&self.service.list_rules().await)
    }

    /// Run a single evaluation cycle and print what fired
    pub async fn evaluate_once(&self) -> Result<()> {
        let report = self.service.evaluate_once().await?;
        info!(
            "Evaluated {} agents, {} alerts fired",
            report.evaluated_agents,
            report.alerts.len()
        );
        print_json(&report)
    }
}

pub struct CostCommandHandler {
    service: Arc<ApplicationService>,
}

impl CostCommandHandler {
    pub fn new(service: Arc<ApplicationService>) -> Self {
        Self { service }
    }

    pub async fn analyze(&self, window_hours: i64) -> Result<()> {
        let analyses = self.service.analyze_costs(window_hours).await?;
        let total: f64 = analyses.iter().map(|a| a.daily_cost).sum();
        info!(
            "Projected daily cost across {} agents: ${:.2}",
            analyses.len(),
            total
        );
        print_json(&analyses)
    }

    pub async fn recommend(&self, window_hours: i64) -> Result<()> {
        let recommendations = self.service.generate_recommendations(window_hours).await?;
        let savings: f64 = recommendations
            .iter()
            .map(|r| r.estimated_daily_savings)
            .sum();
        info!(
            "{} recommendations, estimated savings ${:.2}/day",
            recommendations.len(),
            savings
        );
        print_json(&recommendations)
    }
}

/// Schema bootstrap; does not need a running pipeline
pub struct DatabaseCommandHandler {
    database_setup: DatabaseSetup,
}

impl DatabaseCommandHandler {
    pub fn new(database_url: String) -> Self {
        Self {
            database_setup: DatabaseSetup::new(database_url),
        }
    }

    pub async fn setup(&self) -> Result<()> {
        self.database_setup.setup().await?;
        info!("Database is ready. Start the pipeline with: agent-monitor serve");
        Ok(())
    }

    pub async fn check_health(&self) -> Result<()> {
        let health = self.database_setup.health_check().await?;
        if health.is_healthy() {
            info!("Database: {}", health.status_summary());
        } else {
            warn!("Database: {}", health.status_summary());
        }
        print_json(&health)
    }
}

pub struct MetricsCommandHandler {
    service: Arc<ApplicationService>,
}

impl MetricsCommandHandler {
    pub fn new(service: Arc<ApplicationService>) -> Self {
        Self { service }
    }

    pub fn print_metrics(&self) -> Result<()> {
        print!("{}", self.service.pipeline_metrics_text()?);
        Ok(())
    }
}

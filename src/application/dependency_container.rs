use crate::{
    config::StoreBackend,
    database_setup::create_pool,
    monitoring::{
        AlertEngine, CostAnalyzer, DashboardChannel, EmailChannel, HealthScoringEngine,
        InMemoryMetricStore, MetricStore, MetricsTracker, OptimizationRecommender,
        PipelineMetrics, PostgresMetricStore, WebhookChannel,
    },
    Config,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Dependency injection container: one instance of each pipeline service per process
pub struct DependencyContainer {
    // Core configuration
    pub config: Config,

    // Storage layer
    pub store: Arc<dyn MetricStore>,

    // Service layer
    pub health_engine: Arc<HealthScoringEngine>,
    pub alert_engine: Arc<AlertEngine>,
    pub tracker: Arc<MetricsTracker>,
    pub cost_analyzer: Arc<CostAnalyzer>,
    pub recommender: Arc<OptimizationRecommender>,

    // Infrastructure layer
    pub pipeline_metrics: PipelineMetrics,
    pub dashboard: DashboardChannel,
}

impl DependencyContainer {
    pub async fn new() -> Result<Self> {
        let config = Config::from_env().context("Failed to load configuration")?;
        Self::from_config(config).await
    }

    pub async fn from_config(config: Config) -> Result<Self> {
        info!("Initializing dependency container...");
        config.validate()?;

        match config.storage.backend {
            StoreBackend::Postgres => {
                let db_pool = Arc::new(
                    create_pool(
                        &config.storage.database_url,
                        config.storage.max_db_connections,
                    )
                    .await?,
                );
                Self::with_store(config, Arc::new(PostgresMetricStore::new(db_pool)))
            }
            StoreBackend::Memory => {
                warn!("Using in-memory metric store; metrics are lost on exit");
                Self::with_store(config, Arc::new(InMemoryMetricStore::new()))
            }
        }
    }

    /// Wire every service around an existing store.
    pub fn with_store(config: Config, store: Arc<dyn MetricStore>) -> Result<Self> {
        let pipeline_metrics = PipelineMetrics::new()?;

        let health_engine = Arc::new(
            HealthScoringEngine::new(store.clone())
                .with_unhealthy_threshold(config.alerting.unhealthy_score_threshold),
        );

        let dashboard = DashboardChannel::new(config.notifications.dashboard_buffer);
        let alert_engine = Arc::new(Self::create_alert_engine(
            &config,
            store.clone(),
            health_engine.clone(),
            pipeline_metrics.clone(),
            dashboard.clone(),
        )?);

        let tracker = Arc::new(
            MetricsTracker::new(
                store.clone(),
                config.ingestion.clone(),
                pipeline_metrics.clone(),
            )
            .with_alert_engine(alert_engine.clone()),
        );

        let cost_analyzer = Arc::new(CostAnalyzer::new(store.clone()));
        let recommender = Arc::new(OptimizationRecommender::new(cost_analyzer.clone()));

        info!("Dependency container initialized");

        Ok(Self {
            config,
            store,
            health_engine,
            alert_engine,
            tracker,
            cost_analyzer,
            recommender,
            pipeline_metrics,
            dashboard,
        })
    }

    fn create_alert_engine(
        config: &Config,
        store: Arc<dyn MetricStore>,
        health_engine: Arc<HealthScoringEngine>,
        pipeline_metrics: PipelineMetrics,
        dashboard: DashboardChannel,
    ) -> Result<AlertEngine> {
        let notifications = &config.notifications;
        let mut engine = AlertEngine::new(
            store,
            health_engine,
            config.alerting.clone(),
            pipeline_metrics,
        )
        .with_channel(Arc::new(dashboard));

        if !notifications.email_recipients.is_empty() {
            engine = engine.with_channel(Arc::new(EmailChannel::new(
                notifications.email_recipients.clone(),
                notifications.email_relay_url.clone(),
                notifications.request_timeout_seconds,
            )?));
            info!(
                "Email alerts enabled for {} recipients",
                notifications.email_recipients.len()
            );
        }

        if let Some(url) = &notifications.webhook_url {
            engine = engine.with_channel(Arc::new(WebhookChannel::new(
                url.clone(),
                notifications.request_timeout_seconds,
            )?));
            info!("Webhook alerts enabled");
        }

        Ok(engine)
    }

    pub async fn health_check(&self) -> Result<bool> {
        match self.store.health_check().await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("Metric store health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> Config {
        let mut config = Config::default();
        config.storage.backend = StoreBackend::Memory;
        config
    }

    #[tokio::test]
    async fn test_services_share_one_store() {
        let store = Arc::new(InMemoryMetricStore::new());
        let container = DependencyContainer::with_store(memory_config(), store.clone()).unwrap();

        assert!(container.health_check().await.unwrap());
        assert!(Arc::ptr_eq(
            &container.store,
            &(store.clone() as Arc<dyn MetricStore>)
        ));
        assert!(container.recommender.list_recommendations().await.is_empty());
    }

    #[tokio::test]
    async fn test_memory_backend_needs_no_database() {
        let container = DependencyContainer::from_config(memory_config()).await.unwrap();
        assert!(container.health_check().await.unwrap());
        assert_eq!(container.tracker.buffered_count(), 0);
    }
}

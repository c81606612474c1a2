pub mod application;
pub mod config;
pub mod database_setup;
pub mod monitoring;
pub mod security;

pub use application::{Application, ApplicationService, DependencyContainer};
pub use config::Config;
pub use database_setup::{DatabaseHealth, DatabaseSetup};

// Re-export monitoring types
pub use monitoring::{
    AgentType, Alert, AlertEngine, AlertRule, AlertSeverity, CostAnalysis, CostAnalyzer,
    HealthScoringEngine, HealthSnapshot, InMemoryMetricStore, Metric, MetricStore,
    MetricsTracker, MonitoringError, OptimizationRecommender, PostgresMetricStore,
    Recommendation, RequestContext, RequestFailure, RequestStatus, SystemSnapshot,
};

// Re-export security types
pub use security::{AuthenticatedRequest, RequestValidator, ValidatedRequest};

use crate::Config;
use anyhow::Result;
use std::sync::Arc;

pub mod application_service;
pub mod command_handlers;
pub mod dependency_container;
pub mod lifecycle;

pub use application_service::{ApplicationService, RealTimeMetrics};
pub use command_handlers::{
    AlertCommandHandler, CostCommandHandler, DatabaseCommandHandler, HealthCommandHandler,
    MetricsCommandHandler, ServerCommandHandler,
};
pub use dependency_container::DependencyContainer;
pub use lifecycle::ApplicationLifecycle;

/// Application layer - coordinates pipeline services without containing monitoring logic
pub struct Application {
    pub container: Arc<DependencyContainer>,
    pub service: Arc<ApplicationService>,
    pub lifecycle: Arc<ApplicationLifecycle>,
}

impl Application {
    pub async fn new() -> Result<Self> {
        Self::from_config(Config::from_env()?).await
    }

    pub async fn from_config(config: Config) -> Result<Self> {
        let container = Arc::new(DependencyContainer::from_config(config).await?);
        Ok(Self::from_container(container))
    }

    pub fn from_container(container: Arc<DependencyContainer>) -> Self {
        let service = Arc::new(ApplicationService::new(container.clone()));
        let lifecycle = Arc::new(ApplicationLifecycle::new(container.clone()));

        Self {
            container,
            service,
            lifecycle,
        }
    }

    pub async fn initialize(&self) -> Result<()> {
        self.lifecycle.initialize().await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.lifecycle.shutdown().await
    }
}

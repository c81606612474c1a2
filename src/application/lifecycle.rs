use crate::application::DependencyContainer;
use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Manages application lifecycle events and graceful shutdown
pub struct ApplicationLifecycle {
    container: Arc<DependencyContainer>,
}

impl ApplicationLifecycle {
    pub fn new(container: Arc<DependencyContainer>) -> Self {
        Self { container }
    }

    /// Validate configuration and check the metric store
    pub async fn initialize(&self) -> Result<()> {
        info!("Initializing application...");

        self.container.config.validate()?;

        if !self.container.health_check().await? {
            return Err(anyhow::anyhow!(
                "Metric store is not reachable or its schema is missing; run `agent-monitor setup-db`"
            ));
        }

        info!("Application initialized");
        Ok(())
    }

    /// Start the flush worker and the alert evaluation loop
    pub async fn start_background_services(&self) -> Result<()> {
        self.container.tracker.start().await?;
        self.container.alert_engine.start().await?;
        info!("Background services started");
        Ok(())
    }

    /// Stop the alert loop, then write out everything still buffered
    pub async fn shutdown(&self) -> Result<()> {
        info!("Initiating graceful shutdown...");

        self.container.alert_engine.stop().await;

        match self.container.tracker.stop().await {
            Ok(flushed) => info!("Final flush wrote {} metrics", flushed),
            Err(e) => error!("Final metric flush failed: {}", e),
        }

        info!("Graceful shutdown completed");
        Ok(())
    }

    /// Wait for shutdown signals
    pub async fn wait_for_shutdown(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    error!("Failed to install terminate signal handler: {}", e);
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        info!("Shutdown signal received");
    }
}

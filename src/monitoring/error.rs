use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitoringError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Unknown agent type: {value}")]
    InvalidAgentType { value: String },

    #[error("Invalid alert rule {rule_id}: {reason}")]
    InvalidRule { rule_id: String, reason: String },

    #[error("Unknown metric name: {name}")]
    UnknownMetric { name: String },

    #[error("Alert not found: {id}")]
    AlertNotFound { id: String },

    #[error("Recommendation not found: {id}")]
    RecommendationNotFound { id: String },

    #[error("Notification channel {channel} failed: {message}")]
    Channel { channel: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Service error: {0}")]
    Service(String),
}

impl MonitoringError {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn channel(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Channel {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// True for errors caused by the caller's own input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAgentType { .. }
                | Self::InvalidRule { .. }
                | Self::UnknownMetric { .. }
                | Self::AlertNotFound { .. }
                | Self::RecommendationNotFound { .. }
                | Self::Validation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MonitoringError>;

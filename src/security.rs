//! Request authentication checks applied before a request is tracked.

use crate::monitoring::{AgentType, MonitoringError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Anything that carries the identity of the caller and the agent it targets.
pub trait AuthenticatedRequest {
    fn user_id(&self) -> &str;

    /// Requested agent type, as supplied by the caller.
    fn agent_type(&self) -> &str;
}

/// Identity that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedRequest {
    pub user_id: String,
    pub agent_type: AgentType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestValidator {
    max_user_id_length: usize,
    allowed_agents: Vec<AgentType>,
}

impl Default for RequestValidator {
    fn default() -> Self {
        Self {
            max_user_id_length: 256,
            allowed_agents: AgentType::ALL.to_vec(),
        }
    }
}

impl RequestValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict which agent types callers may target.
    pub fn with_allowed_agents(mut self, agents: impl IntoIterator<Item = AgentType>) -> Self {
        self.allowed_agents = agents.into_iter().collect();
        self
    }

    pub fn validate<R: AuthenticatedRequest + ?Sized>(&self, request: &R) -> Result<ValidatedRequest> {
        let user_id = request.user_id().trim();
        if user_id.is_empty() {
            warn!("Rejected request without a user id");
            return Err(MonitoringError::Validation(
                "user id must not be empty".to_string(),
            ));
        }
        if user_id.len() > self.max_user_id_length {
            return Err(MonitoringError::Validation(format!(
                "user id exceeds {} characters",
                self.max_user_id_length
            )));
        }
        if user_id.chars().any(char::is_control) {
            return Err(MonitoringError::Validation(
                "user id contains control characters".to_string(),
            ));
        }

        let agent_type: AgentType = request.agent_type().parse()?;
        if !self.allowed_agents.contains(&agent_type) {
            warn!(user_id, agent_type = %agent_type, "Agent type not permitted");
            return Err(MonitoringError::Validation(format!(
                "agent type {agent_type} is not permitted"
            )));
        }

        debug!(user_id, agent_type = %agent_type, "Request validated");
        Ok(ValidatedRequest {
            user_id: user_id.to_string(),
            agent_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestRequest {
        user: &'static str,
        agent: &'static str,
    }

    impl AuthenticatedRequest for TestRequest {
        fn user_id(&self) -> &str {
            self.user
        }

        fn agent_type(&self) -> &str {
            self.agent
        }
    }

    #[test]
    fn test_valid_request() {
        let validated = RequestValidator::new()
            .validate(&TestRequest {
                user: " creator-42 ",
                agent: "seo_discoverability",
            })
            .unwrap();

        assert_eq!(validated.user_id, "creator-42");
        assert_eq!(validated.agent_type, AgentType::SeoDiscoverability);
    }

    #[test]
    fn test_rejects_missing_user_and_unknown_agent() {
        let validator = RequestValidator::new();

        let err = validator
            .validate(&TestRequest {
                user: "  ",
                agent: "content_analysis",
            })
            .unwrap_err();
        assert!(err.is_client_error());

        let err = validator
            .validate(&TestRequest {
                user: "creator",
                agent: "thumbnail_magic",
            })
            .unwrap_err();
        assert!(matches!(err, MonitoringError::InvalidAgentType { .. }));
    }

    #[test]
    fn test_allowed_agents() {
        let validator = RequestValidator::new().with_allowed_agents([AgentType::BossAgent]);
        assert!(validator
            .validate(&TestRequest {
                user: "creator",
                agent: "content_analysis",
            })
            .is_err());
        assert!(validator
            .validate(&TestRequest {
                user: "creator",
                agent: "boss_agent",
            })
            .is_ok());
    }
}

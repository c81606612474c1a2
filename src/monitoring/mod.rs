pub mod alerts;
pub mod channels;
pub mod cost;
pub mod error;
pub mod health;
pub mod metrics;
pub mod recommendations;
pub mod repository;
pub mod tracker;

pub use alerts::*;
pub use channels::*;
pub use cost::*;
pub use error::{MonitoringError, Result};
pub use health::*;
pub use metrics::*;
pub use recommendations::*;
pub use repository::*;
pub use tracker::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Request handler categories whose metrics are tracked separately.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    ContentAnalysis,
    AudienceInsights,
    SeoDiscoverability,
    CompetitiveAnalysis,
    MonetizationStrategy,
    BossAgent,
}

impl AgentType {
    pub const ALL: [AgentType; 6] = [
        AgentType::ContentAnalysis,
        AgentType::AudienceInsights,
        AgentType::SeoDiscoverability,
        AgentType::CompetitiveAnalysis,
        AgentType::MonetizationStrategy,
        AgentType::BossAgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::ContentAnalysis => "content_analysis",
            AgentType::AudienceInsights => "audience_insights",
            AgentType::SeoDiscoverability => "seo_discoverability",
            AgentType::CompetitiveAnalysis => "competitive_analysis",
            AgentType::MonetizationStrategy => "monetization_strategy",
            AgentType::BossAgent => "boss_agent",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = MonitoringError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        AgentType::ALL
            .iter()
            .copied()
            .find(|agent| agent.as_str() == normalized)
            .ok_or_else(|| MonitoringError::InvalidAgentType {
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    Quick,
    #[default]
    Standard,
    Deep,
}

impl AnalysisDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisDepth::Quick => "quick",
            AnalysisDepth::Standard => "standard",
            AnalysisDepth::Deep => "deep",
        }
    }
}

impl fmt::Display for AnalysisDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisDepth {
    type Err = MonitoringError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(AnalysisDepth::Quick),
            "standard" => Ok(AnalysisDepth::Standard),
            "deep" => Ok(AnalysisDepth::Deep),
            other => Err(MonitoringError::Validation(format!(
                "unknown analysis depth: {other}"
            ))),
        }
    }
}

/// Terminal status of a completed agent request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Success,
    Error,
    Timeout,
    RateLimited,
    CacheHit,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
            RequestStatus::Timeout => "timeout",
            RequestStatus::RateLimited => "rate_limited",
            RequestStatus::CacheHit => "cache_hit",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = MonitoringError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(RequestStatus::Success),
            "error" => Ok(RequestStatus::Error),
            "timeout" => Ok(RequestStatus::Timeout),
            "rate_limited" => Ok(RequestStatus::RateLimited),
            "cache_hit" => Ok(RequestStatus::CacheHit),
            other => Err(MonitoringError::Validation(format!(
                "unknown request status: {other}"
            ))),
        }
    }
}

/// One record per completed agent request. Written exactly once to the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metric {
    pub request_id: Uuid,
    pub agent_type: AgentType,
    pub user_id: String,
    pub request_type: String,
    pub timestamp: DateTime<Utc>,

    pub request_size_bytes: i64,
    pub response_size_bytes: i64,

    pub total_latency_ms: f64,
    pub agent_processing_time_ms: f64,
    pub model_latency_ms: f64,
    pub cache_lookup_time_ms: Option<f64>,

    pub model_name: String,
    pub model_provider: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_estimate: f64,

    pub fallback_used: bool,
    pub fallback_model: Option<String>,

    pub status: RequestStatus,
    pub error_type: Option<String>,
    pub error_message: Option<String>,

    pub cache_hit: bool,
    pub cache_key: Option<String>,
    pub cache_ttl_remaining_seconds: Option<i64>,

    pub analysis_depth: AnalysisDepth,
    pub confidence_score: Option<f64>,
}

impl Metric {
    /// Zero-valued metric for a request that is about to start.
    pub fn new(
        agent_type: AgentType,
        user_id: impl Into<String>,
        request_type: impl Into<String>,
        analysis_depth: AnalysisDepth,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            agent_type,
            user_id: user_id.into(),
            request_type: request_type.into(),
            timestamp: Utc::now(),
            request_size_bytes: 0,
            response_size_bytes: 0,
            total_latency_ms: 0.0,
            agent_processing_time_ms: 0.0,
            model_latency_ms: 0.0,
            cache_lookup_time_ms: None,
            model_name: String::new(),
            model_provider: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            cost_estimate: 0.0,
            fallback_used: false,
            fallback_model: None,
            status: RequestStatus::Success,
            error_type: None,
            error_message: None,
            cache_hit: false,
            cache_key: None,
            cache_ttl_remaining_seconds: None,
            analysis_depth,
            confidence_score: None,
        }
    }

    pub fn total_tokens(&self) -> i64 {
        self.input_tokens + self.output_tokens
    }
}

/// Counts, sums and means over a window of metrics, as returned by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AggregateStats {
    pub total_requests: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub timeout_count: i64,
    pub rate_limited_count: i64,
    pub cache_hit_count: i64,
    pub fallback_count: i64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cost: f64,
    pub avg_confidence: Option<f64>,
}

impl AggregateStats {
    fn ratio(&self, count: i64) -> f64 {
        if self.total_requests > 0 {
            count as f64 / self.total_requests as f64
        } else {
            0.0
        }
    }

    pub fn successful_requests(&self) -> i64 {
        self.success_count + self.cache_hit_count
    }

    pub fn failed_requests(&self) -> i64 {
        self.error_count + self.timeout_count + self.rate_limited_count
    }

    pub fn error_rate(&self) -> f64 {
        self.ratio(self.error_count)
    }

    pub fn timeout_rate(&self) -> f64 {
        self.ratio(self.timeout_count)
    }

    pub fn rate_limit_rate(&self) -> f64 {
        self.ratio(self.rate_limited_count)
    }

    pub fn cache_hit_rate(&self) -> f64 {
        self.ratio(self.cache_hit_count)
    }

    pub fn fallback_rate(&self) -> f64 {
        self.ratio(self.fallback_count)
    }

    pub fn total_tokens(&self) -> i64 {
        self.total_input_tokens + self.total_output_tokens
    }

    pub fn avg_input_tokens(&self) -> f64 {
        self.ratio(self.total_input_tokens)
    }

    pub fn avg_output_tokens(&self) -> f64 {
        self.ratio(self.total_output_tokens)
    }

    pub fn avg_cost_per_request(&self) -> f64 {
        if self.total_requests > 0 {
            self.total_cost / self.total_requests as f64
        } else {
            0.0
        }
    }
}

/// Cost and usage of one (model, analysis depth) group for a single agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostGroupRow {
    pub model_name: String,
    pub model_provider: String,
    pub analysis_depth: AnalysisDepth,
    pub request_count: i64,
    pub total_cost: f64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub cache_hits: i64,
}

impl CostGroupRow {
    pub fn avg_cost_per_request(&self) -> f64 {
        if self.request_count > 0 {
            self.total_cost / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HourlyCost {
    pub hour: DateTime<Utc>,
    pub cost: f64,
}

/// Aggregated performance of one agent over a trailing window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSnapshot {
    pub agent_type: AgentType,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub window_minutes: i64,

    pub total_requests: i64,
    pub successful_requests: i64,
    pub failed_requests: i64,
    pub cache_hits: i64,

    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub max_latency_ms: f64,

    pub total_tokens: i64,
    pub total_cost: f64,

    pub error_rate: f64,
    pub timeout_rate: f64,
    pub rate_limit_rate: f64,
    pub cache_hit_rate: f64,

    pub health_score: f64,
}

impl HealthSnapshot {
    pub const METRIC_NAMES: [&'static str; 14] = [
        "total_requests",
        "successful_requests",
        "failed_requests",
        "cache_hits",
        "avg_latency_ms",
        "p95_latency_ms",
        "p99_latency_ms",
        "max_latency_ms",
        "total_tokens",
        "total_cost",
        "error_rate",
        "timeout_rate",
        "rate_limit_rate",
        "cache_hit_rate",
    ];

    /// Value of a named metric, or None if the name is not a snapshot metric.
    pub fn metric_value(&self, name: &str) -> Option<f64> {
        let value = match name {
            "total_requests" => self.total_requests as f64,
            "successful_requests" => self.successful_requests as f64,
            "failed_requests" => self.failed_requests as f64,
            "cache_hits" => self.cache_hits as f64,
            "avg_latency_ms" => self.avg_latency_ms,
            "p95_latency_ms" => self.p95_latency_ms,
            "p99_latency_ms" => self.p99_latency_ms,
            "max_latency_ms" => self.max_latency_ms,
            "total_tokens" => self.total_tokens as f64,
            "total_cost" => self.total_cost,
            "error_rate" => self.error_rate,
            "timeout_rate" => self.timeout_rate,
            "rate_limit_rate" => self.rate_limit_rate,
            "cache_hit_rate" => self.cache_hit_rate,
            "health_score" => self.health_score,
            _ => return None,
        };
        Some(value)
    }
}

/// System-wide aggregates derived from a set of agent snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemSnapshot {
    pub timestamp: DateTime<Utc>,
    pub window_minutes: i64,
    pub active_agents: i64,
    pub total_requests: i64,
    pub total_cost: f64,
    pub avg_health_score: f64,
    pub unhealthy_agents: i64,
}

impl SystemSnapshot {
    pub const METRIC_NAMES: [&'static str; 5] = [
        "active_agents",
        "total_requests",
        "total_cost",
        "avg_health_score",
        "unhealthy_agents",
    ];

    pub fn metric_value(&self, name: &str) -> Option<f64> {
        let value = match name {
            "active_agents" => self.active_agents as f64,
            "total_requests" => self.total_requests as f64,
            "total_cost" => self.total_cost,
            "avg_health_score" => self.avg_health_score,
            "unhealthy_agents" => self.unhealthy_agents as f64,
            _ => return None,
        };
        Some(value)
    }
}

/// True if `name` resolves against agent snapshots or the system snapshot.
pub fn is_known_metric(name: &str) -> bool {
    name == "health_score"
        || HealthSnapshot::METRIC_NAMES.contains(&name)
        || SystemSnapshot::METRIC_NAMES.contains(&name)
}

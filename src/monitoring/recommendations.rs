use super::cost::{CostAnalysis, CostAnalyzer, ModelCatalog};
use super::error::{MonitoringError, Result};
use super::AgentType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

pub const MAX_RECOMMENDATIONS: usize = 10;
/// Agents above this many requests in the window count as busy.
pub const BUSY_AGENT_REQUESTS: i64 = 50;
/// Busy agents needed before system-wide recommendations are made.
pub const MIN_BUSY_AGENTS: usize = 3;
pub const FALLBACK_RATE_THRESHOLD: f64 = 0.10;
/// Daily savings at or above which a recommendation is high priority.
pub const HIGH_PRIORITY_SAVINGS: f64 = 10.0;
pub const MEDIUM_PRIORITY_SAVINGS: f64 = 1.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    ModelSelection,
    CachingImprovement,
    RequestBatching,
    AnalysisDepthTuning,
    UsagePatternOptimization,
    FallbackStrategy,
}

impl RecommendationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationCategory::ModelSelection => "model_selection",
            RecommendationCategory::CachingImprovement => "caching_improvement",
            RecommendationCategory::RequestBatching => "request_batching",
            RecommendationCategory::AnalysisDepthTuning => "analysis_depth_tuning",
            RecommendationCategory::UsagePatternOptimization => "usage_pattern_optimization",
            RecommendationCategory::FallbackStrategy => "fallback_strategy",
        }
    }

    /// Share of the current daily cost expected to be saved.
    pub fn savings_multiplier(&self) -> f64 {
        match self {
            RecommendationCategory::ModelSelection => 0.30,
            RecommendationCategory::CachingImprovement => 0.40,
            RecommendationCategory::RequestBatching => 0.10,
            RecommendationCategory::AnalysisDepthTuning => 0.25,
            RecommendationCategory::UsagePatternOptimization => 0.05,
            RecommendationCategory::FallbackStrategy => 0.15,
        }
    }

    pub fn effort(&self) -> ImplementationEffort {
        match self {
            RecommendationCategory::CachingImprovement
            | RecommendationCategory::AnalysisDepthTuning => ImplementationEffort::Low,
            RecommendationCategory::ModelSelection
            | RecommendationCategory::FallbackStrategy
            | RecommendationCategory::UsagePatternOptimization => ImplementationEffort::Medium,
            RecommendationCategory::RequestBatching => ImplementationEffort::High,
        }
    }
}

impl fmt::Display for RecommendationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImplementationEffort {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPriority {
    Low,
    Medium,
    High,
}

impl RecommendationPriority {
    pub fn from_savings(daily_savings: f64) -> Self {
        if daily_savings >= HIGH_PRIORITY_SAVINGS {
            RecommendationPriority::High
        } else if daily_savings >= MEDIUM_PRIORITY_SAVINGS {
            RecommendationPriority::Medium
        } else {
            RecommendationPriority::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub id: Uuid,
    pub category: RecommendationCategory,
    pub priority: RecommendationPriority,
    /// One agent for agent-level advice, every busy agent for system-wide advice.
    pub affected_agents: Vec<AgentType>,
    pub title: String,
    pub description: String,
    pub action_items: Vec<String>,
    pub risks: Vec<String>,
    pub current_daily_cost: f64,
    pub estimated_daily_savings: f64,
    pub projected_daily_cost: f64,
    pub effort: ImplementationEffort,
    pub created_at: DateTime<Utc>,
    pub implemented: bool,
    pub implemented_at: Option<DateTime<Utc>>,
    pub actual_daily_savings: Option<f64>,
}

impl Recommendation {
    fn new(
        category: RecommendationCategory,
        affected_agents: Vec<AgentType>,
        title: String,
        description: String,
        action_items: Vec<String>,
        risks: Vec<String>,
        current_daily_cost: f64,
    ) -> Self {
        let estimated_daily_savings = current_daily_cost * category.savings_multiplier();
        Self {
            id: Uuid::new_v4(),
            category,
            priority: RecommendationPriority::from_savings(estimated_daily_savings),
            affected_agents,
            title,
            description,
            action_items,
            risks,
            current_daily_cost,
            estimated_daily_savings,
            projected_daily_cost: current_daily_cost - estimated_daily_savings,
            effort: category.effort(),
            created_at: Utc::now(),
            implemented: false,
            implemented_at: None,
            actual_daily_savings: None,
        }
    }

    pub fn is_system_wide(&self) -> bool {
        self.affected_agents.len() > 1
    }
}

/// Turns cost analyses into ranked savings recommendations and tracks what
/// was done with them.
#[derive(Debug)]
pub struct OptimizationRecommender {
    analyzer: Arc<CostAnalyzer>,
    tracked: RwLock<HashMap<Uuid, Recommendation>>,
}

impl OptimizationRecommender {
    pub fn new(analyzer: Arc<CostAnalyzer>) -> Self {
        Self {
            analyzer,
            tracked: RwLock::new(HashMap::new()),
        }
    }

    pub async fn generate_recommendations(&self, window_hours: i64) -> Result<Vec<Recommendation>> {
        let analyses = self.analyzer.analyze_costs(window_hours).await?;
        let recommendations = build_recommendations(&analyses, self.analyzer.catalog());

        // Earlier generations are superseded; implemented ones stay for savings tracking
        let mut tracked = self.tracked.write().await;
        tracked.retain(|_, r| r.implemented);
        for recommendation in &recommendations {
            tracked.insert(recommendation.id, recommendation.clone());
        }

        info!(
            "Generated {} recommendations from {} cost analyses",
            recommendations.len(),
            analyses.len()
        );
        Ok(recommendations)
    }

    /// The latest generation plus anything marked implemented, highest savings first.
    pub async fn list_recommendations(&self) -> Vec<Recommendation> {
        let mut all: Vec<Recommendation> = self.tracked.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.estimated_daily_savings.total_cmp(&a.estimated_daily_savings));
        all
    }

    pub async fn mark_implemented(&self, id: Uuid) -> Result<Recommendation> {
        let mut tracked = self.tracked.write().await;
        let recommendation = tracked
            .get_mut(&id)
            .ok_or_else(|| MonitoringError::RecommendationNotFound { id: id.to_string() })?;

        if !recommendation.implemented {
            recommendation.implemented = true;
            recommendation.implemented_at = Some(Utc::now());
            info!("Recommendation {} marked implemented", id);
        }
        Ok(recommendation.clone())
    }

    pub async fn record_actual_savings(&self, id: Uuid, daily_savings: f64) -> Result<Recommendation> {
        if !daily_savings.is_finite() || daily_savings < 0.0 {
            return Err(MonitoringError::Validation(format!(
                "savings must be a non-negative amount, got {daily_savings}"
            )));
        }

        let mut tracked = self.tracked.write().await;
        let recommendation = tracked
            .get_mut(&id)
            .ok_or_else(|| MonitoringError::RecommendationNotFound { id: id.to_string() })?;

        recommendation.actual_daily_savings = Some(daily_savings);
        debug!(
            "Recommendation {} saved ${:.2}/day against ${:.2} estimated",
            id, daily_savings, recommendation.estimated_daily_savings
        );
        Ok(recommendation.clone())
    }
}

/// Map analyses to recommendations, best savings first, at most ten.
pub fn build_recommendations(
    analyses: &[CostAnalysis],
    catalog: &ModelCatalog,
) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = analyses
        .iter()
        .filter(|a| a.daily_cost > 0.0)
        .flat_map(|a| agent_recommendations(a, catalog))
        .collect();

    let busy: Vec<&CostAnalysis> = analyses
        .iter()
        .filter(|a| a.total_requests > BUSY_AGENT_REQUESTS)
        .collect();
    if busy.len() >= MIN_BUSY_AGENTS {
        recommendations.extend(system_recommendations(&busy));
    }

    recommendations.sort_by(|a, b| b.estimated_daily_savings.total_cmp(&a.estimated_daily_savings));
    recommendations.truncate(MAX_RECOMMENDATIONS);
    recommendations
}

fn agent_recommendations(analysis: &CostAnalysis, catalog: &ModelCatalog) -> Vec<Recommendation> {
    let agent = analysis.agent_type;
    let daily = analysis.daily_cost;
    let has_driver = |prefix: &str| analysis.cost_drivers.iter().any(|d| d.starts_with(prefix));
    let mut out = Vec::new();

    if has_driver("high_cost_model_") {
        let current = analysis.primary_model.as_deref().unwrap_or("current model");
        let action = match catalog.cheaper_alternative(current) {
            Some(alternative) => format!(
                "Route {} requests to {} ({:.0}% of the performance score)",
                agent,
                alternative.name,
                alternative.performance_score * 100.0
            ),
            None => format!("Evaluate cheaper models for routine {agent} requests"),
        };
        out.push(Recommendation::new(
            RecommendationCategory::ModelSelection,
            vec![agent],
            format!("Use a cheaper model for {agent}"),
            format!("{current} dominates {agent} spend at ${daily:.2}/day"),
            vec![
                action,
                "Keep the premium model for deep analysis only".to_string(),
            ],
            vec!["Lower output quality on nuanced content".to_string()],
            daily,
        ));
    }

    if has_driver("poor_cache_performance") {
        out.push(Recommendation::new(
            RecommendationCategory::CachingImprovement,
            vec![agent],
            format!("Improve cache hit rate for {agent}"),
            format!(
                "Only {:.0}% of {} requests are served from cache",
                analysis.cache_hit_rate * 100.0,
                agent
            ),
            vec![
                "Normalize request parameters before building cache keys".to_string(),
                "Extend TTLs for analyses of unchanged content".to_string(),
            ],
            vec!["Stale results served after content changes".to_string()],
            daily,
        ));
    }

    if has_driver("excessive_deep_analysis") || has_driver("overuse_of_deep_analysis") {
        out.push(Recommendation::new(
            RecommendationCategory::AnalysisDepthTuning,
            vec![agent],
            format!("Reduce deep analysis for {agent}"),
            format!(
                "{:.0}% of {} requests use deep analysis",
                analysis.deep_request_share * 100.0,
                agent
            ),
            vec![
                "Default to standard depth and offer deep analysis on request".to_string(),
            ],
            vec!["Missed insights that only deep analysis surfaces".to_string()],
            daily,
        ));
    }

    if analysis.fallback_rate > FALLBACK_RATE_THRESHOLD {
        out.push(Recommendation::new(
            RecommendationCategory::FallbackStrategy,
            vec![agent],
            format!("Review fallback strategy for {agent}"),
            format!(
                "{:.0}% of {} requests fell back to another model",
                analysis.fallback_rate * 100.0,
                agent
            ),
            vec![
                "Investigate primary model failures".to_string(),
                "Fall back to a cheaper model first".to_string(),
            ],
            vec!["Reduced quality when the cheaper fallback answers".to_string()],
            daily,
        ));
    }

    out
}

fn system_recommendations(busy: &[&CostAnalysis]) -> Vec<Recommendation> {
    let combined_daily: f64 = busy.iter().map(|a| a.daily_cost).sum();
    let affected: Vec<AgentType> = busy.iter().map(|a| a.agent_type).collect();
    let agents = affected
        .iter()
        .map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    vec![
        Recommendation::new(
            RecommendationCategory::RequestBatching,
            affected.clone(),
            "Batch requests across busy agents".to_string(),
            format!("{} agents exceed {} requests: {}", busy.len(), BUSY_AGENT_REQUESTS, agents),
            vec!["Group related analyses into a single model call".to_string()],
            vec![
                "Higher latency for batched requests".to_string(),
                "One failed call affects the whole batch".to_string(),
            ],
            combined_daily,
        ),
        Recommendation::new(
            RecommendationCategory::UsagePatternOptimization,
            affected,
            "Smooth peak usage".to_string(),
            format!("Sustained load on {agents}"),
            vec!["Schedule non-urgent analyses for off-peak hours".to_string()],
            vec!["Delayed results for deferred analyses".to_string()],
            combined_daily,
        ),
    ]
}

use super::error::{MonitoringError, Result};
use super::{AgentType, AnalysisDepth, CostGroupRow, MetricStore};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Slope (USD per hour bucket) beyond which a trend counts as moving.
pub const TREND_SLOPE_THRESHOLD: f64 = 0.01;
pub const MIN_TREND_BUCKETS: usize = 3;
pub const MAX_COST_DRIVERS: usize = 5;
pub const MAX_OPTIMIZATION_POTENTIAL: f64 = 0.8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CostTrend {
    Increasing,
    Decreasing,
    Stable,
    InsufficientData,
    /// The hourly series could not be read.
    Unknown,
}

impl CostTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostTrend::Increasing => "increasing",
            CostTrend::Decreasing => "decreasing",
            CostTrend::Stable => "stable",
            CostTrend::InsufficientData => "insufficient_data",
            CostTrend::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CostTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pricing and relative quality of a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelProfile {
    pub name: String,
    pub provider: String,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
    pub performance_score: f64,
}

impl ModelProfile {
    fn new(name: &str, provider: &str, input: f64, output: f64, performance: f64) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            input_cost_per_1k: input,
            output_cost_per_1k: output,
            performance_score: performance,
        }
    }

    pub fn estimate_cost(&self, input_tokens: i64, output_tokens: i64) -> f64 {
        input_tokens as f64 / 1000.0 * self.input_cost_per_1k
            + output_tokens as f64 / 1000.0 * self.output_cost_per_1k
    }

    fn blended_cost_per_1k(&self) -> f64 {
        self.input_cost_per_1k + self.output_cost_per_1k
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCatalog {
    models: Vec<ModelProfile>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            models: vec![
                ModelProfile::new("gpt-4o", "openai", 0.005, 0.015, 0.95),
                ModelProfile::new("gpt-4o-mini", "openai", 0.00015, 0.0006, 0.88),
                ModelProfile::new("claude-3-5-sonnet", "anthropic", 0.003, 0.015, 0.96),
                ModelProfile::new("claude-3-haiku", "anthropic", 0.00025, 0.00125, 0.85),
                ModelProfile::new("gemini-1.5-pro", "google", 0.00125, 0.005, 0.92),
                ModelProfile::new("gemini-1.5-flash", "google", 0.000075, 0.0003, 0.87),
            ],
        }
    }
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelProfile>) -> Self {
        Self { models }
    }

    pub fn models(&self) -> &[ModelProfile] {
        &self.models
    }

    pub fn get(&self, name: &str) -> Option<&ModelProfile> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Cheapest same-provider model that keeps at least 90% of the
    /// performance score of `name`.
    pub fn cheaper_alternative(&self, name: &str) -> Option<&ModelProfile> {
        let current = self.get(name)?;
        self.models
            .iter()
            .filter(|m| m.name != current.name && m.provider == current.provider)
            .filter(|m| m.blended_cost_per_1k() < current.blended_cost_per_1k())
            .filter(|m| m.performance_score >= current.performance_score * 0.9)
            .min_by(|a, b| a.blended_cost_per_1k().total_cmp(&b.blended_cost_per_1k()))
    }
}

/// Cost profile of one agent over a trailing window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostAnalysis {
    pub agent_type: AgentType,
    pub window_hours: i64,
    pub analyzed_at: DateTime<Utc>,
    pub total_requests: i64,
    pub total_cost: f64,
    pub avg_cost_per_request: f64,
    /// Window cost scaled to 24 hours.
    pub daily_cost: f64,
    pub cost_trend: CostTrend,
    pub trend_slope: Option<f64>,
    pub cache_hit_rate: f64,
    pub fallback_rate: f64,
    pub deep_request_share: f64,
    pub primary_model: Option<String>,
    pub cost_drivers: Vec<String>,
    pub optimization_potential: f64,
    pub model_breakdown: Vec<CostGroupRow>,
}

#[derive(Debug, Clone)]
pub struct CostAnalyzer {
    store: Arc<dyn MetricStore>,
    catalog: ModelCatalog,
}

impl CostAnalyzer {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self {
            store,
            catalog: ModelCatalog::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// One analysis per agent with activity in the window. Store failures
    /// degrade to an empty or partial result.
    pub async fn analyze_costs(&self, window_hours: i64) -> Result<Vec<CostAnalysis>> {
        match self.try_analyze_costs(window_hours).await {
            Ok(analyses) => Ok(analyses),
            Err(e) if e.is_client_error() => Err(e),
            Err(e) => {
                error!("Cost analysis failed, returning no results: {}", e);
                Ok(Vec::new())
            }
        }
    }

    pub async fn try_analyze_costs(&self, window_hours: i64) -> Result<Vec<CostAnalysis>> {
        if window_hours <= 0 {
            return Err(MonitoringError::Validation(format!(
                "window_hours must be positive, got {window_hours}"
            )));
        }

        let since = Utc::now() - Duration::hours(window_hours);
        let agents = self.store.active_agent_types(since).await?;

        let mut analyses = Vec::with_capacity(agents.len());
        for agent in agents {
            match self.analyze_agent(agent, since, window_hours).await {
                Ok(Some(analysis)) => analyses.push(analysis),
                Ok(None) => {}
                Err(e) => warn!(agent_type = %agent, "Cost analysis failed: {}", e),
            }
        }

        debug!("Analyzed costs for {} agents", analyses.len());
        Ok(analyses)
    }

    pub async fn analyze_agent(
        &self,
        agent_type: AgentType,
        since: DateTime<Utc>,
        window_hours: i64,
    ) -> Result<Option<CostAnalysis>> {
        let stats = self.store.query_aggregate(Some(agent_type), since).await?;
        if stats.total_requests == 0 {
            return Ok(None);
        }

        let rows = self.store.query_grouped_cost(agent_type, since).await?;

        let (cost_trend, trend_slope) =
            match self.store.query_hourly_cost_buckets(agent_type, since).await {
                Ok(buckets) => {
                    let hourly: Vec<f64> = buckets.iter().map(|b| b.cost).collect();
                    classify_trend(&hourly)
                }
                Err(e) => {
                    warn!(agent_type = %agent_type, "Cost trend unavailable: {}", e);
                    (CostTrend::Unknown, None)
                }
            };

        Ok(Some(CostAnalysis {
            agent_type,
            window_hours,
            analyzed_at: Utc::now(),
            total_requests: stats.total_requests,
            total_cost: stats.total_cost,
            avg_cost_per_request: stats.avg_cost_per_request(),
            daily_cost: stats.total_cost * 24.0 / window_hours as f64,
            cost_trend,
            trend_slope,
            cache_hit_rate: stats.cache_hit_rate(),
            fallback_rate: stats.fallback_rate(),
            deep_request_share: deep_request_share(&rows),
            primary_model: primary_model(&rows),
            cost_drivers: identify_cost_drivers(&rows),
            optimization_potential: optimization_potential(&rows, &self.catalog),
            model_breakdown: rows,
        }))
    }
}

/// Ordinary least squares slope of `ys` against x = 0..n-1.
pub fn ols_slope(ys: &[f64]) -> f64 {
    let n = ys.len() as f64;
    if ys.len() < 2 {
        return 0.0;
    }

    let mean_x = (n - 1.0) / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n;

    let (numerator, denominator) = ys.iter().enumerate().fold((0.0, 0.0), |(num, den), (i, y)| {
        let dx = i as f64 - mean_x;
        (num + dx * (y - mean_y), den + dx * dx)
    });

    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

pub fn classify_trend(hourly_costs: &[f64]) -> (CostTrend, Option<f64>) {
    if hourly_costs.len() < MIN_TREND_BUCKETS {
        return (CostTrend::InsufficientData, None);
    }

    let slope = ols_slope(hourly_costs);
    let trend = if slope > TREND_SLOPE_THRESHOLD {
        CostTrend::Increasing
    } else if slope < -TREND_SLOPE_THRESHOLD {
        CostTrend::Decreasing
    } else {
        CostTrend::Stable
    };
    (trend, Some(slope))
}

fn total_requests(rows: &[CostGroupRow]) -> i64 {
    rows.iter().map(|r| r.request_count).sum()
}

fn deep_request_share(rows: &[CostGroupRow]) -> f64 {
    let total = total_requests(rows);
    if total == 0 {
        return 0.0;
    }
    let deep: i64 = rows
        .iter()
        .filter(|r| r.analysis_depth == AnalysisDepth::Deep)
        .map(|r| r.request_count)
        .sum();
    deep as f64 / total as f64
}

/// Model with the highest total cost in the window.
fn primary_model(rows: &[CostGroupRow]) -> Option<String> {
    per_model(rows)
        .into_iter()
        .max_by(|a, b| a.1 .1.total_cmp(&b.1 .1))
        .map(|(name, _)| name.to_string())
}

/// Request count and cost summed per model name.
fn per_model(rows: &[CostGroupRow]) -> BTreeMap<&str, (i64, f64)> {
    let mut models: BTreeMap<&str, (i64, f64)> = BTreeMap::new();
    for row in rows.iter().filter(|r| !r.model_name.is_empty()) {
        let entry = models.entry(row.model_name.as_str()).or_insert((0, 0.0));
        entry.0 += row.request_count;
        entry.1 += row.total_cost;
    }
    models
}

/// Tags for the patterns driving an agent's spend, most significant first.
pub fn identify_cost_drivers(rows: &[CostGroupRow]) -> Vec<String> {
    if rows.is_empty() {
        return vec!["insufficient_data".to_string()];
    }

    let mut drivers: Vec<String> = Vec::new();
    let mut push = |driver: String| {
        if !drivers.contains(&driver) {
            drivers.push(driver);
        }
    };

    let total_cost: f64 = rows.iter().map(|r| r.total_cost).sum();
    if total_cost > 0.0 {
        for row in rows {
            let share = row.total_cost / total_cost;
            if share > 0.2 && row.avg_cost_per_request() > 0.05 {
                push(format!("high_cost_model_{}", row.model_name));
            }
            if row.analysis_depth == AnalysisDepth::Deep && share > 0.3 {
                push("excessive_deep_analysis".to_string());
            }
        }
    }

    let requests = total_requests(rows);
    if requests > 0 {
        let n = requests as f64;
        let cache_hits: i64 = rows.iter().map(|r| r.cache_hits).sum();
        if 1.0 - cache_hits as f64 / n > 0.7 {
            push("poor_cache_performance".to_string());
        }

        let input_tokens: i64 = rows.iter().map(|r| r.total_input_tokens).sum();
        let output_tokens: i64 = rows.iter().map(|r| r.total_output_tokens).sum();
        if input_tokens as f64 / n > 5000.0 {
            push("large_input_tokens".to_string());
        }
        if output_tokens as f64 / n > 2000.0 {
            push("large_output_tokens".to_string());
        }
    }

    if deep_request_share(rows) > 0.5 {
        push("overuse_of_deep_analysis".to_string());
    }

    if drivers.is_empty() {
        return vec!["standard_usage".to_string()];
    }
    drivers.truncate(MAX_COST_DRIVERS);
    drivers
}

/// Estimated fraction of spend that could be saved, in [0, 0.8].
pub fn optimization_potential(rows: &[CostGroupRow], catalog: &ModelCatalog) -> f64 {
    let requests = total_requests(rows);
    if requests == 0 {
        return 0.0;
    }
    let n = requests as f64;
    let mut potential = 0.0;

    let cache_hits: i64 = rows.iter().map(|r| r.cache_hits).sum();
    let cache_hit_rate = cache_hits as f64 / n;
    if cache_hit_rate < 0.5 {
        potential += ((0.5 - cache_hit_rate) * 0.6).min(0.3);
    }

    let models = per_model(rows);
    if models.len() >= 2 {
        let avg_costs: Vec<f64> = models
            .values()
            .filter(|(count, _)| *count > 0)
            .map(|(count, cost)| cost / *count as f64)
            .collect();
        potential += (coefficient_of_variation(&avg_costs) * 0.3).min(0.3);
    } else if let Some(name) = models.keys().next() {
        if catalog.cheaper_alternative(name).is_some() {
            potential += 0.25;
        }
    }

    if requests > 100 {
        potential += 0.15;
    }
    if deep_request_share(rows) > 0.5 {
        potential += 0.20;
    }

    if potential.is_nan() {
        return 0.0;
    }
    potential.clamp(0.0, MAX_OPTIMIZATION_POTENTIAL)
}

fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() / mean
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn row(model: &str, depth: AnalysisDepth, requests: i64, cost: f64, hits: i64) -> CostGroupRow {
        CostGroupRow {
            model_name: model.to_string(),
            model_provider: "openai".to_string(),
            analysis_depth: depth,
            request_count: requests,
            total_cost: cost,
            total_input_tokens: requests * 1000,
            total_output_tokens: requests * 500,
            cache_hits: hits,
        }
    }

    #[test]
    fn test_trend_classification() {
        assert_eq!(classify_trend(&[1.0, 1.2, 1.5]).0, CostTrend::Increasing);
        assert_eq!(classify_trend(&[1.0, 1.0, 1.0]).0, CostTrend::Stable);
        assert_eq!(classify_trend(&[1.5, 1.2, 1.0]).0, CostTrend::Decreasing);
        assert_eq!(classify_trend(&[1.0, 2.0]), (CostTrend::InsufficientData, None));
        assert_eq!(classify_trend(&[]).0, CostTrend::InsufficientData);
    }

    #[test]
    fn test_ols_slope() {
        assert_relative_eq!(ols_slope(&[1.0, 1.2, 1.5]), 0.25, epsilon = 1e-12);
        assert_relative_eq!(ols_slope(&[2.0, 4.0, 6.0, 8.0]), 2.0, epsilon = 1e-12);
        // Small drift stays inside the stable band
        assert_eq!(classify_trend(&[1.0, 1.005, 1.01]).0, CostTrend::Stable);
    }

    #[test]
    fn test_cost_drivers() {
        let rows = vec![
            row("gpt-4o", AnalysisDepth::Deep, 40, 8.0, 2),
            row("gpt-4o-mini", AnalysisDepth::Quick, 20, 0.2, 2),
        ];
        let drivers = identify_cost_drivers(&rows);

        assert_eq!(drivers[0], "high_cost_model_gpt-4o");
        assert!(drivers.contains(&"excessive_deep_analysis".to_string()));
        assert!(drivers.contains(&"poor_cache_performance".to_string()));
        assert!(drivers.contains(&"overuse_of_deep_analysis".to_string()));
        assert!(drivers.len() <= MAX_COST_DRIVERS);
    }

    #[test]
    fn test_cost_driver_fallbacks() {
        assert_eq!(identify_cost_drivers(&[]), vec!["insufficient_data"]);

        let cheap = vec![row("gpt-4o-mini", AnalysisDepth::Standard, 10, 0.01, 8)];
        assert_eq!(identify_cost_drivers(&cheap), vec!["standard_usage"]);
    }

    #[test]
    fn test_optimization_potential_components() {
        let catalog = ModelCatalog::default();

        // Cache component only: (0.5 - 0.2) * 0.6 = 0.18
        let rows = vec![row("unlisted-model", AnalysisDepth::Standard, 10, 1.0, 2)];
        assert_relative_eq!(optimization_potential(&rows, &catalog), 0.18, epsilon = 1e-12);

        // Single catalog model with a cheaper sibling: flat 0.25
        let rows = vec![row("gpt-4o", AnalysisDepth::Standard, 10, 1.0, 5)];
        assert_relative_eq!(optimization_potential(&rows, &catalog), 0.25, epsilon = 1e-12);

        // Everything at once is capped
        let rows = vec![
            row("gpt-4o", AnalysisDepth::Deep, 150, 30.0, 0),
            row("gpt-4o-mini", AnalysisDepth::Quick, 10, 0.01, 0),
        ];
        assert_relative_eq!(optimization_potential(&rows, &catalog), 0.8);

        assert_eq!(optimization_potential(&[], &catalog), 0.0);
    }

    #[test]
    fn test_catalog_alternatives() {
        let catalog = ModelCatalog::default();
        assert_eq!(
            catalog.cheaper_alternative("gpt-4o").map(|m| m.name.as_str()),
            Some("gpt-4o-mini")
        );
        // Haiku keeps less than 90% of Sonnet's score
        assert!(catalog.cheaper_alternative("claude-3-5-sonnet").is_none());
        assert!(catalog.cheaper_alternative("gpt-4o-mini").is_none());
        assert!(catalog.cheaper_alternative("unknown").is_none());

        let cost = catalog.get("gpt-4o").unwrap().estimate_cost(2000, 1000);
        assert_relative_eq!(cost, 0.025, epsilon = 1e-12);
    }
}

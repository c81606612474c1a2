use super::error::{MonitoringError, Result};
use super::{AgentType, HealthSnapshot, MetricStore, SystemSnapshot};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

pub const DEFAULT_UNHEALTHY_SCORE: f64 = 60.0;

/// Converts windows of raw request metrics into per-agent health snapshots.
#[derive(Debug, Clone)]
pub struct HealthScoringEngine {
    store: Arc<dyn MetricStore>,
    unhealthy_threshold: f64,
}

impl HealthScoringEngine {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self {
            store,
            unhealthy_threshold: DEFAULT_UNHEALTHY_SCORE,
        }
    }

    pub fn with_unhealthy_threshold(mut self, threshold: f64) -> Self {
        self.unhealthy_threshold = threshold;
        self
    }

    pub fn unhealthy_threshold(&self) -> f64 {
        self.unhealthy_threshold
    }

    /// Caller-facing health query.
    ///
    /// Only an invalid window is reported as an error; store failures degrade
    /// to an empty result.
    pub async fn compute_health(
        &self,
        agent_type: Option<AgentType>,
        window_minutes: i64,
    ) -> Result<Vec<HealthSnapshot>> {
        match self.try_compute_health(agent_type, window_minutes).await {
            Ok(snapshots) => Ok(snapshots),
            Err(e) if e.is_client_error() => Err(e),
            Err(e) => {
                error!("Health computation failed, returning no snapshots: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// Like [`compute_health`](Self::compute_health) but surfaces failures to
    /// list active agents. A failure for a single agent still only omits that
    /// agent.
    pub async fn try_compute_health(
        &self,
        agent_type: Option<AgentType>,
        window_minutes: i64,
    ) -> Result<Vec<HealthSnapshot>> {
        if window_minutes <= 0 {
            return Err(MonitoringError::Validation(format!(
                "window_minutes must be positive, got {window_minutes}"
            )));
        }

        let started = Instant::now();
        let window_end = Utc::now();
        let window_start = window_end - Duration::minutes(window_minutes);

        let agents = match agent_type {
            Some(agent) => vec![agent],
            None => self.store.active_agent_types(window_start).await?,
        };

        let mut snapshots = Vec::with_capacity(agents.len());
        for agent in agents {
            match self
                .compute_agent_health(agent, window_start, window_end, window_minutes)
                .await
            {
                Ok(Some(snapshot)) => snapshots.push(snapshot),
                Ok(None) => debug!(agent_type = %agent, "No metrics in window"),
                Err(e) => warn!(agent_type = %agent, "Health computation failed: {}", e),
            }
        }

        debug!(
            "Computed {} health snapshots in {}ms",
            snapshots.len(),
            started.elapsed().as_millis()
        );
        Ok(snapshots)
    }

    /// Snapshot for one agent, or None when it had no requests in the window.
    pub async fn compute_agent_health(
        &self,
        agent_type: AgentType,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        window_minutes: i64,
    ) -> Result<Option<HealthSnapshot>> {
        let stats = self
            .store
            .query_aggregate(Some(agent_type), window_start)
            .await?;
        if stats.total_requests == 0 {
            return Ok(None);
        }

        let latencies = self
            .store
            .query_raw_latencies(agent_type, window_start)
            .await?;

        let error_rate = stats.error_rate();
        let cache_hit_rate = stats.cache_hit_rate();

        Ok(Some(HealthSnapshot {
            agent_type,
            window_start,
            window_end,
            window_minutes,
            total_requests: stats.total_requests,
            successful_requests: stats.successful_requests(),
            failed_requests: stats.failed_requests(),
            cache_hits: stats.cache_hit_count,
            avg_latency_ms: stats.avg_latency_ms,
            p95_latency_ms: approximate_percentile(&latencies, 0.95),
            p99_latency_ms: approximate_percentile(&latencies, 0.99),
            max_latency_ms: stats.max_latency_ms,
            total_tokens: stats.total_tokens(),
            total_cost: stats.total_cost,
            error_rate,
            timeout_rate: stats.timeout_rate(),
            rate_limit_rate: stats.rate_limit_rate(),
            cache_hit_rate,
            health_score: calculate_health_score(error_rate, stats.avg_latency_ms, cache_hit_rate),
        }))
    }

    /// Derive system-wide aggregates from a set of agent snapshots.
    pub fn system_snapshot(
        &self,
        snapshots: &[HealthSnapshot],
        window_minutes: i64,
    ) -> SystemSnapshot {
        let avg_health_score = if snapshots.is_empty() {
            100.0
        } else {
            snapshots.iter().map(|s| s.health_score).sum::<f64>() / snapshots.len() as f64
        };

        SystemSnapshot {
            timestamp: Utc::now(),
            window_minutes,
            active_agents: snapshots.len() as i64,
            total_requests: snapshots.iter().map(|s| s.total_requests).sum(),
            total_cost: snapshots.iter().map(|s| s.total_cost).sum(),
            avg_health_score,
            unhealthy_agents: snapshots
                .iter()
                .filter(|s| s.health_score < self.unhealthy_threshold)
                .count() as i64,
        }
    }
}

/// Health score in [0, 100].
///
/// Starts at 100, loses `error_rate * 50`, loses up to 30 points for average
/// latency above one second (one point per 100ms), and gains up to 10 points
/// for a cache hit rate above 50%.
pub fn calculate_health_score(error_rate: f64, avg_latency_ms: f64, cache_hit_rate: f64) -> f64 {
    let mut score = 100.0;

    score -= error_rate * 50.0;

    if avg_latency_ms > 1000.0 {
        score -= ((avg_latency_ms - 1000.0) / 100.0).min(30.0);
    }

    if cache_hit_rate > 0.5 {
        score += (cache_hit_rate - 0.5) * 20.0;
    }

    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 100.0)
}

/// Nearest-rank style percentile over an ascending slice: the value at index
/// `floor(q * n)`, without interpolation.
pub fn approximate_percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((q * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[index]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::{AnalysisDepth, InMemoryMetricStore, Metric, RequestStatus};
    use approx::assert_relative_eq;

    #[test]
    fn test_error_penalty() {
        assert_relative_eq!(calculate_health_score(0.2, 500.0, 0.0), 90.0);
    }

    #[test]
    fn test_latency_penalty() {
        assert_relative_eq!(calculate_health_score(0.0, 2000.0, 0.0), 90.0);
        // Penalty caps at 30 points
        assert_relative_eq!(calculate_health_score(0.0, 60_000.0, 0.0), 70.0);
        // Exactly one second is not penalised
        assert_relative_eq!(calculate_health_score(0.0, 1000.0, 0.0), 100.0);
    }

    #[test]
    fn test_cache_bonus_is_clamped() {
        assert_relative_eq!(calculate_health_score(0.0, 100.0, 0.9), 100.0);
        assert_relative_eq!(calculate_health_score(0.5, 100.0, 0.9), 83.0);
    }

    #[test]
    fn test_score_never_negative() {
        assert_relative_eq!(calculate_health_score(1.0, 100_000.0, 0.0), 20.0);
        assert_relative_eq!(calculate_health_score(3.0, 100_000.0, 0.0), 0.0);
    }

    #[test]
    fn test_percentile_indexing() {
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        // floor(0.95 * 100) = 95 -> 96th value
        assert_relative_eq!(approximate_percentile(&values, 0.95), 96.0);
        assert_relative_eq!(approximate_percentile(&values, 0.99), 100.0);

        let small = vec![10.0, 20.0, 30.0];
        assert_relative_eq!(approximate_percentile(&small, 0.95), 30.0);
        assert_relative_eq!(approximate_percentile(&[], 0.95), 0.0);
    }

    fn metric(agent: AgentType, latency: f64, status: RequestStatus) -> Metric {
        let mut m = Metric::new(agent, "user", "analyze", AnalysisDepth::Standard);
        m.total_latency_ms = latency;
        m.status = status;
        m.cache_hit = status == RequestStatus::CacheHit;
        m
    }

    #[tokio::test]
    async fn test_compute_health_per_agent() {
        let store = Arc::new(InMemoryMetricStore::new());
        let mut batch = Vec::new();
        for _ in 0..8 {
            batch.push(metric(AgentType::ContentAnalysis, 500.0, RequestStatus::Success));
        }
        for _ in 0..2 {
            batch.push(metric(AgentType::ContentAnalysis, 500.0, RequestStatus::Error));
        }
        batch.push(metric(AgentType::AudienceInsights, 3000.0, RequestStatus::Success));
        store.insert_metrics(&batch).await.unwrap();

        let engine = HealthScoringEngine::new(store);
        let snapshots = engine.compute_health(None, 5).await.unwrap();
        assert_eq!(snapshots.len(), 2);

        let content = snapshots
            .iter()
            .find(|s| s.agent_type == AgentType::ContentAnalysis)
            .unwrap();
        assert_eq!(content.total_requests, 10);
        assert_eq!(content.failed_requests, 2);
        assert_relative_eq!(content.error_rate, 0.2);
        assert_relative_eq!(content.health_score, 90.0);

        let audience = snapshots
            .iter()
            .find(|s| s.agent_type == AgentType::AudienceInsights)
            .unwrap();
        assert_relative_eq!(audience.health_score, 80.0);
        assert_relative_eq!(audience.p95_latency_ms, 3000.0);
    }

    #[tokio::test]
    async fn test_agent_without_metrics_is_omitted() {
        let store = Arc::new(InMemoryMetricStore::new());
        let engine = HealthScoringEngine::new(store);

        let snapshots = engine
            .compute_health(Some(AgentType::BossAgent), 5)
            .await
            .unwrap();
        assert!(snapshots.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_window_is_rejected() {
        let engine = HealthScoringEngine::new(Arc::new(InMemoryMetricStore::new()));
        assert!(engine.compute_health(None, 0).await.is_err());
    }

    #[test]
    fn test_system_snapshot_counts_unhealthy_agents() {
        let engine = HealthScoringEngine::new(Arc::new(InMemoryMetricStore::new()));
        let now = Utc::now();
        let snapshot = |agent, score: f64, requests: i64, cost: f64| HealthSnapshot {
            agent_type: agent,
            window_start: now,
            window_end: now,
            window_minutes: 5,
            total_requests: requests,
            successful_requests: requests,
            failed_requests: 0,
            cache_hits: 0,
            avg_latency_ms: 0.0,
            p95_latency_ms: 0.0,
            p99_latency_ms: 0.0,
            max_latency_ms: 0.0,
            total_tokens: 0,
            total_cost: cost,
            error_rate: 0.0,
            timeout_rate: 0.0,
            rate_limit_rate: 0.0,
            cache_hit_rate: 0.0,
            health_score: score,
        };

        let system = engine.system_snapshot(
            &[
                snapshot(AgentType::ContentAnalysis, 95.0, 10, 1.0),
                snapshot(AgentType::SeoDiscoverability, 40.0, 5, 0.5),
            ],
            5,
        );

        assert_eq!(system.active_agents, 2);
        assert_eq!(system.total_requests, 15);
        assert_relative_eq!(system.total_cost, 1.5);
        assert_relative_eq!(system.avg_health_score, 67.5);
        assert_eq!(system.unhealthy_agents, 1);

        let idle = engine.system_snapshot(&[], 5);
        assert_relative_eq!(idle.avg_health_score, 100.0);
    }
}

use super::error::{MonitoringError, Result};
use super::{
    AgentType, AggregateStats, Alert, AlertFilter, AnalysisDepth, CostGroupRow, HealthSnapshot,
    HourlyCost, Metric, RequestStatus, SystemSnapshot,
};
use async_trait::async_trait;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Durable append/query backend for request metrics, snapshots and alerts.
#[async_trait]
pub trait MetricStore: Send + Sync + std::fmt::Debug {
    async fn health_check(&self) -> Result<()>;

    /// Insert a batch of completed metrics. Returns the number of rows written.
    async fn insert_metrics(&self, batch: &[Metric]) -> Result<usize>;
    async fn insert_alert(&self, alert: &Alert) -> Result<()>;
    async fn insert_health_snapshot(&self, snapshot: &HealthSnapshot) -> Result<()>;
    async fn insert_system_snapshot(&self, snapshot: &SystemSnapshot) -> Result<()>;

    /// Agent types with at least one metric since `since`, in stable order.
    async fn active_agent_types(&self, since: DateTime<Utc>) -> Result<Vec<AgentType>>;
    async fn query_aggregate(
        &self,
        agent_type: Option<AgentType>,
        since: DateTime<Utc>,
    ) -> Result<AggregateStats>;
    /// All total latencies in the window, sorted ascending.
    async fn query_raw_latencies(
        &self,
        agent_type: AgentType,
        since: DateTime<Utc>,
    ) -> Result<Vec<f64>>;
    /// Cost summed per hour, oldest bucket first.
    async fn query_hourly_cost_buckets(
        &self,
        agent_type: AgentType,
        since: DateTime<Utc>,
    ) -> Result<Vec<HourlyCost>>;
    /// Cost grouped by (model, provider, analysis depth), most expensive first.
    async fn query_grouped_cost(
        &self,
        agent_type: AgentType,
        since: DateTime<Utc>,
    ) -> Result<Vec<CostGroupRow>>;

    /// Alerts matching `filter`, newest first.
    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>>;
    async fn acknowledge_alert(
        &self,
        id: Uuid,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>>;
    async fn resolve_alert(&self, id: Uuid, actor: &str, at: DateTime<Utc>)
        -> Result<Option<Alert>>;
}

const METRIC_COLUMNS: &str = "request_id, agent_type, user_id, request_type, timestamp, \
    request_size_bytes, response_size_bytes, total_latency_ms, agent_processing_time_ms, \
    model_latency_ms, cache_lookup_time_ms, model_name, model_provider, input_tokens, \
    output_tokens, cost_estimate, fallback_used, fallback_model, status, error_type, \
    error_message, cache_hit, cache_key, cache_ttl_remaining_seconds, analysis_depth, \
    confidence_score";

const ALERT_COLUMNS: &str = "id, created_at, severity, alert_type, rule_id, agent_type, \
    metric_name, current_value, threshold_value, description, recommendation, window_minutes, \
    acknowledged, acknowledged_by, acknowledged_at, resolved, resolved_by, resolved_at";

// 26 binds per row keeps each statement well under the 65535 parameter limit.
const INSERT_CHUNK_SIZE: usize = 1000;

/// PostgreSQL implementation of the metric store
#[derive(Debug)]
pub struct PostgresMetricStore {
    db_pool: Arc<PgPool>,
}

impl PostgresMetricStore {
    pub fn new(db_pool: Arc<PgPool>) -> Self {
        Self { db_pool }
    }

    fn alert_from_row(row: &PgRow) -> Result<Alert> {
        let severity: String = row.try_get("severity")?;
        let agent_type: Option<String> = row.try_get("agent_type")?;

        Ok(Alert {
            id: row.try_get("id")?,
            created_at: row.try_get("created_at")?,
            severity: severity.parse()?,
            alert_type: row.try_get("alert_type")?,
            rule_id: row.try_get("rule_id")?,
            agent_type: agent_type.map(|a| a.parse()).transpose()?,
            metric_name: row.try_get("metric_name")?,
            current_value: row.try_get("current_value")?,
            threshold_value: row.try_get("threshold_value")?,
            description: row.try_get("description")?,
            recommendation: row.try_get("recommendation")?,
            window_minutes: row.try_get("window_minutes")?,
            acknowledged: row.try_get("acknowledged")?,
            acknowledged_by: row.try_get("acknowledged_by")?,
            acknowledged_at: row.try_get("acknowledged_at")?,
            resolved: row.try_get("resolved")?,
            resolved_by: row.try_get("resolved_by")?,
            resolved_at: row.try_get("resolved_at")?,
        })
    }
}

#[async_trait]
impl MetricStore for PostgresMetricStore {
    async fn health_check(&self) -> Result<()> {
        debug!("Performing metric store health check");

        sqlx::query("SELECT 1 as health_check")
            .fetch_one(self.db_pool.as_ref())
            .await?;

        sqlx::query("SELECT COUNT(*) FROM agent_metrics")
            .fetch_one(self.db_pool.as_ref())
            .await?;

        Ok(())
    }

    async fn insert_metrics(&self, batch: &[Metric]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut written = 0u64;
        let mut tx = self.db_pool.begin().await?;
        for chunk in batch.chunks(INSERT_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO agent_metrics ({METRIC_COLUMNS}) "));
            builder.push_values(chunk, |mut row, m| {
                row.push_bind(m.request_id)
                    .push_bind(m.agent_type.as_str())
                    .push_bind(&m.user_id)
                    .push_bind(&m.request_type)
                    .push_bind(m.timestamp)
                    .push_bind(m.request_size_bytes)
                    .push_bind(m.response_size_bytes)
                    .push_bind(m.total_latency_ms)
                    .push_bind(m.agent_processing_time_ms)
                    .push_bind(m.model_latency_ms)
                    .push_bind(m.cache_lookup_time_ms)
                    .push_bind(&m.model_name)
                    .push_bind(&m.model_provider)
                    .push_bind(m.input_tokens)
                    .push_bind(m.output_tokens)
                    .push_bind(m.cost_estimate)
                    .push_bind(m.fallback_used)
                    .push_bind(&m.fallback_model)
                    .push_bind(m.status.as_str())
                    .push_bind(&m.error_type)
                    .push_bind(&m.error_message)
                    .push_bind(m.cache_hit)
                    .push_bind(&m.cache_key)
                    .push_bind(m.cache_ttl_remaining_seconds)
                    .push_bind(m.analysis_depth.as_str())
                    .push_bind(m.confidence_score);
            });
            // Duplicates are skipped and not counted
            builder.push(" ON CONFLICT (request_id) DO NOTHING");
            written += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        debug!(batch_size = batch.len(), written, "Inserted metric batch");
        Ok(written as usize)
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO agent_alerts ({ALERT_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"
        ))
        .bind(alert.id)
        .bind(alert.created_at)
        .bind(alert.severity.as_str())
        .bind(&alert.alert_type)
        .bind(&alert.rule_id)
        .bind(alert.agent_type.map(|a| a.as_str()))
        .bind(&alert.metric_name)
        .bind(alert.current_value)
        .bind(alert.threshold_value)
        .bind(&alert.description)
        .bind(&alert.recommendation)
        .bind(alert.window_minutes)
        .bind(alert.acknowledged)
        .bind(&alert.acknowledged_by)
        .bind(alert.acknowledged_at)
        .bind(alert.resolved)
        .bind(&alert.resolved_by)
        .bind(alert.resolved_at)
        .execute(self.db_pool.as_ref())
        .await?;

        Ok(())
    }

    async fn insert_health_snapshot(&self, snapshot: &HealthSnapshot) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_health_snapshots (id, agent_type, window_start, window_end, \
             total_requests, successful_requests, failed_requests, cache_hits, avg_latency_ms, \
             p95_latency_ms, p99_latency_ms, max_latency_ms, total_tokens, total_cost, \
             error_rate, timeout_rate, rate_limit_rate, cache_hit_rate, health_score) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
        )
        .bind(Uuid::new_v4())
        .bind(snapshot.agent_type.as_str())
        .bind(snapshot.window_start)
        .bind(snapshot.window_end)
        .bind(snapshot.total_requests)
        .bind(snapshot.successful_requests)
        .bind(snapshot.failed_requests)
        .bind(snapshot.cache_hits)
        .bind(snapshot.avg_latency_ms)
        .bind(snapshot.p95_latency_ms)
        .bind(snapshot.p99_latency_ms)
        .bind(snapshot.max_latency_ms)
        .bind(snapshot.total_tokens)
        .bind(snapshot.total_cost)
        .bind(snapshot.error_rate)
        .bind(snapshot.timeout_rate)
        .bind(snapshot.rate_limit_rate)
        .bind(snapshot.cache_hit_rate)
        .bind(snapshot.health_score)
        .execute(self.db_pool.as_ref())
        .await?;

        Ok(())
    }

    async fn insert_system_snapshot(&self, snapshot: &SystemSnapshot) -> Result<()> {
        sqlx::query(
            "INSERT INTO system_health_snapshots (id, timestamp, window_minutes, active_agents, \
             total_requests, total_cost, avg_health_score, unhealthy_agents) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(Uuid::new_v4())
        .bind(snapshot.timestamp)
        .bind(snapshot.window_minutes)
        .bind(snapshot.active_agents)
        .bind(snapshot.total_requests)
        .bind(snapshot.total_cost)
        .bind(snapshot.avg_health_score)
        .bind(snapshot.unhealthy_agents)
        .execute(self.db_pool.as_ref())
        .await?;

        Ok(())
    }

    async fn active_agent_types(&self, since: DateTime<Utc>) -> Result<Vec<AgentType>> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT agent_type FROM agent_metrics WHERE timestamp >= $1 ORDER BY agent_type",
        )
        .bind(since)
        .fetch_all(self.db_pool.as_ref())
        .await?;

        rows.iter().map(|a| a.parse()).collect()
    }

    async fn query_aggregate(
        &self,
        agent_type: Option<AgentType>,
        since: DateTime<Utc>,
    ) -> Result<AggregateStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*)::BIGINT AS total_requests,
                COUNT(*) FILTER (WHERE status = 'success')::BIGINT AS success_count,
                COUNT(*) FILTER (WHERE status = 'error')::BIGINT AS error_count,
                COUNT(*) FILTER (WHERE status = 'timeout')::BIGINT AS timeout_count,
                COUNT(*) FILTER (WHERE status = 'rate_limited')::BIGINT AS rate_limited_count,
                COUNT(*) FILTER (WHERE status = 'cache_hit')::BIGINT AS cache_hit_count,
                COUNT(*) FILTER (WHERE fallback_used)::BIGINT AS fallback_count,
                COALESCE(AVG(total_latency_ms), 0)::DOUBLE PRECISION AS avg_latency_ms,
                COALESCE(MAX(total_latency_ms), 0)::DOUBLE PRECISION AS max_latency_ms,
                COALESCE(SUM(input_tokens), 0)::BIGINT AS total_input_tokens,
                COALESCE(SUM(output_tokens), 0)::BIGINT AS total_output_tokens,
                COALESCE(SUM(cost_estimate), 0)::DOUBLE PRECISION AS total_cost,
                AVG(confidence_score)::DOUBLE PRECISION AS avg_confidence
            FROM agent_metrics
            WHERE timestamp >= $1 AND ($2::TEXT IS NULL OR agent_type = $2)
            "#,
        )
        .bind(since)
        .bind(agent_type.map(|a| a.as_str()))
        .fetch_one(self.db_pool.as_ref())
        .await?;

        Ok(AggregateStats {
            total_requests: row.try_get("total_requests")?,
            success_count: row.try_get("success_count")?,
            error_count: row.try_get("error_count")?,
            timeout_count: row.try_get("timeout_count")?,
            rate_limited_count: row.try_get("rate_limited_count")?,
            cache_hit_count: row.try_get("cache_hit_count")?,
            fallback_count: row.try_get("fallback_count")?,
            avg_latency_ms: row.try_get("avg_latency_ms")?,
            max_latency_ms: row.try_get("max_latency_ms")?,
            total_input_tokens: row.try_get("total_input_tokens")?,
            total_output_tokens: row.try_get("total_output_tokens")?,
            total_cost: row.try_get("total_cost")?,
            avg_confidence: row.try_get("avg_confidence")?,
        })
    }

    async fn query_raw_latencies(
        &self,
        agent_type: AgentType,
        since: DateTime<Utc>,
    ) -> Result<Vec<f64>> {
        let latencies = sqlx::query_scalar::<_, f64>(
            "SELECT total_latency_ms FROM agent_metrics \
             WHERE agent_type = $1 AND timestamp >= $2 ORDER BY total_latency_ms ASC",
        )
        .bind(agent_type.as_str())
        .bind(since)
        .fetch_all(self.db_pool.as_ref())
        .await?;

        Ok(latencies)
    }

    async fn query_hourly_cost_buckets(
        &self,
        agent_type: AgentType,
        since: DateTime<Utc>,
    ) -> Result<Vec<HourlyCost>> {
        let rows = sqlx::query_as::<_, (DateTime<Utc>, f64)>(
            "SELECT date_trunc('hour', timestamp) AS hour, \
                    COALESCE(SUM(cost_estimate), 0)::DOUBLE PRECISION AS cost \
             FROM agent_metrics WHERE agent_type = $1 AND timestamp >= $2 \
             GROUP BY 1 ORDER BY 1 ASC",
        )
        .bind(agent_type.as_str())
        .bind(since)
        .fetch_all(self.db_pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(hour, cost)| HourlyCost { hour, cost })
            .collect())
    }

    async fn query_grouped_cost(
        &self,
        agent_type: AgentType,
        since: DateTime<Utc>,
    ) -> Result<Vec<CostGroupRow>> {
        let rows = sqlx::query(
            r#"
            SELECT
                model_name,
                model_provider,
                analysis_depth,
                COUNT(*)::BIGINT AS request_count,
                COALESCE(SUM(cost_estimate), 0)::DOUBLE PRECISION AS total_cost,
                COALESCE(SUM(input_tokens), 0)::BIGINT AS total_input_tokens,
                COALESCE(SUM(output_tokens), 0)::BIGINT AS total_output_tokens,
                COUNT(*) FILTER (WHERE cache_hit)::BIGINT AS cache_hits
            FROM agent_metrics
            WHERE agent_type = $1 AND timestamp >= $2
            GROUP BY model_name, model_provider, analysis_depth
            ORDER BY total_cost DESC
            "#,
        )
        .bind(agent_type.as_str())
        .bind(since)
        .fetch_all(self.db_pool.as_ref())
        .await?;

        rows.iter()
            .map(|row| {
                let depth: String = row.try_get("analysis_depth")?;
                Ok(CostGroupRow {
                    model_name: row.try_get("model_name")?,
                    model_provider: row.try_get("model_provider")?,
                    analysis_depth: depth.parse()?,
                    request_count: row.try_get("request_count")?,
                    total_cost: row.try_get("total_cost")?,
                    total_input_tokens: row.try_get("total_input_tokens")?,
                    total_output_tokens: row.try_get("total_output_tokens")?,
                    cache_hits: row.try_get("cache_hits")?,
                })
            })
            .collect()
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {ALERT_COLUMNS} FROM agent_alerts WHERE TRUE"
        ));

        if let Some(severity) = filter.severity {
            builder.push(" AND severity = ").push_bind(severity.as_str());
        }
        if let Some(agent_type) = filter.agent_type {
            builder.push(" AND agent_type = ").push_bind(agent_type.as_str());
        }
        if let Some(acknowledged) = filter.acknowledged {
            builder.push(" AND acknowledged = ").push_bind(acknowledged);
        }
        if let Some(resolved) = filter.resolved {
            builder.push(" AND resolved = ").push_bind(resolved);
        }
        if let Some(since) = filter.since {
            builder.push(" AND created_at >= ").push_bind(since);
        }
        builder.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = builder.build().fetch_all(self.db_pool.as_ref()).await?;
        rows.iter().map(Self::alert_from_row).collect()
    }

    async fn acknowledge_alert(
        &self,
        id: Uuid,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        let row = sqlx::query(&format!(
            "UPDATE agent_alerts SET acknowledged = TRUE, acknowledged_by = $2, acknowledged_at = $3 \
             WHERE id = $1 RETURNING {ALERT_COLUMNS}"
        ))
        .bind(id)
        .bind(actor)
        .bind(at)
        .fetch_optional(self.db_pool.as_ref())
        .await?;

        row.as_ref().map(Self::alert_from_row).transpose()
    }

    async fn resolve_alert(
        &self,
        id: Uuid,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        let row = sqlx::query(&format!(
            "UPDATE agent_alerts SET resolved = TRUE, resolved_by = $2, resolved_at = $3 \
             WHERE id = $1 RETURNING {ALERT_COLUMNS}"
        ))
        .bind(id)
        .bind(actor)
        .bind(at)
        .fetch_optional(self.db_pool.as_ref())
        .await?;

        row.as_ref().map(Self::alert_from_row).transpose()
    }
}

/// Process-local store, used by the `memory` backend and in tests.
#[derive(Debug, Default)]
pub struct InMemoryMetricStore {
    metrics: RwLock<Vec<Metric>>,
    alerts: RwLock<Vec<Alert>>,
    health_snapshots: RwLock<Vec<HealthSnapshot>>,
    system_snapshots: RwLock<Vec<SystemSnapshot>>,
}

impl InMemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn metric_count(&self) -> usize {
        self.metrics.read().await.len()
    }

    pub async fn metrics(&self) -> Vec<Metric> {
        self.metrics.read().await.clone()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }

    pub async fn health_snapshots(&self) -> Vec<HealthSnapshot> {
        self.health_snapshots.read().await.clone()
    }

    pub async fn system_snapshots(&self) -> Vec<SystemSnapshot> {
        self.system_snapshots.read().await.clone()
    }

    async fn window(&self, agent_type: Option<AgentType>, since: DateTime<Utc>) -> Vec<Metric> {
        self.metrics
            .read()
            .await
            .iter()
            .filter(|m| m.timestamp >= since)
            .filter(|m| agent_type.map_or(true, |a| m.agent_type == a))
            .cloned()
            .collect()
    }

    async fn update_alert<F>(&self, id: Uuid, update: F) -> Option<Alert>
    where
        F: FnOnce(&mut Alert),
    {
        let mut alerts = self.alerts.write().await;
        let alert = alerts.iter_mut().find(|a| a.id == id)?;
        update(alert);
        Some(alert.clone())
    }
}

/// Fold a window of metrics into the same shape the SQL aggregate returns.
pub fn aggregate_metrics<'a>(metrics: impl IntoIterator<Item = &'a Metric>) -> AggregateStats {
    let mut stats = AggregateStats::default();
    let mut latency_sum = 0.0;
    let mut confidence_sum = 0.0;
    let mut confidence_count = 0usize;

    for m in metrics {
        stats.total_requests += 1;
        match m.status {
            RequestStatus::Success => stats.success_count += 1,
            RequestStatus::Error => stats.error_count += 1,
            RequestStatus::Timeout => stats.timeout_count += 1,
            RequestStatus::RateLimited => stats.rate_limited_count += 1,
            RequestStatus::CacheHit => stats.cache_hit_count += 1,
        }
        if m.fallback_used {
            stats.fallback_count += 1;
        }
        latency_sum += m.total_latency_ms;
        stats.max_latency_ms = stats.max_latency_ms.max(m.total_latency_ms);
        stats.total_input_tokens += m.input_tokens;
        stats.total_output_tokens += m.output_tokens;
        stats.total_cost += m.cost_estimate;
        if let Some(confidence) = m.confidence_score {
            confidence_sum += confidence;
            confidence_count += 1;
        }
    }

    if stats.total_requests > 0 {
        stats.avg_latency_ms = latency_sum / stats.total_requests as f64;
    }
    if confidence_count > 0 {
        stats.avg_confidence = Some(confidence_sum / confidence_count as f64);
    }
    stats
}

#[async_trait]
impl MetricStore for InMemoryMetricStore {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_metrics(&self, batch: &[Metric]) -> Result<usize> {
        let mut metrics = self.metrics.write().await;
        let existing: BTreeSet<Uuid> = metrics.iter().map(|m| m.request_id).collect();
        let fresh: Vec<Metric> = batch
            .iter()
            .filter(|m| !existing.contains(&m.request_id))
            .cloned()
            .collect();
        let written = fresh.len();
        metrics.extend(fresh);
        Ok(written)
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        self.alerts.write().await.push(alert.clone());
        Ok(())
    }

    async fn insert_health_snapshot(&self, snapshot: &HealthSnapshot) -> Result<()> {
        self.health_snapshots.write().await.push(snapshot.clone());
        Ok(())
    }

    async fn insert_system_snapshot(&self, snapshot: &SystemSnapshot) -> Result<()> {
        self.system_snapshots.write().await.push(snapshot.clone());
        Ok(())
    }

    async fn active_agent_types(&self, since: DateTime<Utc>) -> Result<Vec<AgentType>> {
        let agents: BTreeSet<AgentType> = self
            .metrics
            .read()
            .await
            .iter()
            .filter(|m| m.timestamp >= since)
            .map(|m| m.agent_type)
            .collect();
        Ok(agents.into_iter().collect())
    }

    async fn query_aggregate(
        &self,
        agent_type: Option<AgentType>,
        since: DateTime<Utc>,
    ) -> Result<AggregateStats> {
        let window = self.window(agent_type, since).await;
        Ok(aggregate_metrics(&window))
    }

    async fn query_raw_latencies(
        &self,
        agent_type: AgentType,
        since: DateTime<Utc>,
    ) -> Result<Vec<f64>> {
        let mut latencies: Vec<f64> = self
            .window(Some(agent_type), since)
            .await
            .iter()
            .map(|m| m.total_latency_ms)
            .collect();
        latencies.sort_by(f64::total_cmp);
        Ok(latencies)
    }

    async fn query_hourly_cost_buckets(
        &self,
        agent_type: AgentType,
        since: DateTime<Utc>,
    ) -> Result<Vec<HourlyCost>> {
        let mut buckets: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
        for m in self.window(Some(agent_type), since).await {
            let hour = m
                .timestamp
                .duration_trunc(TimeDelta::hours(1))
                .map_err(|e| MonitoringError::store(format!("hour truncation failed: {e}")))?;
            *buckets.entry(hour).or_insert(0.0) += m.cost_estimate;
        }

        Ok(buckets
            .into_iter()
            .map(|(hour, cost)| HourlyCost { hour, cost })
            .collect())
    }

    async fn query_grouped_cost(
        &self,
        agent_type: AgentType,
        since: DateTime<Utc>,
    ) -> Result<Vec<CostGroupRow>> {
        let mut groups: HashMap<(String, String, AnalysisDepth), CostGroupRow> = HashMap::new();
        for m in self.window(Some(agent_type), since).await {
            let key = (
                m.model_name.clone(),
                m.model_provider.clone(),
                m.analysis_depth,
            );
            let row = groups.entry(key).or_insert_with(|| CostGroupRow {
                model_name: m.model_name.clone(),
                model_provider: m.model_provider.clone(),
                analysis_depth: m.analysis_depth,
                request_count: 0,
                total_cost: 0.0,
                total_input_tokens: 0,
                total_output_tokens: 0,
                cache_hits: 0,
            });
            row.request_count += 1;
            row.total_cost += m.cost_estimate;
            row.total_input_tokens += m.input_tokens;
            row.total_output_tokens += m.output_tokens;
            if m.cache_hit {
                row.cache_hits += 1;
            }
        }

        let mut rows: Vec<CostGroupRow> = groups.into_values().collect();
        rows.sort_by(|a, b| b.total_cost.total_cmp(&a.total_cost));
        Ok(rows)
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .read()
            .await
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            alerts.truncate(limit);
        }
        Ok(alerts)
    }

    async fn acknowledge_alert(
        &self,
        id: Uuid,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        Ok(self
            .update_alert(id, |alert| {
                alert.acknowledged = true;
                alert.acknowledged_by = Some(actor.to_string());
                alert.acknowledged_at = Some(at);
            })
            .await)
    }

    async fn resolve_alert(
        &self,
        id: Uuid,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        Ok(self
            .update_alert(id, |alert| {
                alert.resolved = true;
                alert.resolved_by = Some(actor.to_string());
                alert.resolved_at = Some(at);
            })
            .await)
    }
}

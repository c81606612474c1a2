//! Shared fixtures for integration tests: metric builders, a store that can
//! be told to fail, and notification channels that record deliveries.

#![allow(dead_code)]

use agent_monitor::config::StoreBackend;
use agent_monitor::monitoring::{
    AgentType, AggregateStats, Alert, AlertFilter, AlertRule, AnalysisDepth, ChannelType,
    CostGroupRow, HealthSnapshot, HourlyCost, InMemoryMetricStore, Metric, MetricStore,
    MonitoringError, RequestStatus, Result, SystemSnapshot,
};
use agent_monitor::{Config, DependencyContainer};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub fn metric(agent: AgentType, latency_ms: f64, cost: f64, status: RequestStatus) -> Metric {
    let mut metric = Metric::new(agent, "user-1", "analyze", AnalysisDepth::Standard);
    metric.total_latency_ms = latency_ms;
    metric.model_latency_ms = latency_ms * 0.8;
    metric.agent_processing_time_ms = latency_ms * 0.2;
    metric.model_name = "gpt-4o".to_string();
    metric.model_provider = "openai".to_string();
    metric.input_tokens = 1000;
    metric.output_tokens = 400;
    metric.cost_estimate = cost;
    metric.status = status;
    metric.cache_hit = status == RequestStatus::CacheHit;
    metric
}

pub fn memory_config() -> Config {
    let mut config = Config::default();
    config.storage.backend = StoreBackend::Memory;
    config
}

pub struct TestEnvironment {
    pub store: Arc<InMemoryMetricStore>,
    pub container: Arc<DependencyContainer>,
}

impl TestEnvironment {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_config(memory_config())
    }

    pub fn with_config(config: Config) -> anyhow::Result<Self> {
        let store = Arc::new(InMemoryMetricStore::new());
        let container = Arc::new(DependencyContainer::with_store(config, store.clone())?);
        Ok(Self { store, container })
    }

    pub async fn seed(&self, metrics: &[Metric]) -> Result<usize> {
        self.store.insert_metrics(metrics).await
    }
}

/// Delegates to an in-memory store until switched into failure mode.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryMetricStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_buckets: AtomicBool,
    fail_agent: Mutex<Option<AgentType>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryMetricStore {
        &self.inner
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail only the hourly cost bucket query.
    pub fn set_fail_buckets(&self, fail: bool) {
        self.fail_buckets.store(fail, Ordering::SeqCst);
    }

    /// Fail every per-agent read for one agent type.
    pub fn set_fail_agent(&self, agent: Option<AgentType>) {
        *self.fail_agent.lock().unwrap() = agent;
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(MonitoringError::store("read unavailable"));
        }
        Ok(())
    }

    fn check_agent_read(&self, agent_type: Option<AgentType>) -> Result<()> {
        self.check_read()?;
        let failing = *self.fail_agent.lock().unwrap();
        if agent_type.is_some() && agent_type == failing {
            return Err(MonitoringError::store("agent partition unavailable"));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MonitoringError::store("write unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricStore for FlakyStore {
    async fn health_check(&self) -> Result<()> {
        self.check_read()
    }

    async fn insert_metrics(&self, batch: &[Metric]) -> Result<usize> {
        self.check_write()?;
        self.inner.insert_metrics(batch).await
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        self.check_write()?;
        self.inner.insert_alert(alert).await
    }

    async fn insert_health_snapshot(&self, snapshot: &HealthSnapshot) -> Result<()> {
        self.check_write()?;
        self.inner.insert_health_snapshot(snapshot).await
    }

    async fn insert_system_snapshot(&self, snapshot: &SystemSnapshot) -> Result<()> {
        self.check_write()?;
        self.inner.insert_system_snapshot(snapshot).await
    }

    async fn active_agent_types(&self, since: DateTime<Utc>) -> Result<Vec<AgentType>> {
        self.check_read()?;
        self.inner.active_agent_types(since).await
    }

    async fn query_aggregate(
        &self,
        agent_type: Option<AgentType>,
        since: DateTime<Utc>,
    ) -> Result<AggregateStats> {
        self.check_agent_read(agent_type)?;
        self.inner.query_aggregate(agent_type, since).await
    }

    async fn query_raw_latencies(
        &self,
        agent_type: AgentType,
        since: DateTime<Utc>,
    ) -> Result<Vec<f64>> {
        self.check_agent_read(Some(agent_type))?;
        self.inner.query_raw_latencies(agent_type, since).await
    }

    async fn query_hourly_cost_buckets(
        &self,
        agent_type: AgentType,
        since: DateTime<Utc>,
    ) -> Result<Vec<HourlyCost>> {
        self.check_agent_read(Some(agent_type))?;
        if self.fail_buckets.load(Ordering::SeqCst) {
            return Err(MonitoringError::store("bucket query timed out"));
        }
        self.inner.query_hourly_cost_buckets(agent_type, since).await
    }

    async fn query_grouped_cost(
        &self,
        agent_type: AgentType,
        since: DateTime<Utc>,
    ) -> Result<Vec<CostGroupRow>> {
        self.check_agent_read(Some(agent_type))?;
        self.inner.query_grouped_cost(agent_type, since).await
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        self.check_read()?;
        self.inner.list_alerts(filter).await
    }

    async fn acknowledge_alert(
        &self,
        id: Uuid,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        self.check_write()?;
        self.inner.acknowledge_alert(id, actor, at).await
    }

    async fn resolve_alert(
        &self,
        id: Uuid,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        self.check_write()?;
        self.inner.resolve_alert(id, actor, at).await
    }
}

/// Records every alert it is asked to deliver, optionally failing afterwards.
#[derive(Debug)]
pub struct RecordingChannel {
    channel_type: ChannelType,
    fail: bool,
    delivered: Mutex<Vec<(Alert, Option<String>)>>,
}

impl RecordingChannel {
    pub fn new(channel_type: ChannelType) -> Self {
        Self {
            channel_type,
            fail: false,
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(channel_type: ChannelType) -> Self {
        Self {
            fail: true,
            ..Self::new(channel_type)
        }
    }

    pub fn delivered(&self) -> Vec<(Alert, Option<String>)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl agent_monitor::monitoring::NotificationChannel for RecordingChannel {
    fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    async fn send(&self, alert: &Alert, rule: Option<&AlertRule>) -> Result<()> {
        self.delivered
            .lock()
            .unwrap()
            .push((alert.clone(), rule.map(|r| r.id.clone())));
        if self.fail {
            return Err(MonitoringError::channel(
                self.channel_type.as_str(),
                "delivery refused",
            ));
        }
        Ok(())
    }
}

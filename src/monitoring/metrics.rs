use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Prometheus counters describing the observability pipeline itself.
///
/// Each instance owns its registry so independent pipelines (and tests) never
/// collide on metric registration.
#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Arc<Registry>,

    // Ingestion
    pub metrics_ingested_total: IntCounter,
    pub metrics_dropped_total: IntCounter,
    pub buffer_size: IntGauge,
    pub flush_batches_total: IntCounter,
    pub flush_failures_total: IntCounter,

    // Alerting
    pub alerts_fired_total: IntCounterVec,
    pub alerts_suppressed_total: IntCounter,
    pub channel_failures_total: IntCounterVec,
    pub evaluation_cycles_total: IntCounter,
    pub evaluation_failures_total: IntCounter,
    pub evaluation_duration_seconds: Histogram,
}

impl std::fmt::Debug for PipelineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineMetrics")
            .field("metrics_ingested_total", &self.metrics_ingested_total.get())
            .field("flush_batches_total", &self.flush_batches_total.get())
            .finish_non_exhaustive()
    }
}

impl PipelineMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Arc::new(Registry::new());

        let metrics_ingested_total = IntCounter::with_opts(Opts::new(
            "agent_metrics_ingested_total",
            "Total number of completed request metrics handed to the buffer",
        ))?;
        registry.register(Box::new(metrics_ingested_total.clone()))?;

        let metrics_dropped_total = IntCounter::with_opts(Opts::new(
            "agent_metrics_dropped_total",
            "Metrics lost because a flush failed or the flush queue was full",
        ))?;
        registry.register(Box::new(metrics_dropped_total.clone()))?;

        let buffer_size = IntGauge::with_opts(Opts::new(
            "agent_metrics_buffer_size",
            "Metrics currently held in the in-memory buffer",
        ))?;
        registry.register(Box::new(buffer_size.clone()))?;

        let flush_batches_total = IntCounter::with_opts(Opts::new(
            "agent_metrics_flush_batches_total",
            "Total number of metric batches written to the store",
        ))?;
        registry.register(Box::new(flush_batches_total.clone()))?;

        let flush_failures_total = IntCounter::with_opts(Opts::new(
            "agent_metrics_flush_failures_total",
            "Total number of failed metric batch writes",
        ))?;
        registry.register(Box::new(flush_failures_total.clone()))?;

        let alerts_fired_total = IntCounterVec::new(
            Opts::new("agent_alerts_fired_total", "Alerts raised, by severity"),
            &["severity"],
        )?;
        registry.register(Box::new(alerts_fired_total.clone()))?;

        let alerts_suppressed_total = IntCounter::with_opts(Opts::new(
            "agent_alerts_suppressed_total",
            "Threshold breaches suppressed by an active cooldown",
        ))?;
        registry.register(Box::new(alerts_suppressed_total.clone()))?;

        let channel_failures_total = IntCounterVec::new(
            Opts::new(
                "agent_alert_channel_failures_total",
                "Notification dispatch failures, by channel",
            ),
            &["channel"],
        )?;
        registry.register(Box::new(channel_failures_total.clone()))?;

        let evaluation_cycles_total = IntCounter::with_opts(Opts::new(
            "agent_alert_evaluation_cycles_total",
            "Completed alert evaluation cycles",
        ))?;
        registry.register(Box::new(evaluation_cycles_total.clone()))?;

        let evaluation_failures_total = IntCounter::with_opts(Opts::new(
            "agent_alert_evaluation_failures_total",
            "Alert evaluation cycles that ended in an error",
        ))?;
        registry.register(Box::new(evaluation_failures_total.clone()))?;

        let evaluation_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "agent_alert_evaluation_duration_seconds",
                "Duration of alert evaluation cycles in seconds",
            )
            .buckets(exponential_buckets(0.001, 2.0, 15)?),
        )?;
        registry.register(Box::new(evaluation_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            metrics_ingested_total,
            metrics_dropped_total,
            buffer_size,
            flush_batches_total,
            flush_failures_total,
            alerts_fired_total,
            alerts_suppressed_total,
            channel_failures_total,
            evaluation_cycles_total,
            evaluation_failures_total,
            evaluation_duration_seconds,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Render all pipeline metrics in the Prometheus text exposition format.
    pub fn gather_text(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

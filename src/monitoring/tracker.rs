use super::error::{MonitoringError, Result};
use super::{
    AgentType, AlertEngine, AnalysisDepth, Metric, MetricStore, PipelineMetrics, RequestStatus,
};
use crate::config::IngestionConfig;
use crate::security::{AuthenticatedRequest, RequestValidator};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How often the flush worker looks for a buffer that has gone stale.
const STALE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Why a request did not complete normally.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFailure {
    pub status: RequestStatus,
    pub error_type: String,
    pub message: String,
}

impl RequestFailure {
    pub fn error(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: RequestStatus::Error,
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status: RequestStatus::Timeout,
            error_type: "timeout".to_string(),
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            status: RequestStatus::RateLimited,
            error_type: "rate_limited".to_string(),
            message: message.into(),
        }
    }
}

/// In-flight request being measured. Created by
/// [`MetricsTracker::begin_request`] and consumed by
/// [`MetricsTracker::end_request`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    metric: Metric,
    started: Instant,
}

impl RequestContext {
    fn new(metric: Metric) -> Self {
        Self {
            metric,
            started: Instant::now(),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.metric.request_id
    }

    pub fn metric(&self) -> &Metric {
        &self.metric
    }

    pub fn record_model_usage(
        &mut self,
        model_name: impl Into<String>,
        model_provider: impl Into<String>,
        input_tokens: i64,
        output_tokens: i64,
        cost_estimate: f64,
        model_latency_ms: f64,
    ) {
        self.metric.model_name = model_name.into();
        self.metric.model_provider = model_provider.into();
        self.metric.input_tokens = input_tokens;
        self.metric.output_tokens = output_tokens;
        self.metric.cost_estimate = cost_estimate;
        self.metric.model_latency_ms = model_latency_ms;
    }

    pub fn record_cache_op(
        &mut self,
        cache_hit: bool,
        cache_key: Option<String>,
        lookup_time_ms: f64,
        ttl_remaining_seconds: Option<i64>,
    ) {
        self.metric.cache_hit = cache_hit;
        self.metric.cache_key = cache_key;
        self.metric.cache_lookup_time_ms = Some(lookup_time_ms);
        self.metric.cache_ttl_remaining_seconds = ttl_remaining_seconds;
    }

    pub fn record_fallback(&mut self, fallback_model: impl Into<String>) {
        self.metric.fallback_used = true;
        self.metric.fallback_model = Some(fallback_model.into());
    }

    pub fn record_sizes(&mut self, request_size_bytes: i64, response_size_bytes: i64) {
        self.metric.request_size_bytes = request_size_bytes;
        self.metric.response_size_bytes = response_size_bytes;
    }

    pub fn record_confidence(&mut self, confidence_score: f64) {
        self.metric.confidence_score = Some(confidence_score);
    }

    /// Complete the metric. A recorded cache hit wins over a supplied failure.
    pub fn finalize(self, failure: Option<RequestFailure>) -> Metric {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        self.finalize_with_latency(elapsed_ms, failure)
    }

    fn finalize_with_latency(mut self, total_latency_ms: f64, failure: Option<RequestFailure>) -> Metric {
        let metric = &mut self.metric;

        metric.total_latency_ms = total_latency_ms;
        metric.agent_processing_time_ms = total_latency_ms
            - metric.model_latency_ms
            - metric.cache_lookup_time_ms.unwrap_or(0.0);

        let failure_status = failure.as_ref().map(|f| f.status);
        if let Some(failure) = failure {
            metric.error_type = Some(failure.error_type);
            metric.error_message = Some(failure.message);
        }

        metric.status = if metric.cache_hit {
            RequestStatus::CacheHit
        } else {
            failure_status.unwrap_or(RequestStatus::Success)
        };

        self.metric
    }
}

/// Append-only metric buffer with size and age flush triggers.
#[derive(Debug)]
pub struct MetricBuffer {
    metrics: Vec<Metric>,
    last_flush: Instant,
    batch_size: usize,
    flush_interval: Duration,
}

impl MetricBuffer {
    pub fn new(batch_size: usize, flush_interval: Duration, now: Instant) -> Self {
        Self {
            metrics: Vec::with_capacity(batch_size),
            last_flush: now,
            batch_size,
            flush_interval,
        }
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        !self.metrics.is_empty()
            && (self.metrics.len() >= self.batch_size
                || now.saturating_duration_since(self.last_flush) >= self.flush_interval)
    }

    /// Append a metric and return the whole buffer if a flush is now due.
    pub fn push(&mut self, metric: Metric, now: Instant) -> Option<Vec<Metric>> {
        self.metrics.push(metric);
        self.take_if_due(now)
    }

    pub fn take_if_due(&mut self, now: Instant) -> Option<Vec<Metric>> {
        if self.is_due(now) {
            Some(self.take(now))
        } else {
            None
        }
    }

    /// Swap the buffer contents out and reset the flush clock.
    pub fn take(&mut self, now: Instant) -> Vec<Metric> {
        self.last_flush = now;
        std::mem::replace(&mut self.metrics, Vec::with_capacity(self.batch_size))
    }
}

struct FlushWorker {
    shutdown_tx: watch::Sender<bool>,
    /// Resolves to the metrics written while draining the queue on shutdown.
    handle: JoinHandle<usize>,
}

/// Collects request metrics and hands full or stale batches to a flush worker.
///
/// The request path never waits on the store: batches go onto a bounded
/// queue and a background worker writes them. When the queue is full the
/// batch is dropped and counted. A failed write is not retried.
pub struct MetricsTracker {
    store: Arc<dyn MetricStore>,
    config: IngestionConfig,
    metrics: PipelineMetrics,
    alerts: Option<Arc<AlertEngine>>,
    validator: RequestValidator,
    buffer: Mutex<MetricBuffer>,
    batch_tx: mpsc::Sender<Vec<Metric>>,
    batch_rx: Mutex<Option<mpsc::Receiver<Vec<Metric>>>>,
    worker: AsyncMutex<Option<FlushWorker>>,
}

impl std::fmt::Debug for MetricsTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsTracker")
            .field("config", &self.config)
            .field("buffered", &self.buffered_count())
            .finish_non_exhaustive()
    }
}

impl MetricsTracker {
    pub fn new(
        store: Arc<dyn MetricStore>,
        config: IngestionConfig,
        metrics: PipelineMetrics,
    ) -> Self {
        let (batch_tx, batch_rx) = mpsc::channel(config.flush_queue_capacity.max(1));
        let buffer = MetricBuffer::new(
            config.flush_batch_size,
            Duration::from_secs(config.flush_interval_seconds),
            Instant::now(),
        );

        Self {
            store,
            config,
            metrics,
            alerts: None,
            validator: RequestValidator::default(),
            buffer: Mutex::new(buffer),
            batch_tx,
            batch_rx: Mutex::new(Some(batch_rx)),
            worker: AsyncMutex::new(None),
        }
    }

    /// Route completed metrics through the engine's immediate checks.
    pub fn with_alert_engine(mut self, engine: Arc<AlertEngine>) -> Self {
        self.alerts = Some(engine);
        self
    }

    pub fn with_validator(mut self, validator: RequestValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn begin_request(
        &self,
        agent_type: AgentType,
        user_id: impl Into<String>,
        request_type: impl Into<String>,
        analysis_depth: AnalysisDepth,
    ) -> RequestContext {
        let context = RequestContext::new(Metric::new(
            agent_type,
            user_id,
            request_type,
            analysis_depth,
        ));
        debug!(request_id = %context.request_id(), agent_type = %agent_type, "Request started");
        context
    }

    /// Validate the caller before starting to track the request.
    pub fn begin_authenticated_request<R: AuthenticatedRequest + ?Sized>(
        &self,
        request: &R,
        request_type: impl Into<String>,
        analysis_depth: AnalysisDepth,
    ) -> Result<RequestContext> {
        let validated = self.validator.validate(request)?;
        Ok(self.begin_request(
            validated.agent_type,
            validated.user_id,
            request_type,
            analysis_depth,
        ))
    }

    /// Finalize a request and buffer its metric. Never waits on the store.
    pub fn end_request(&self, context: RequestContext, failure: Option<RequestFailure>) -> Metric {
        let metric = context.finalize(failure);
        self.record(metric.clone());
        metric
    }

    /// Buffer an already finalized metric.
    pub fn record(&self, metric: Metric) {
        self.metrics.metrics_ingested_total.inc();
        self.dispatch_immediate_checks(&metric);

        let due = {
            let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            let due = buffer.push(metric, Instant::now());
            self.metrics.buffer_size.set(buffer.len() as i64);
            due
        };

        if let Some(batch) = due {
            self.enqueue(batch);
        }
    }

    pub fn buffered_count(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn dispatch_immediate_checks(&self, metric: &Metric) {
        let Some(engine) = &self.alerts else {
            return;
        };

        let pending = engine.check_metric(metric);
        if pending.is_empty() {
            return;
        }

        match Handle::try_current() {
            Ok(handle) => {
                let engine = Arc::clone(engine);
                handle.spawn(async move {
                    engine.raise_immediate(pending).await;
                });
            }
            Err(_) => warn!(
                request_id = %metric.request_id,
                "No async runtime available, dropping {} immediate alerts",
                pending.len()
            ),
        }
    }

    fn enqueue(&self, batch: Vec<Metric>) {
        let size = batch.len();
        match self.batch_tx.try_send(batch) {
            Ok(()) => debug!(batch_size = size, "Queued metric batch for flush"),
            Err(TrySendError::Full(_)) => {
                warn!(batch_size = size, "Flush queue full, dropping metric batch");
                self.metrics.metrics_dropped_total.inc_by(size as u64);
            }
            Err(TrySendError::Closed(_)) => {
                error!(batch_size = size, "Flush queue closed, dropping metric batch");
                self.metrics.metrics_dropped_total.inc_by(size as u64);
            }
        }
    }

    fn take_due_batch(&self, now: Instant) -> Option<Vec<Metric>> {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let batch = buffer.take_if_due(now);
        if batch.is_some() {
            self.metrics.buffer_size.set(0);
        }
        batch
    }

    async fn write_batch(&self, batch: Vec<Metric>) -> usize {
        let size = batch.len();
        match self.store.insert_metrics(&batch).await {
            Ok(written) => {
                self.metrics.flush_batches_total.inc();
                debug!(batch_size = size, written, "Flushed metric batch");
                written
            }
            Err(e) => {
                self.metrics.flush_failures_total.inc();
                self.metrics.metrics_dropped_total.inc_by(size as u64);
                error!(batch_size = size, "Failed to flush metric batch: {}", e);
                0
            }
        }
    }

    /// Close the queue and write whatever is still waiting in it.
    async fn drain_queue(&self, receiver: &mut mpsc::Receiver<Vec<Metric>>) -> usize {
        receiver.close();
        let mut written = 0;
        while let Some(batch) = receiver.recv().await {
            written += self.write_batch(batch).await;
        }
        written
    }

    /// Write everything currently buffered, bypassing the queue.
    pub async fn flush_now(&self) -> Result<usize> {
        let batch = {
            let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            self.metrics.buffer_size.set(0);
            buffer.take(Instant::now())
        };

        if batch.is_empty() {
            return Ok(0);
        }

        let size = batch.len();
        match self.store.insert_metrics(&batch).await {
            Ok(written) => {
                self.metrics.flush_batches_total.inc();
                info!(batch_size = size, written, "Flushed buffered metrics");
                Ok(written)
            }
            Err(e) => {
                self.metrics.flush_failures_total.inc();
                self.metrics.metrics_dropped_total.inc_by(size as u64);
                Err(e)
            }
        }
    }

    /// Spawn the flush worker.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return Err(MonitoringError::Service(
                "Flush worker is already running".to_string(),
            ));
        }

        let receiver = self
            .batch_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| {
                MonitoringError::Service("Flush worker cannot be restarted".to_string())
            })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tracker = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tracker.flush_loop(receiver, shutdown_rx).await
        });

        *worker = Some(FlushWorker {
            shutdown_tx,
            handle,
        });
        info!(
            "Metric flush worker started (batch size {}, interval {}s)",
            self.config.flush_batch_size, self.config.flush_interval_seconds
        );
        Ok(())
    }

    /// Stop the worker, write queued batches, then flush the buffer.
    ///
    /// Returns the number of metrics written during shutdown. Without a
    /// running worker the queue is drained here instead.
    pub async fn stop(&self) -> Result<usize> {
        let worker = self.worker.lock().await.take();
        let drained = match worker {
            Some(worker) => {
                if worker.shutdown_tx.send(true).is_err() {
                    debug!("Flush worker already exited");
                }
                match worker.handle.await {
                    Ok(written) => written,
                    Err(e) => {
                        error!("Flush worker terminated abnormally: {}", e);
                        0
                    }
                }
            }
            None => {
                let receiver = self
                    .batch_rx
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                match receiver {
                    Some(mut receiver) => self.drain_queue(&mut receiver).await,
                    None => 0,
                }
            }
        };

        Ok(drained + self.flush_now().await?)
    }

    async fn flush_loop(
        &self,
        mut receiver: mpsc::Receiver<Vec<Metric>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> usize {
        let mut stale_check = tokio::time::interval(STALE_CHECK_INTERVAL);
        stale_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(batch) = receiver.recv() => {
                    self.write_batch(batch).await;
                }
                _ = stale_check.tick() => {
                    if let Some(batch) = self.take_due_batch(Instant::now()) {
                        self.write_batch(batch).await;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        let drained = self.drain_queue(&mut receiver).await;
        info!("Metric flush worker stopped");
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::InMemoryMetricStore;

    fn metric() -> Metric {
        Metric::new(
            AgentType::ContentAnalysis,
            "user",
            "analyze",
            AnalysisDepth::Standard,
        )
    }

    #[test]
    fn test_flush_at_batch_size() {
        let start = Instant::now();
        let mut buffer = MetricBuffer::new(50, Duration::from_secs(30), start);

        for _ in 0..49 {
            assert!(buffer.push(metric(), start).is_none());
        }
        let batch = buffer.push(metric(), start).unwrap();
        assert_eq!(batch.len(), 50);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_flush_after_interval() {
        let start = Instant::now();
        let mut buffer = MetricBuffer::new(50, Duration::from_secs(30), start);

        assert!(buffer.push(metric(), start).is_none());
        assert!(buffer
            .take_if_due(start + Duration::from_secs(29))
            .is_none());

        let batch = buffer
            .take_if_due(start + Duration::from_secs(30))
            .unwrap();
        assert_eq!(batch.len(), 1);

        // Clock resets on flush
        assert!(buffer
            .push(metric(), start + Duration::from_secs(45))
            .is_none());
    }

    #[test]
    fn test_empty_buffer_is_never_due() {
        let start = Instant::now();
        let buffer = MetricBuffer::new(50, Duration::from_secs(30), start);
        assert!(!buffer.is_due(start + Duration::from_secs(3600)));
    }

    #[test]
    fn test_finalize_derives_processing_time() {
        let mut ctx = RequestContext::new(metric());
        ctx.record_model_usage("gpt-4o", "openai", 1200, 300, 0.02, 800.0);
        ctx.record_cache_op(false, Some("k".to_string()), 20.0, None);

        let m = ctx.finalize_with_latency(1000.0, None);
        assert_eq!(m.total_latency_ms, 1000.0);
        assert_eq!(m.agent_processing_time_ms, 180.0);
        assert_eq!(m.status, RequestStatus::Success);
        assert_eq!(m.total_tokens(), 1500);
    }

    #[test]
    fn test_cache_hit_wins_over_error() {
        let mut ctx = RequestContext::new(metric());
        ctx.record_cache_op(true, None, 5.0, Some(600));

        let m = ctx.finalize_with_latency(
            10.0,
            Some(RequestFailure::error("upstream", "provider timeout")),
        );
        assert_eq!(m.status, RequestStatus::CacheHit);
        assert_eq!(m.error_type.as_deref(), Some("upstream"));
    }

    #[test]
    fn test_failure_status() {
        let ctx = RequestContext::new(metric());
        let m = ctx.finalize_with_latency(10.0, Some(RequestFailure::timeout("slow")));
        assert_eq!(m.status, RequestStatus::Timeout);

        let ctx = RequestContext::new(metric());
        let m = ctx.finalize_with_latency(10.0, Some(RequestFailure::error("bad", "boom")));
        assert_eq!(m.status, RequestStatus::Error);
    }

    #[tokio::test]
    async fn test_flush_now_writes_buffer() {
        let store = Arc::new(InMemoryMetricStore::new());
        let tracker = MetricsTracker::new(
            store.clone(),
            IngestionConfig::default(),
            PipelineMetrics::new().unwrap(),
        );

        for _ in 0..3 {
            let ctx = tracker.begin_request(
                AgentType::BossAgent,
                "user",
                "orchestrate",
                AnalysisDepth::Quick,
            );
            tracker.end_request(ctx, None);
        }
        assert_eq!(tracker.buffered_count(), 3);

        assert_eq!(tracker.flush_now().await.unwrap(), 3);
        assert_eq!(tracker.buffered_count(), 0);
        assert_eq!(store.metric_count().await, 3);
        assert_eq!(tracker.flush_now().await.unwrap(), 0);
    }
}

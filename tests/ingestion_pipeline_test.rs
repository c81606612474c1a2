//! Metric ingestion tests: request tracking, batched flushing through the
//! background worker, the final flush on shutdown and load shedding.

mod test_helpers;

use agent_monitor::config::IngestionConfig;
use agent_monitor::monitoring::{
    AgentType, AnalysisDepth, InMemoryMetricStore, MetricsTracker, MonitoringError,
    PipelineMetrics, RequestFailure, RequestStatus,
};
use agent_monitor::{AuthenticatedRequest, RequestValidator};
use anyhow::Result;
use std::sync::Arc;
use test_helpers::{metric, FlakyStore};
use tokio::time::{sleep, timeout, Duration};

fn tracker(store: Arc<InMemoryMetricStore>, config: IngestionConfig) -> Result<Arc<MetricsTracker>> {
    Ok(Arc::new(MetricsTracker::new(
        store,
        config,
        PipelineMetrics::new()?,
    )))
}

struct ApiRequest {
    user: &'static str,
    agent: &'static str,
}

impl AuthenticatedRequest for ApiRequest {
    fn user_id(&self) -> &str {
        self.user
    }

    fn agent_type(&self) -> &str {
        self.agent
    }
}

#[tokio::test]
async fn test_full_batch_is_flushed_by_worker() -> Result<()> {
    let store = Arc::new(InMemoryMetricStore::new());
    let tracker = tracker(store.clone(), IngestionConfig::default())?;
    tracker.start().await?;

    for i in 0..50 {
        let mut ctx = tracker.begin_request(
            AgentType::AudienceInsights,
            format!("user-{}", i % 3),
            "audience_report",
            AnalysisDepth::Standard,
        );
        ctx.record_model_usage("gpt-4o-mini", "openai", 800, 200, 0.0003, 120.0);
        tracker.end_request(ctx, None);
    }

    timeout(Duration::from_secs(5), async {
        while store.metric_count().await < 50 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;

    assert_eq!(tracker.buffered_count(), 0);
    let stored = store.metrics().await;
    assert!(stored.iter().all(|m| m.status == RequestStatus::Success));
    assert!(stored.iter().all(|m| m.model_name == "gpt-4o-mini"));

    assert_eq!(tracker.stop().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_stop_flushes_partial_buffer() -> Result<()> {
    let store = Arc::new(InMemoryMetricStore::new());
    let tracker = tracker(store.clone(), IngestionConfig::default())?;
    tracker.start().await?;

    for _ in 0..7 {
        let ctx = tracker.begin_request(
            AgentType::SeoDiscoverability,
            "user-1",
            "keyword_scan",
            AnalysisDepth::Quick,
        );
        tracker.end_request(ctx, Some(RequestFailure::timeout("provider timed out")));
    }
    assert_eq!(tracker.buffered_count(), 7);

    assert_eq!(tracker.stop().await?, 7);
    let stored = store.metrics().await;
    assert_eq!(stored.len(), 7);
    assert!(stored.iter().all(|m| m.status == RequestStatus::Timeout));

    // The worker cannot be restarted once its queue has been consumed
    assert!(tracker.start().await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_full_queue_drops_batches() -> Result<()> {
    let store = Arc::new(InMemoryMetricStore::new());
    let metrics = PipelineMetrics::new()?;
    let config = IngestionConfig {
        flush_batch_size: 2,
        flush_interval_seconds: 30,
        flush_queue_capacity: 1,
    };
    let tracker = MetricsTracker::new(store.clone(), config, metrics.clone());

    // No worker: the first batch waits in the queue, the next two are shed
    for _ in 0..6 {
        tracker.record(metric(AgentType::ContentAnalysis, 100.0, 0.001, RequestStatus::Success));
    }

    assert_eq!(metrics.metrics_ingested_total.get(), 6);
    assert_eq!(metrics.metrics_dropped_total.get(), 4);
    assert_eq!(tracker.buffered_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_stop_without_worker_writes_queued_batches() -> Result<()> {
    let store = Arc::new(InMemoryMetricStore::new());
    let config = IngestionConfig {
        flush_batch_size: 2,
        flush_interval_seconds: 30,
        flush_queue_capacity: 4,
    };
    let tracker = tracker(store.clone(), config)?;

    // One full batch is queued, the third metric stays buffered
    for _ in 0..3 {
        tracker.record(metric(AgentType::MonetizationStrategy, 250.0, 0.002, RequestStatus::Success));
    }
    assert_eq!(tracker.buffered_count(), 1);
    assert_eq!(store.metric_count().await, 0);

    assert_eq!(tracker.stop().await?, 3);
    assert_eq!(store.metric_count().await, 3);

    // The queue is closed now, so late batches are shed
    assert!(tracker.start().await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_failed_flush_counts_dropped_metrics() -> Result<()> {
    let store = Arc::new(FlakyStore::new());
    store.set_fail_writes(true);
    let metrics = PipelineMetrics::new()?;
    let tracker = MetricsTracker::new(store.clone(), IngestionConfig::default(), metrics.clone());

    for _ in 0..3 {
        tracker.record(metric(AgentType::BossAgent, 100.0, 0.001, RequestStatus::Success));
    }

    let err = tracker.flush_now().await.unwrap_err();
    assert!(matches!(err, MonitoringError::Store { .. }));
    assert_eq!(metrics.metrics_dropped_total.get(), 3);
    assert_eq!(metrics.flush_failures_total.get(), 1);
    assert_eq!(tracker.buffered_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_authenticated_requests_are_validated() -> Result<()> {
    let store = Arc::new(InMemoryMetricStore::new());
    let tracker = MetricsTracker::new(
        store.clone(),
        IngestionConfig::default(),
        PipelineMetrics::new()?,
    )
    .with_validator(RequestValidator::new().with_allowed_agents([AgentType::ContentAnalysis]));

    let ok = tracker.begin_authenticated_request(
        &ApiRequest {
            user: "  creator-42 ",
            agent: "content-analysis",
        },
        "video_review",
        AnalysisDepth::Deep,
    )?;
    assert_eq!(ok.metric().user_id, "creator-42");
    assert_eq!(ok.metric().agent_type, AgentType::ContentAnalysis);

    let blank = tracker.begin_authenticated_request(
        &ApiRequest {
            user: "",
            agent: "content_analysis",
        },
        "video_review",
        AnalysisDepth::Standard,
    );
    assert!(matches!(blank, Err(MonitoringError::Validation(_))));

    let forbidden = tracker.begin_authenticated_request(
        &ApiRequest {
            user: "creator-42",
            agent: "boss_agent",
        },
        "video_review",
        AnalysisDepth::Standard,
    );
    assert!(matches!(forbidden, Err(MonitoringError::Validation(_))));

    let unknown = tracker.begin_authenticated_request(
        &ApiRequest {
            user: "creator-42",
            agent: "weather_agent",
        },
        "video_review",
        AnalysisDepth::Standard,
    );
    assert!(matches!(
        unknown,
        Err(MonitoringError::InvalidAgentType { .. })
    ));
    Ok(())
}

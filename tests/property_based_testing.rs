//! Property-based tests for the scoring and cost math.
//!
//! These use proptest to check bounds and ordering that must hold for any
//! input, including the degenerate ones the store can produce.

use agent_monitor::monitoring::{
    approximate_percentile, calculate_health_score, classify_trend, ols_slope,
    optimization_potential, AlertSeverity, AnalysisDepth, ComparisonOperator, CostGroupRow,
    CostTrend, ModelCatalog, MetricBuffer, RequestStatus,
};
use chrono::Duration as ChronoDuration;
use proptest::prelude::*;
use std::time::Duration;
use tokio::time::Instant;

prop_compose! {
    fn arb_cost_row()(
        model in prop::sample::select(vec!["gpt-4o", "gpt-4o-mini", "claude-3-haiku", "custom-model", ""]),
        depth in prop::sample::select(vec![AnalysisDepth::Quick, AnalysisDepth::Standard, AnalysisDepth::Deep]),
        request_count in 0i64..500,
        avg_cost in 0.0f64..2.0,
        cache_ratio in 0.0f64..=1.0,
    ) -> CostGroupRow {
        CostGroupRow {
            model_name: model.to_string(),
            model_provider: "openai".to_string(),
            analysis_depth: depth,
            request_count,
            total_cost: avg_cost * request_count as f64,
            total_input_tokens: request_count * 900,
            total_output_tokens: request_count * 300,
            cache_hits: (request_count as f64 * cache_ratio).floor() as i64,
        }
    }
}

proptest! {
    #[test]
    fn health_score_stays_in_range(
        error_rate in 0.0f64..=1.0,
        latency in 0.0f64..200_000.0,
        cache_hit_rate in 0.0f64..=1.0,
    ) {
        let score = calculate_health_score(error_rate, latency, cache_hit_rate);
        prop_assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn health_score_never_improves_with_more_errors(
        low in 0.0f64..=0.5,
        delta in 0.0f64..=0.5,
        latency in 0.0f64..20_000.0,
        cache_hit_rate in 0.0f64..=1.0,
    ) {
        let better = calculate_health_score(low, latency, cache_hit_rate);
        let worse = calculate_health_score(low + delta, latency, cache_hit_rate);
        prop_assert!(worse <= better);
    }

    #[test]
    fn optimization_potential_is_bounded(rows in prop::collection::vec(arb_cost_row(), 0..8)) {
        let potential = optimization_potential(&rows, &ModelCatalog::default());
        prop_assert!((0.0..=0.8).contains(&potential));
    }

    #[test]
    fn percentile_is_a_member_of_the_input(
        mut values in prop::collection::vec(0.0f64..60_000.0, 1..200),
        q in 0.0f64..=1.0,
    ) {
        values.sort_by(f64::total_cmp);
        let p = approximate_percentile(&values, q);
        prop_assert!(values.contains(&p));
        prop_assert!(p >= values[0] && p <= values[values.len() - 1]);
    }

    #[test]
    fn constant_series_is_stable(value in 0.0f64..100.0, len in 3usize..48) {
        let series = vec![value; len];
        prop_assert!(ols_slope(&series).abs() < 1e-9);
        prop_assert_eq!(classify_trend(&series).0, CostTrend::Stable);
    }

    #[test]
    fn short_series_has_insufficient_data(series in prop::collection::vec(0.0f64..10.0, 0..3)) {
        prop_assert_eq!(classify_trend(&series), (CostTrend::InsufficientData, None));
    }

    #[test]
    fn gte_agrees_with_gt_or_eq(value in -1e6f64..1e6, threshold in -1e6f64..1e6) {
        let gte = ComparisonOperator::Gte.evaluate(value, threshold);
        let gt_or_eq = ComparisonOperator::Gt.evaluate(value, threshold)
            || ComparisonOperator::Eq.evaluate(value, threshold);
        prop_assert_eq!(gte, gt_or_eq);
    }

    #[test]
    fn buffer_never_exceeds_batch_size(batch_size in 1usize..64, pushes in 0usize..300) {
        let start = Instant::now();
        let mut buffer = MetricBuffer::new(batch_size, Duration::from_secs(3600), start);
        let mut flushed = 0;

        for _ in 0..pushes {
            let metric = agent_monitor::Metric::new(
                agent_monitor::AgentType::ContentAnalysis,
                "user",
                "analyze",
                AnalysisDepth::Standard,
            );
            if let Some(batch) = buffer.push(metric, start) {
                prop_assert_eq!(batch.len(), batch_size);
                flushed += batch.len();
            }
            prop_assert!(buffer.len() < batch_size);
        }

        prop_assert_eq!(flushed + buffer.len(), pushes);
    }
}

#[test]
fn severity_cooldowns_shrink_with_urgency() {
    let ordered = [
        AlertSeverity::Low,
        AlertSeverity::Medium,
        AlertSeverity::High,
        AlertSeverity::Critical,
    ];
    for pair in ordered.windows(2) {
        assert!(pair[0] < pair[1]);
        assert!(pair[0].cooldown() > pair[1].cooldown());
    }
    assert_eq!(AlertSeverity::Critical.cooldown(), ChronoDuration::minutes(5));
}

#[test]
fn request_status_round_trips_through_strings() {
    for status in [
        RequestStatus::Success,
        RequestStatus::Error,
        RequestStatus::Timeout,
        RequestStatus::RateLimited,
        RequestStatus::CacheHit,
    ] {
        assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
    }
}

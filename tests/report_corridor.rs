// tests/report_corridor.rs
//
// Corridor report end to end over fixture adapters: every segment resolves
// against the same feed, delays accumulate, and the recommendation follows
// the total.

use std::sync::Arc;
use std::time::Duration;

use roadwatch::orchestrator::Orchestrator;
use roadwatch::providers::commercial::CommercialProvider;
use roadwatch::providers::national_roads::NationalRoadsProvider;
use roadwatch::providers::TrafficProvider;
use roadwatch::report::{Recommendation, ReportBuilder, RouteDirection, SegmentStatus};

fn builder_over(feed: &str) -> ReportBuilder {
    let providers: Vec<Arc<dyn TrafficProvider>> =
        vec![Arc::new(NationalRoadsProvider::from_fixture(feed))];
    let commercial = Arc::new(CommercialProvider::from_fixture(r#"{"routes": []}"#));
    let orchestrator = Arc::new(Orchestrator::new(providers, commercial));
    ReportBuilder::new(orchestrator).with_pause(Duration::ZERO)
}

#[tokio::test]
async fn congested_feed_accumulates_to_major() {
    // 28 vs 22 minutes: 6 min delay per segment, six segments.
    let builder = builder_over(
        r#"{"segments": [
            {"road": "M1", "direction": "northbound",
             "travelTimeMinutes": 28.0, "freeFlowTimeMinutes": 22.0}
        ]}"#,
    );

    let report = builder.build_report(RouteDirection::Southbound).await;

    assert_eq!(report.segments.len(), 6);
    assert_eq!(report.total_delay_minutes, 36.0);
    assert_eq!(report.recommendation, Recommendation::Major);
    assert!(report.message.contains("N2/A1"));
    for seg in &report.segments {
        assert_eq!(seg.status, SegmentStatus::Moderate);
        assert_eq!(seg.delay_minutes, 6.0);
    }
}

#[tokio::test]
async fn free_flowing_feed_reports_clear() {
    let builder = builder_over(
        r#"{"segments": [
            {"road": "M1", "direction": "southbound",
             "travelTimeMinutes": 22.0, "freeFlowTimeMinutes": 22.0}
        ]}"#,
    );

    let report = builder.build_report(RouteDirection::Northbound).await;

    assert_eq!(report.recommendation, Recommendation::Clear);
    assert_eq!(report.total_delay_minutes, 0.0);
    assert!(report
        .segments
        .iter()
        .all(|s| s.status == SegmentStatus::Clear));
}

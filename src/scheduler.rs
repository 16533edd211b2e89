// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::enrich::{SegmentExtractor, SWEEP_INTERVAL_SECS};
use crate::notify::{Notifier, NOTIFY_MIN_TOTAL_DELAY_MINUTES};
use crate::report::{ReportBuilder, RouteDirection};

#[derive(Clone, Copy, Debug)]
pub struct ReportSchedulerCfg {
    pub interval_secs: u64,
    pub direction: RouteDirection,
}

/// Spawn the periodic junction-report check. Each tick builds the report and
/// forwards it to the sink when the total delay crosses the notify floor.
pub fn spawn_report_scheduler(
    cfg: ReportSchedulerCfg,
    builder: Arc<ReportBuilder>,
    notifier: Arc<dyn Notifier>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(cfg.interval_secs));
        loop {
            ticker.tick().await;

            let report = builder.build_report(cfg.direction).await;
            tracing::info!(
                target: "report",
                direction = cfg.direction.as_str(),
                total_delay = report.total_delay_minutes,
                recommendation = ?report.recommendation,
                "junction report tick"
            );

            if report.total_delay_minutes >= NOTIFY_MIN_TOTAL_DELAY_MINUTES {
                if let Err(e) = notifier.send(&report).await {
                    tracing::warn!(error = ?e, "report notification failed");
                }
            }
        }
    })
}

/// Spawn the enrichment-cache sweep, bounding memory on a cadence
/// independent of the entry TTL.
pub fn spawn_cache_sweeper(extractor: Arc<SegmentExtractor>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            let evicted = extractor.sweep_cache();
            if evicted > 0 {
                tracing::debug!(evicted, "enrichment cache sweep");
            }
        }
    })
}

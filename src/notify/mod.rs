pub mod webhook;

use anyhow::Result;

use crate::report::JunctionReport;

/// Messaging sink for scheduled junction reports.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, report: &JunctionReport) -> Result<()>;
}

/// Reports below this total delay are not forwarded.
pub const NOTIFY_MIN_TOTAL_DELAY_MINUTES: f64 = 5.0;

//! Roadwatch — Binary Entrypoint
//! Boots the Axum HTTP server, wiring routes, shared state, schedulers, and
//! the Prometheus exporter.

use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use roadwatch::cache::DEFAULT_TTL_SECS;
use roadwatch::config::Settings;
use roadwatch::metrics::Metrics;
use roadwatch::notify::webhook::WebhookNotifier;
use roadwatch::report::RouteDirection;
use roadwatch::scheduler::{spawn_cache_sweeper, spawn_report_scheduler, ReportSchedulerCfg};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::from_env();
    let state = roadwatch::build_state(&settings);

    // Background jobs: enrichment cache sweep + periodic junction reports.
    let _sweeper = spawn_cache_sweeper(state.extractor.clone());
    if settings.report_interval_secs > 0 {
        let notifier = Arc::new(WebhookNotifier::from_env());
        for direction in [RouteDirection::Southbound, RouteDirection::Northbound] {
            let _handle = spawn_report_scheduler(
                ReportSchedulerCfg {
                    interval_secs: settings.report_interval_secs,
                    direction,
                },
                state.report.clone(),
                notifier.clone(),
            );
        }
    }

    let metrics = Metrics::init(DEFAULT_TTL_SECS);
    let router = roadwatch::create_router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!(addr = %settings.bind_addr, "roadwatch listening");
    axum::serve(listener, router).await?;
    Ok(())
}

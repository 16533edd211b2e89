//! Prometheus wiring: recorder install, metric-family registration, and the
//! `/metrics` exposition route.
//!
//! Every family the crate records is registered here in one place, so
//! operators see HELP text even for series that have not fired yet and the
//! recording call sites stay free of registration boilerplate.

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global recorder and register the families recorded by the
    /// adapters, the orchestrator, and the enrichment pipeline.
    pub fn init(cache_ttl_secs: u64) -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");

        describe_counter!("provider_fetches_total", "Provider fetch attempts.");
        describe_counter!("provider_cache_hits_total", "Adapter cache hits.");
        describe_counter!("provider_errors_total", "Provider fetch/parse errors.");
        describe_counter!(
            "commercial_calls_total",
            "Billable commercial routing calls."
        );
        describe_histogram!("provider_fetch_ms", "Provider fetch time in milliseconds.");
        describe_counter!("orchestrator_resolves_total", "Orchestrator queries.");
        describe_counter!(
            "orchestrator_fallback_total",
            "Queries that triggered the commercial fallback."
        );
        describe_counter!("enrich_requests_total", "Enrichment extract calls.");
        describe_counter!("enrich_cache_hits_total", "Enrichment cache hits.");
        describe_counter!(
            "enrich_fallback_total",
            "Extractions served by the local fallback."
        );
        describe_gauge!(
            "adapter_cache_ttl_secs",
            "Entry lifetime of the adapter and enrichment caches."
        );

        // The TTL is fixed at startup; exporting it lets dashboards annotate
        // cache hit-rate panels with the window length.
        gauge!("adapter_cache_ttl_secs").set(cache_ttl_secs as f64);

        Self { handle }
    }

    /// Router serving `/metrics` in Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

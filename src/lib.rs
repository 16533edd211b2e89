// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod cache;
pub mod config;
pub mod enrich;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod providers;
pub mod report;
pub mod scheduler;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::model::{
    CongestionLevel, Country, Direction, FetchOutcome, NormalizedTrafficRecord, TrafficSource,
};
pub use crate::orchestrator::{Orchestrator, Resolution};

use std::sync::Arc;

use crate::config::Settings;
use crate::enrich::backend::{DisabledBackend, EnrichBackend, OpenAiBackend};
use crate::enrich::fallback::LandmarkTable;
use crate::enrich::SegmentExtractor;
use crate::providers::commercial::CommercialProvider;
use crate::providers::national_roads::NationalRoadsProvider;
use crate::providers::uk_highways::UkHighwaysProvider;
use crate::providers::TrafficProvider;
use crate::report::ReportBuilder;

/// Build the production router from environment-provided settings.
///
/// Tests that need deterministic adapters should assemble an
/// [`api::AppState`] from fixtures/stubs instead and call
/// [`api::create_router`] directly.
pub async fn app() -> anyhow::Result<axum::Router> {
    let settings = Settings::from_env();
    Ok(create_router(build_state(&settings)))
}

pub fn build_state(settings: &Settings) -> AppState {
    let providers: Vec<Arc<dyn TrafficProvider>> = vec![
        Arc::new(NationalRoadsProvider::from_url(
            &settings.national_roads_url,
            settings.national_roads_key.as_deref(),
        )),
        Arc::new(UkHighwaysProvider::from_url(
            &settings.uk_highways_url,
            settings.uk_highways_key.as_deref(),
        )),
    ];
    let commercial = Arc::new(CommercialProvider::from_url(
        &settings.commercial_url,
        settings.commercial_key.as_deref().unwrap_or_default(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(providers, commercial));

    let backend: Arc<dyn EnrichBackend> = match settings.enrich_provider.as_str() {
        "openai" => Arc::new(OpenAiBackend::from_env()),
        _ => Arc::new(DisabledBackend),
    };
    let extractor = Arc::new(SegmentExtractor::new(
        backend,
        LandmarkTable::load_from_file("config/landmarks.json"),
    ));

    let report = Arc::new(ReportBuilder::new(orchestrator.clone()));

    AppState {
        orchestrator,
        extractor,
        report,
        api_keys: Arc::new(settings.api_keys.clone()),
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;

use crate::cache::CacheStats;
use crate::enrich::{EnrichedSegment, ExtractOptions, SegmentExtractor};
use crate::model::{CongestionLevel, Country};
use crate::orchestrator::{Orchestrator, Resolution};
use crate::report::{ReportBuilder, RouteDirection};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub extractor: Arc<SegmentExtractor>,
    pub report: Arc<ReportBuilder>,
    /// Empty list means open access (development mode).
    pub api_keys: Arc<Vec<String>>,
}

pub fn create_router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/traffic", get(traffic))
        .route("/extract", post(extract))
        .route("/cache/stats", get(cache_stats))
        .route("/cache/clear", post(cache_clear))
        .route("/report/{direction}", get(report))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(gated)
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// API-key gate. The key list is externally supplied; an empty list keeps
/// the service open for local development.
async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if state.api_keys.is_empty() {
        return next.run(req).await;
    }
    let presented = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if state.api_keys.iter().any(|k| k == presented) {
        next.run(req).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "invalid or missing api key" })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
struct TrafficParams {
    road: Option<String>,
    country: Option<String>,
    town: Option<String>,
    #[serde(default)]
    extract: Option<bool>,
}

#[derive(Serialize)]
struct QueryEcho {
    road: String,
    country: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    town: Option<String>,
    extract: bool,
}

#[derive(Serialize, Default)]
struct CongestionBreakdown {
    none: usize,
    light: usize,
    moderate: usize,
    heavy: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrafficSummary {
    total_records: usize,
    sources_used: Vec<String>,
    congestion_breakdown: CongestionBreakdown,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrafficRouting {
    sources_tried: Vec<String>,
    fallback_used: bool,
    trace: crate::model::FetchTrace,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrafficResponse {
    query: QueryEcho,
    timestamp: DateTime<Utc>,
    data: Vec<Value>,
    summary: TrafficSummary,
    routing: TrafficRouting,
    response_time_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<String>>,
}

fn breakdown(res: &Resolution) -> CongestionBreakdown {
    let mut b = CongestionBreakdown::default();
    for r in &res.data {
        match r.congestion_level {
            CongestionLevel::None => b.none += 1,
            CongestionLevel::Light => b.light += 1,
            CongestionLevel::Moderate => b.moderate += 1,
            CongestionLevel::Heavy => b.heavy += 1,
        }
    }
    b
}

async fn traffic(
    State(state): State<AppState>,
    Query(params): Query<TrafficParams>,
) -> Response {
    let t0 = Instant::now();

    let Some(road) = params
        .road
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "missing required 'road' parameter" })),
        )
            .into_response();
    };

    let country = params
        .country
        .as_deref()
        .map(Country::parse)
        .unwrap_or_default();
    let town = params.town.as_deref();
    let want_extract = params.extract.unwrap_or(false);

    let res = state.orchestrator.resolve(road, country, town).await;

    // Optionally enrich each record; one failed enrichment degrades that
    // record alone.
    let mut data: Vec<Value> = Vec::with_capacity(res.data.len());
    if want_extract && !res.data.is_empty() {
        let inputs: Vec<String> = res
            .data
            .iter()
            .map(|r| serde_json::to_string(r).unwrap_or_default())
            .collect();
        let enriched = state
            .extractor
            .extract_batch(&inputs, ExtractOptions::default())
            .await;
        for (record, seg) in res.data.iter().zip(enriched) {
            let mut v = serde_json::to_value(record).unwrap_or(Value::Null);
            if let Some(obj) = v.as_object_mut() {
                obj.insert(
                    "enrichment".to_string(),
                    serde_json::to_value(seg).unwrap_or(Value::Null),
                );
            }
            data.push(v);
        }
    } else {
        for record in &res.data {
            data.push(serde_json::to_value(record).unwrap_or(Value::Null));
        }
    }

    let response = TrafficResponse {
        query: QueryEcho {
            road: road.to_ascii_uppercase(),
            country: country.as_str(),
            town: town.map(str::to_string),
            extract: want_extract,
        },
        timestamp: Utc::now(),
        summary: TrafficSummary {
            total_records: res.data.len(),
            sources_used: res.sources_used.clone(),
            congestion_breakdown: breakdown(&res),
        },
        routing: TrafficRouting {
            sources_tried: res.sources_used.clone(),
            fallback_used: res.fallback_used,
            trace: res.trace.clone(),
        },
        data,
        response_time_ms: t0.elapsed().as_millis(),
        errors: (!res.errors.is_empty()).then(|| res.errors.clone()),
    };

    Json(response).into_response()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractResponse {
    input: String,
    extracted: EnrichedSegment,
    processing_time_ms: u128,
}

/// Enrichment demo endpoint: accepts raw free text or a JSON document.
async fn extract(State(state): State<AppState>, body: String) -> Response {
    let t0 = Instant::now();
    if body.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "empty body" })),
        )
            .into_response();
    }

    let extracted = state
        .extractor
        .extract(&body, ExtractOptions::default())
        .await;

    Json(ExtractResponse {
        input: body,
        extracted,
        processing_time_ms: t0.elapsed().as_millis(),
    })
    .into_response()
}

#[derive(Serialize)]
struct CacheStatsResponse {
    providers: BTreeMap<String, CacheStats>,
    enrichment: CacheStats,
}

async fn cache_stats(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    Json(CacheStatsResponse {
        providers: state.orchestrator.cache_stats(),
        enrichment: state.extractor.cache_stats(),
    })
}

async fn cache_clear(State(state): State<AppState>) -> Json<Value> {
    state.orchestrator.clear_caches();
    state.extractor.clear_cache();
    Json(serde_json::json!({ "cleared": true }))
}

async fn report(
    State(state): State<AppState>,
    Path(direction): Path<String>,
) -> Response {
    let Some(direction) = RouteDirection::parse(&direction) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "direction must be 'southbound' or 'northbound'"
            })),
        )
            .into_response();
    };

    let report = state.report.build_report(direction).await;
    Json(report).into_response()
}

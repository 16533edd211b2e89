//! Adapter for the Irish national-roads telemetry feed.
//!
//! The feed publishes per-segment travel times as JSON; this module is the
//! only place that knows the feed's native shape. Congestion is derived from
//! delay thresholds (minutes): `>10 heavy, >5 moderate, >2 light, else none`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::cache::{CacheStats, Clock, TtlCache, DEFAULT_TTL_SECS};
use crate::model::{
    Country, Direction, FetchOutcome, Location, NormalizedTrafficRecord, RoadQuery, TrafficSource,
};
use crate::providers::{self, TrafficProvider};

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Segment {
    road: Option<String>,
    direction: Option<String>,
    from: Option<String>,
    to: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    travel_time_minutes: Option<f64>,
    free_flow_time_minutes: Option<f64>,
    delay_minutes: Option<f64>,
    updated_at: Option<DateTime<Utc>>,
}

/// Four-tier delay classification shared with the junction report.
pub fn congestion_from_delay(delay_minutes: f64) -> crate::model::CongestionLevel {
    use crate::model::CongestionLevel::*;
    if delay_minutes > 10.0 {
        Heavy
    } else if delay_minutes > 5.0 {
        Moderate
    } else if delay_minutes > 2.0 {
        Light
    } else {
        None
    }
}

pub struct NationalRoadsProvider {
    mode: Mode,
    cache: TtlCache<Vec<NormalizedTrafficRecord>>,
}

enum Mode {
    /// Canned payload for tests; counts parses so cache behavior is provable.
    Fixture {
        body: String,
        calls: AtomicU32,
    },
    Http {
        base_url: String,
        api_key: Option<String>,
        client: reqwest::Client,
    },
}

impl NationalRoadsProvider {
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture {
                body: body.to_string(),
                calls: AtomicU32::new(0),
            },
            cache: TtlCache::with_default_ttl(),
        }
    }

    pub fn from_url(base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            mode: Mode::Http {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key: api_key.map(str::to_string),
                client: providers::provider_http_client(),
            },
            cache: TtlCache::with_default_ttl(),
        }
    }

    /// Replace the cache with one on an injected clock (tests).
    pub fn with_cache_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.cache = TtlCache::new(DEFAULT_TTL_SECS, clock);
        self
    }

    /// Number of fixture parses performed (tests only care in fixture mode).
    pub fn upstream_calls(&self) -> u32 {
        match &self.mode {
            Mode::Fixture { calls, .. } => calls.load(Ordering::SeqCst),
            Mode::Http { .. } => 0,
        }
    }

    fn parse_feed(road: &str, body: &str) -> Result<Vec<NormalizedTrafficRecord>> {
        let t0 = std::time::Instant::now();
        let feed: Feed = serde_json::from_str(body).context("parsing national-roads json")?;

        let mut out = Vec::new();
        for seg in feed.segments {
            let seg_road = seg
                .road
                .as_deref()
                .unwrap_or_default()
                .trim()
                .to_ascii_uppercase();
            if seg_road != road {
                continue;
            }

            // Defensive defaults: a segment missing travel time reports its
            // free-flow baseline (zero delay) rather than being dropped.
            let free_flow = seg.free_flow_time_minutes.unwrap_or(0.0).max(0.0);
            let travel = seg.travel_time_minutes.unwrap_or(free_flow).max(0.0);
            let delay = seg
                .delay_minutes
                .map(|d| d.max(0.0))
                .unwrap_or_else(|| NormalizedTrafficRecord::derive_delay(travel, free_flow));

            let location = Location {
                lat: seg.lat,
                lon: seg.lon,
                from: seg.from,
                to: seg.to,
            };

            out.push(NormalizedTrafficRecord {
                source: TrafficSource::NationalRoads,
                road: seg_road,
                direction: seg
                    .direction
                    .as_deref()
                    .map(Direction::from_text)
                    .unwrap_or_default(),
                location: (!location.is_empty()).then_some(location),
                travel_time_minutes: travel,
                free_flow_time_minutes: free_flow,
                delay_minutes: delay,
                congestion_level: congestion_from_delay(delay),
                timestamp: seg.updated_at.unwrap_or_else(Utc::now),
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("provider_fetch_ms", "provider" => "national-roads").record(ms);
        Ok(out)
    }

    async fn fetch_raw(&self, road: &str) -> Result<Vec<NormalizedTrafficRecord>> {
        match &self.mode {
            Mode::Fixture { body, calls } => {
                calls.fetch_add(1, Ordering::SeqCst);
                Self::parse_feed(road, body)
            }
            Mode::Http {
                base_url,
                api_key,
                client,
            } => {
                let url = format!("{base_url}/segments?road={road}");
                let mut req = client.get(&url);
                if let Some(key) = api_key {
                    req = req.header("x-api-key", key);
                }
                let resp = req.send().await.context("national-roads http get")?;
                let resp = resp
                    .error_for_status()
                    .context("national-roads non-2xx")?;
                let body = resp.text().await.context("national-roads body")?;
                Self::parse_feed(road, &body)
            }
        }
    }
}

#[async_trait]
impl TrafficProvider for NationalRoadsProvider {
    async fn fetch(&self, query: &RoadQuery) -> FetchOutcome {
        counter!("provider_fetches_total", "provider" => self.name()).increment(1);

        let key = query.road.to_ascii_uppercase();
        if let Some(data) = self.cache.get(&key) {
            counter!("provider_cache_hits_total", "provider" => self.name()).increment(1);
            return FetchOutcome::hit(data);
        }

        match self.fetch_raw(&key).await {
            Ok(data) => {
                self.cache.put(&key, data.clone());
                FetchOutcome::fresh(data)
            }
            Err(e) => {
                tracing::warn!(error = ?e, provider = self.name(), "provider error");
                counter!("provider_errors_total", "provider" => self.name()).increment(1);
                FetchOutcome::failed(format!("{}: {e:#}", self.name()))
            }
        }
    }

    fn is_applicable(&self, road: &str, country: Country) -> bool {
        matches!(country, Country::All | Country::Ie) && providers::is_ie_road(road)
    }

    fn name(&self) -> &'static str {
        "national-roads"
    }

    fn source(&self) -> TrafficSource {
        TrafficSource::NationalRoads
    }

    fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CongestionLevel;

    const FIXTURE: &str = r#"{
        "segments": [
            {"road": "M1", "direction": "northbound", "from": "Junction 4", "to": "Junction 5",
             "travelTimeMinutes": 28.0, "freeFlowTimeMinutes": 22.0,
             "lat": 53.63, "lon": -6.35, "updatedAt": "2026-08-29T08:00:00Z"},
            {"road": "N7", "direction": "westbound",
             "travelTimeMinutes": 12.0, "freeFlowTimeMinutes": 11.0}
        ]
    }"#;

    #[test]
    fn delay_thresholds() {
        assert_eq!(congestion_from_delay(0.0), CongestionLevel::None);
        assert_eq!(congestion_from_delay(2.0), CongestionLevel::None);
        assert_eq!(congestion_from_delay(2.1), CongestionLevel::Light);
        assert_eq!(congestion_from_delay(5.0), CongestionLevel::Light);
        assert_eq!(congestion_from_delay(5.1), CongestionLevel::Moderate);
        assert_eq!(congestion_from_delay(10.0), CongestionLevel::Moderate);
        assert_eq!(congestion_from_delay(10.1), CongestionLevel::Heavy);
    }

    #[tokio::test]
    async fn parses_and_filters_by_road() {
        let p = NationalRoadsProvider::from_fixture(FIXTURE);
        let out = p.fetch(&RoadQuery::new("M1", Country::Ie, None)).await;
        assert!(out.error.is_none());
        assert_eq!(out.data.len(), 1);
        let r = &out.data[0];
        assert_eq!(r.road, "M1");
        assert_eq!(r.direction, Direction::Northbound);
        assert_eq!(r.delay_minutes, 6.0);
        assert_eq!(r.congestion_level, CongestionLevel::Moderate);
    }

    #[tokio::test]
    async fn second_fetch_hits_cache_without_reparse() {
        let p = NationalRoadsProvider::from_fixture(FIXTURE);
        let q = RoadQuery::new("M1", Country::Ie, None);
        let first = p.fetch(&q).await;
        let second = p.fetch(&q).await;
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.data, second.data);
        assert_eq!(p.upstream_calls(), 1);
    }

    #[tokio::test]
    async fn malformed_payload_becomes_error_string() {
        let p = NationalRoadsProvider::from_fixture("{not json");
        let out = p.fetch(&RoadQuery::new("M1", Country::Ie, None)).await;
        assert!(out.data.is_empty());
        assert!(out.error.as_deref().unwrap_or_default().contains("national-roads"));
    }

    #[test]
    fn applicability_respects_country_filter() {
        let p = NationalRoadsProvider::from_fixture("{}");
        assert!(p.is_applicable("M1", Country::All));
        assert!(p.is_applicable("N7", Country::Ie));
        assert!(!p.is_applicable("M1", Country::Uk));
        assert!(!p.is_applicable("A1", Country::Ie));
    }
}

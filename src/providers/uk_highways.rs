//! Adapter for the UK highways feed.
//!
//! Two-step fetch: site discovery by road designation, then current reports
//! by site ids, merged by site id. A discovered site with no report still
//! yields a record (zero flow/speed) so callers can see the silent site.
//!
//! Congestion is derived from the `speed / typical speed` ratio plus absolute
//! speed thresholds (mph): ratio `<0.3` or speed `<20` heavy; `<0.6`/`<40`
//! moderate; `<0.8`/`<55` light; else none.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::cache::{CacheStats, Clock, TtlCache, DEFAULT_TTL_SECS};
use crate::model::{
    CongestionLevel, Country, Direction, FetchOutcome, Location, NormalizedTrafficRecord,
    RoadQuery, TrafficSource,
};
use crate::providers::{self, TrafficProvider};

#[derive(Debug, Deserialize)]
struct SitesPage {
    #[serde(default)]
    sites: Vec<Site>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Site {
    id: Option<String>,
    name: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    length_miles: Option<f64>,
    typical_speed_mph: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ReportsPage {
    #[serde(default)]
    reports: Vec<Report>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    site_id: Option<String>,
    speed_mph: Option<f64>,
    flow: Option<f64>,
}

/// Speed-ratio classification for the UK feed.
pub fn congestion_from_speed(speed_mph: f64, typical_speed_mph: f64) -> CongestionLevel {
    let ratio = if typical_speed_mph > 0.0 {
        speed_mph / typical_speed_mph
    } else {
        1.0
    };
    if ratio < 0.3 || speed_mph < 20.0 {
        CongestionLevel::Heavy
    } else if ratio < 0.6 || speed_mph < 40.0 {
        CongestionLevel::Moderate
    } else if ratio < 0.8 || speed_mph < 55.0 {
        CongestionLevel::Light
    } else {
        CongestionLevel::None
    }
}

pub struct UkHighwaysProvider {
    mode: Mode,
    cache: TtlCache<Vec<NormalizedTrafficRecord>>,
}

enum Mode {
    Fixture {
        sites_body: String,
        reports_body: String,
        calls: AtomicU32,
    },
    Http {
        base_url: String,
        api_key: Option<String>,
        client: reqwest::Client,
    },
}

impl UkHighwaysProvider {
    pub fn from_fixtures(sites_body: &str, reports_body: &str) -> Self {
        Self {
            mode: Mode::Fixture {
                sites_body: sites_body.to_string(),
                reports_body: reports_body.to_string(),
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

    pub fn with_cache_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.cache = TtlCache::new(DEFAULT_TTL_SECS, clock);
        self
    }

    pub fn upstream_calls(&self) -> u32 {
        match &self.mode {
            Mode::Fixture { calls, .. } => calls.load(Ordering::SeqCst),
            Mode::Http { .. } => 0,
        }
    }

    /// Merge sites and reports by site id into normalized records.
    fn merge(road: &str, sites: SitesPage, reports: ReportsPage) -> Vec<NormalizedTrafficRecord> {
        let by_site: HashMap<String, &Report> = reports
            .reports
            .iter()
            .filter_map(|r| r.site_id.clone().map(|id| (id, r)))
            .collect();

        let mut out = Vec::new();
        for site in &sites.sites {
            let Some(id) = site.id.as_deref() else {
                continue;
            };
            let name = site.name.as_deref().unwrap_or_default();
            let typical = site.typical_speed_mph.unwrap_or(60.0).max(0.0);
            let length = site.length_miles.unwrap_or(0.0).max(0.0);

            // No report for a discovered site: keep it with zero flow/speed.
            let (speed, _flow) = match by_site.get(id) {
                Some(r) => (r.speed_mph.unwrap_or(0.0).max(0.0), r.flow.unwrap_or(0.0)),
                None => (0.0, 0.0),
            };

            let free_flow = if typical > 0.0 {
                length / typical * 60.0
            } else {
                0.0
            };
            let travel = if speed > 0.0 {
                length / speed * 60.0
            } else {
                free_flow
            };
            let delay = NormalizedTrafficRecord::derive_delay(travel, free_flow);

            let location = Location {
                lat: site.lat,
                lon: site.lon,
                from: (!name.is_empty()).then(|| name.to_string()),
                to: None,
            };

            out.push(NormalizedTrafficRecord {
                source: TrafficSource::UkHighways,
                road: road.to_string(),
                direction: Direction::from_text(name),
                location: (!location.is_empty()).then_some(location),
                travel_time_minutes: travel,
                free_flow_time_minutes: free_flow,
                delay_minutes: delay,
                congestion_level: congestion_from_speed(speed, typical),
                timestamp: Utc::now(),
            });
        }
        out
    }

    async fn fetch_raw(&self, road: &str) -> Result<Vec<NormalizedTrafficRecord>> {
        let t0 = std::time::Instant::now();

        let (sites, reports): (SitesPage, ReportsPage) = match &self.mode {
            Mode::Fixture {
                sites_body,
                reports_body,
                calls,
            } => {
                calls.fetch_add(1, Ordering::SeqCst);
                (
                    serde_json::from_str(sites_body).context("parsing uk-highways sites json")?,
                    serde_json::from_str(reports_body)
                        .context("parsing uk-highways reports json")?,
                )
            }
            Mode::Http {
                base_url,
                api_key,
                client,
            } => {
                let authed = |req: reqwest::RequestBuilder| match api_key {
                    Some(key) => req.header("x-api-key", key),
                    None => req,
                };

                // Step 1: discover sites for the road.
                let sites_url = format!("{base_url}/sites?road={road}");
                let resp = authed(client.get(&sites_url))
                    .send()
                    .await
                    .context("uk-highways sites get")?
                    .error_for_status()
                    .context("uk-highways sites non-2xx")?;
                let sites: SitesPage = resp.json().await.context("uk-highways sites json")?;

                // Step 2: current reports for the discovered site ids.
                let ids: Vec<&str> = sites
                    .sites
                    .iter()
                    .filter_map(|s| s.id.as_deref())
                    .collect();
                let reports = if ids.is_empty() {
                    ReportsPage {
                        reports: Vec::new(),
                    }
                } else {
                    let reports_url = format!("{base_url}/reports?sites={}", ids.join(","));
                    let resp = authed(client.get(&reports_url))
                        .send()
                        .await
                        .context("uk-highways reports get")?
                        .error_for_status()
                        .context("uk-highways reports non-2xx")?;
                    resp.json().await.context("uk-highways reports json")?
                };
                (sites, reports)
            }
        };

        let out = Self::merge(road, sites, reports);
        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("provider_fetch_ms", "provider" => "uk-highways").record(ms);
        Ok(out)
    }
}

#[async_trait]
impl TrafficProvider for UkHighwaysProvider {
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
        matches!(country, Country::All | Country::Uk) && providers::is_uk_road(road)
    }

    fn name(&self) -> &'static str {
        "uk-highways"
    }

    fn source(&self) -> TrafficSource {
        TrafficSource::UkHighways
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

    const SITES: &str = r#"{
        "sites": [
            {"id": "S1", "name": "M6 northbound J10-J11", "lat": 52.58, "lon": -2.03,
             "lengthMiles": 5.0, "typicalSpeedMph": 60.0},
            {"id": "S2", "name": "M6 southbound J11-J10", "lat": 52.60, "lon": -2.04,
             "lengthMiles": 5.0, "typicalSpeedMph": 60.0}
        ]
    }"#;

    const REPORTS: &str = r#"{
        "reports": [
            {"siteId": "S1", "speedMph": 30.0, "flow": 420.0}
        ]
    }"#;

    #[test]
    fn speed_thresholds() {
        assert_eq!(congestion_from_speed(65.0, 70.0), CongestionLevel::None);
        assert_eq!(congestion_from_speed(50.0, 70.0), CongestionLevel::Light);
        assert_eq!(congestion_from_speed(35.0, 70.0), CongestionLevel::Moderate);
        assert_eq!(congestion_from_speed(15.0, 70.0), CongestionLevel::Heavy);
        // Absolute floors fire even with a low typical speed.
        assert_eq!(congestion_from_speed(19.0, 20.0), CongestionLevel::Heavy);
        assert_eq!(congestion_from_speed(39.0, 40.0), CongestionLevel::Moderate);
    }

    #[tokio::test]
    async fn merges_sites_with_reports_by_id() {
        let p = UkHighwaysProvider::from_fixtures(SITES, REPORTS);
        let out = p.fetch(&RoadQuery::new("M6", Country::Uk, None)).await;
        assert!(out.error.is_none());
        assert_eq!(out.data.len(), 2);

        let reported = out
            .data
            .iter()
            .find(|r| r.direction == Direction::Northbound)
            .expect("reported site present");
        assert_eq!(reported.congestion_level, CongestionLevel::Moderate);
        assert!(reported.delay_minutes > 0.0);
    }

    #[tokio::test]
    async fn silent_site_yields_zero_speed_record() {
        let p = UkHighwaysProvider::from_fixtures(SITES, REPORTS);
        let out = p.fetch(&RoadQuery::new("M6", Country::Uk, None)).await;

        let silent = out
            .data
            .iter()
            .find(|r| r.direction == Direction::Southbound)
            .expect("silent site kept");
        // Zero speed classifies heavy under the absolute floor, and the
        // travel time falls back to free flow (no delay signal).
        assert_eq!(silent.congestion_level, CongestionLevel::Heavy);
        assert_eq!(silent.delay_minutes, 0.0);
    }

    #[test]
    fn applicability_respects_country_filter() {
        let p = UkHighwaysProvider::from_fixtures("{}", "{}");
        assert!(p.is_applicable("M1", Country::All));
        assert!(p.is_applicable("A14", Country::Uk));
        assert!(!p.is_applicable("M1", Country::Ie));
        assert!(!p.is_applicable("N7", Country::Uk));
    }
}

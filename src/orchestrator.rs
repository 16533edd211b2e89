//! # Fallback Orchestrator
//! Decides which adapters to try for a road/country/town query, in what
//! order, and whether to resort to the commercial routing fallback; merges
//! the results and keeps a per-request diagnostic trace.
//!
//! Pure policy apart from the adapter calls themselves; never raises for
//! downstream failures. Every adapter error becomes an `errors[]` entry and
//! a trace line, and the caller always gets a `Resolution`, even when `data`
//! ends up empty.

use std::collections::BTreeMap;
use std::sync::Arc;

use metrics::counter;
use serde::Serialize;

use crate::cache::CacheStats;
use crate::model::{Country, FetchTrace, NormalizedTrafficRecord, RoadQuery};
use crate::providers::commercial::RoutingFallback;
use crate::providers::{self, TrafficProvider};

/// What the orchestrator returns for every query, successful or degraded.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub data: Vec<NormalizedTrafficRecord>,
    pub sources_used: Vec<String>,
    pub fallback_used: bool,
    pub errors: Vec<String>,
    pub trace: FetchTrace,
}

pub struct Orchestrator {
    /// Jurisdiction feeds in fixed priority order (free before paid is the
    /// cost-minimization property; order within the vec is the tie-break).
    providers: Vec<Arc<dyn TrafficProvider>>,
    fallback: Arc<dyn RoutingFallback>,
}

impl Orchestrator {
    pub fn new(providers: Vec<Arc<dyn TrafficProvider>>, fallback: Arc<dyn RoutingFallback>) -> Self {
        Self {
            providers,
            fallback,
        }
    }

    /// Resolve a query against the fallback chain.
    pub async fn resolve(&self, road: &str, country: Country, town: Option<&str>) -> Resolution {
        counter!("orchestrator_resolves_total").increment(1);

        let query = RoadQuery::new(road, country, town);
        let mut res = Resolution::default();

        let is_local_street = query.town.is_some() && !providers::is_designation(&query.road);
        res.trace.push(
            format!("classify road '{}'", query.road),
            if is_local_street {
                "local street"
            } else {
                "designation"
            },
        );

        // 1) Jurisdiction feeds, in priority order. A tried-but-empty source
        //    still counts as tried for fallback-trigger purposes.
        for provider in &self.providers {
            if !provider.is_applicable(&query.road, query.country) {
                res.trace.push(
                    format!("check {}", provider.name()),
                    "not applicable",
                );
                continue;
            }

            let outcome = provider.fetch(&query).await;
            res.sources_used.push(provider.name().to_string());

            match &outcome.error {
                Some(e) => {
                    res.trace
                        .push_error(format!("fetch {}", provider.name()), "failed", e.clone());
                    res.errors.push(e.clone());
                }
                None => {
                    res.trace.push(
                        format!("fetch {}", provider.name()),
                        providers::outcome_summary(&outcome),
                    );
                }
            }
            res.data.extend(outcome.data);
        }

        // 2) Commercial trigger: no free data, a local street, or the
        //    street-name heuristic.
        let trigger = res.data.is_empty()
            || is_local_street
            || providers::looks_like_street_name(&query.road);
        if !trigger {
            res.trace.push("commercial fallback", "not needed");
            return res;
        }

        counter!("orchestrator_fallback_total").increment(1);
        res.fallback_used = true;
        res.sources_used.push(self.fallback.name().to_string());

        let (origin, destination) = primary_endpoints(&query);
        let outcome = self.fallback.fetch_route(&origin, &destination).await;
        match &outcome.error {
            Some(e) => {
                res.trace
                    .push_error(format!("route {origin} -> {destination}"), "failed", e.clone());
                res.errors.push(e.clone());
            }
            None => res.trace.push(
                format!("route {origin} -> {destination}"),
                providers::outcome_summary(&outcome),
            ),
        }

        if outcome.data.is_empty() {
            // One retry with alternative phrasing before giving up.
            let (origin, destination) = retry_endpoints(&query);
            let retry = self.fallback.fetch_route(&origin, &destination).await;
            match &retry.error {
                Some(e) => {
                    res.trace.push_error(
                        format!("route retry {origin} -> {destination}"),
                        "failed",
                        e.clone(),
                    );
                    res.errors.push(e.clone());
                }
                None => res.trace.push(
                    format!("route retry {origin} -> {destination}"),
                    providers::outcome_summary(&retry),
                ),
            }
            res.data.extend(retry.data);
        } else {
            res.data.extend(outcome.data);
        }

        res
    }

    /// Per-component cache snapshots, keyed by provider name.
    pub fn cache_stats(&self) -> BTreeMap<String, CacheStats> {
        let mut out = BTreeMap::new();
        for p in &self.providers {
            out.insert(p.name().to_string(), p.cache_stats());
        }
        out.insert(self.fallback.name().to_string(), self.fallback.cache_stats());
        out
    }

    /// Clear every adapter cache. Safe alongside in-flight fetches: those
    /// complete with whatever cache state they already captured.
    pub fn clear_caches(&self) {
        for p in &self.providers {
            p.clear_cache();
        }
        self.fallback.clear_cache();
    }
}

/// Best-effort origin/destination from road + town + country.
fn primary_endpoints(query: &RoadQuery) -> (String, String) {
    let mut origin = query.road.clone();
    if let Some(town) = &query.town {
        origin.push_str(", ");
        origin.push_str(town);
    }
    if query.country != Country::All {
        origin.push_str(", ");
        origin.push_str(query.country.as_str());
    }
    let destination = match &query.town {
        Some(town) => format!("end of {}, {}", query.road, town),
        None => format!("end of {}", query.road),
    };
    (origin, destination)
}

/// Alternative "near X" phrasing used for the single retry.
fn retry_endpoints(query: &RoadQuery) -> (String, String) {
    let anchor = query.town.clone().unwrap_or_else(|| query.road.clone());
    (format!("near {}, {}", query.road, anchor), anchor)
}

// src/providers/mod.rs
pub mod commercial;
pub mod national_roads;
pub mod uk_highways;

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::cache::CacheStats;
use crate::model::{Country, FetchOutcome, RoadQuery, TrafficSource};

/// A normalization boundary over one external traffic feed.
///
/// `fetch` never fails at the type level: transport and parse problems become
/// an `error` string on the outcome so the orchestrator treats "no data"
/// uniformly regardless of cause.
#[async_trait::async_trait]
pub trait TrafficProvider: Send + Sync {
    async fn fetch(&self, query: &RoadQuery) -> FetchOutcome;

    /// Road-ownership heuristic: does this adapter plausibly cover the road,
    /// given the country filter?
    fn is_applicable(&self, road: &str, country: Country) -> bool;

    fn name(&self) -> &'static str;
    fn source(&self) -> TrafficSource;

    fn cache_stats(&self) -> CacheStats;
    fn clear_cache(&self);
}

/// Outbound timeout applied to every provider HTTP round trip.
pub(crate) const PROVIDER_TIMEOUT_SECS: u64 = 10;

pub(crate) fn provider_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("roadwatch/0.1")
        .connect_timeout(std::time::Duration::from_secs(4))
        .timeout(std::time::Duration::from_secs(PROVIDER_TIMEOUT_SECS))
        .build()
        .expect("reqwest client")
}

fn re_designation() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^(?:M\d+[A-Z]?|N\d+|A\d+[A-Z]?)$").unwrap())
}

/// True when the road string looks like a formal designation (M/N/A plus
/// digits) rather than a named local street.
pub fn is_designation(road: &str) -> bool {
    re_designation().is_match(road.trim().to_ascii_uppercase().as_str())
}

fn re_ie_road() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^(?:M\d+|N\d+)$").unwrap())
}

/// Irish national-roads ownership: motorways and national routes.
pub fn is_ie_road(road: &str) -> bool {
    re_ie_road().is_match(road.trim().to_ascii_uppercase().as_str())
}

fn re_uk_road() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^(?:M\d+[A-Z]?|A\d+[A-Z]?)$").unwrap())
}

/// UK highways ownership: motorways and A-roads.
///
/// Bare motorway numbers (M1, M2, ...) collide with Irish naming; the
/// heuristic deliberately does NOT resolve that here. The `country` query
/// parameter is the only disambiguator, so `country=ALL` tries both feeds.
pub fn is_uk_road(road: &str) -> bool {
    re_uk_road().is_match(road.trim().to_ascii_uppercase().as_str())
}

fn re_street_name() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(street|road|avenue|lane|quay|bridge)\b").unwrap())
}

/// "Prefer commercial" heuristic over road names: named local streets are
/// outside both free feeds.
pub fn looks_like_street_name(road: &str) -> bool {
    re_street_name().is_match(road)
}

/// Shared helper for the orchestrator's trace lines.
pub(crate) fn outcome_summary(outcome: &FetchOutcome) -> String {
    match (&outcome.error, outcome.from_cache) {
        (Some(e), _) => format!("error: {e}"),
        (None, true) => format!("{} records (cache)", outcome.data.len()),
        (None, false) => format!("{} records", outcome.data.len()),
    }
}

//! # Canonical Traffic Model
//! Shared record schema every provider adapter normalizes into, plus the
//! fetch-outcome and trace types the orchestrator passes around.
//!
//! Nothing downstream of an adapter ever sees a provider's native payload
//! shape; this module is the only vocabulary they share.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of the provider that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrafficSource {
    NationalRoads,
    UkHighways,
    CommercialFallback,
}

impl TrafficSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficSource::NationalRoads => "national-roads",
            TrafficSource::UkHighways => "uk-highways",
            TrafficSource::CommercialFallback => "commercial-fallback",
        }
    }
}

/// Travel direction as reported (or inferred) for a road segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Northbound,
    Southbound,
    Eastbound,
    Westbound,
    #[default]
    Unknown,
}

impl Direction {
    /// Best-effort keyword detection, used both by adapters parsing site
    /// names and by the enrichment fallback extractor.
    pub fn from_text(text: &str) -> Self {
        let t = text.to_ascii_lowercase();
        if t.contains("northbound") || t.contains("north") {
            Direction::Northbound
        } else if t.contains("southbound") || t.contains("south") {
            Direction::Southbound
        } else if t.contains("eastbound") || t.contains("east") {
            Direction::Eastbound
        } else if t.contains("westbound") || t.contains("west") {
            Direction::Westbound
        } else {
            Direction::Unknown
        }
    }
}

/// Ordinal congestion classification. `Ord` follows declaration order:
/// `None < Light < Moderate < Heavy`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum CongestionLevel {
    #[default]
    None,
    Light,
    Moderate,
    Heavy,
}

impl CongestionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CongestionLevel::None => "none",
            CongestionLevel::Light => "light",
            CongestionLevel::Moderate => "moderate",
            CongestionLevel::Heavy => "heavy",
        }
    }
}

/// Optional coordinates and/or named endpoints for a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl Location {
    pub fn is_empty(&self) -> bool {
        self.lat.is_none() && self.lon.is_none() && self.from.is_none() && self.to.is_none()
    }
}

/// The canonical unit of output for the whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedTrafficRecord {
    pub source: TrafficSource,
    /// Road designation, case-normalized (uppercased).
    pub road: String,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub travel_time_minutes: f64,
    pub free_flow_time_minutes: f64,
    /// Always `>= 0`; derived as `max(0, travel - free_flow)` when the
    /// provider does not supply it directly.
    pub delay_minutes: f64,
    pub congestion_level: CongestionLevel,
    pub timestamp: DateTime<Utc>,
}

impl NormalizedTrafficRecord {
    /// Derived delay clamped at zero.
    pub fn derive_delay(travel_time_minutes: f64, free_flow_time_minutes: f64) -> f64 {
        (travel_time_minutes - free_flow_time_minutes).max(0.0)
    }
}

/// Country filter accepted by the traffic endpoint and the applicability
/// predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Country {
    #[default]
    All,
    Ie,
    Uk,
}

impl Country {
    /// Lenient parse; anything unrecognized falls back to `All`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "IE" | "IRELAND" => Country::Ie,
            "UK" | "GB" => Country::Uk,
            _ => Country::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Country::All => "ALL",
            Country::Ie => "IE",
            Country::Uk => "UK",
        }
    }
}

/// A road/country/town query as the orchestrator sees it (road already
/// uppercased).
#[derive(Debug, Clone, PartialEq)]
pub struct RoadQuery {
    pub road: String,
    pub country: Country,
    pub town: Option<String>,
}

impl RoadQuery {
    pub fn new(road: &str, country: Country, town: Option<&str>) -> Self {
        Self {
            road: road.trim().to_ascii_uppercase(),
            country,
            town: town
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        }
    }
}

/// Result of one adapter fetch. Ordinary failures (timeout, non-2xx,
/// malformed payload) land in `error` with empty `data`; the call itself
/// never fails.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOutcome {
    pub data: Vec<NormalizedTrafficRecord>,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchOutcome {
    pub fn hit(data: Vec<NormalizedTrafficRecord>) -> Self {
        Self {
            data,
            from_cache: true,
            error: None,
        }
    }

    pub fn fresh(data: Vec<NormalizedTrafficRecord>) -> Self {
        Self {
            data,
            from_cache: false,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            data: Vec::new(),
            from_cache: false,
            error: Some(error.into()),
        }
    }
}

/// One step of the orchestrator's per-request diagnostic trace.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    pub step: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ordered trace of what the orchestrator tried, created fresh per request
/// and discarded after the response is sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchTrace(pub Vec<TraceStep>);

impl FetchTrace {
    pub fn push(&mut self, step: impl Into<String>, outcome: impl Into<String>) {
        self.0.push(TraceStep {
            step: step.into(),
            outcome: outcome.into(),
            error: None,
        });
    }

    pub fn push_error(
        &mut self,
        step: impl Into<String>,
        outcome: impl Into<String>,
        error: impl Into<String>,
    ) {
        self.0.push(TraceStep {
            step: step.into(),
            outcome: outcome.into(),
            error: Some(error.into()),
        });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn congestion_levels_are_ordered() {
        assert!(CongestionLevel::None < CongestionLevel::Light);
        assert!(CongestionLevel::Light < CongestionLevel::Moderate);
        assert!(CongestionLevel::Moderate < CongestionLevel::Heavy);
    }

    #[test]
    fn derived_delay_never_negative() {
        assert_eq!(NormalizedTrafficRecord::derive_delay(28.0, 22.0), 6.0);
        assert_eq!(NormalizedTrafficRecord::derive_delay(20.0, 22.0), 0.0);
    }

    #[test]
    fn query_normalizes_road_and_blank_town() {
        let q = RoadQuery::new(" m1 ", Country::Ie, Some("  "));
        assert_eq!(q.road, "M1");
        assert!(q.town.is_none());
    }

    #[test]
    fn country_parse_is_lenient() {
        assert_eq!(Country::parse("ie"), Country::Ie);
        assert_eq!(Country::parse("GB"), Country::Uk);
        assert_eq!(Country::parse("whatever"), Country::All);
    }

    #[test]
    fn direction_from_text_keywords() {
        assert_eq!(Direction::from_text("M1 Northbound J4-J5"), Direction::Northbound);
        assert_eq!(Direction::from_text("southbound carriageway"), Direction::Southbound);
        assert_eq!(Direction::from_text("no hint here"), Direction::Unknown);
    }

    #[test]
    fn source_serializes_kebab_case() {
        let s = serde_json::to_string(&TrafficSource::NationalRoads).unwrap();
        assert_eq!(s, "\"national-roads\"");
    }
}

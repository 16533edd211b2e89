//! # Junction Segment Report
//! Decomposes the fixed M1 Dublin–Belfast corridor into ordered sub-segments,
//! queries the orchestrator per segment, and aggregates delay, congestion,
//! and a recommendation.
//!
//! Pure aggregation logic lives in free functions so the threshold ladder is
//! unit-testable without any I/O.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::CongestionLevel;
use crate::orchestrator::Orchestrator;
use crate::providers::national_roads::congestion_from_delay;

/// One hand-authored sub-span of the corridor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSegment {
    pub name: &'static str,
    pub query_town: &'static str,
    pub normal_time_minutes: f64,
    pub order: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteDirection {
    Southbound,
    Northbound,
}

impl RouteDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "southbound" => Some(RouteDirection::Southbound),
            "northbound" => Some(RouteDirection::Northbound),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteDirection::Southbound => "southbound",
            RouteDirection::Northbound => "northbound",
        }
    }
}

/// Per-segment classification. `Unknown` means "no signal" (a transport
/// error), which is deliberately distinct from `Clear` ("no congestion").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStatus {
    Unknown,
    Clear,
    Light,
    Moderate,
    Heavy,
}

impl From<CongestionLevel> for SegmentStatus {
    fn from(level: CongestionLevel) -> Self {
        match level {
            CongestionLevel::None => SegmentStatus::Clear,
            CongestionLevel::Light => SegmentStatus::Light,
            CongestionLevel::Moderate => SegmentStatus::Moderate,
            CongestionLevel::Heavy => SegmentStatus::Heavy,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentReport {
    pub name: &'static str,
    pub normal_time_minutes: f64,
    pub current_time_minutes: f64,
    pub delay_minutes: f64,
    pub status: SegmentStatus,
}

/// Recommendation tiers selected by a strict threshold ladder on total delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Clear,
    Minor,
    Significant,
    Major,
}

/// The ladder: `>=15` major, `>=10` significant, `>=5` minor, else clear.
pub fn recommend(total_delay_minutes: f64) -> Recommendation {
    if total_delay_minutes >= 15.0 {
        Recommendation::Major
    } else if total_delay_minutes >= 10.0 {
        Recommendation::Significant
    } else if total_delay_minutes >= 5.0 {
        Recommendation::Minor
    } else {
        Recommendation::Clear
    }
}

fn recommendation_message(
    tier: Recommendation,
    total_delay: f64,
    worst_segment: Option<&str>,
) -> String {
    match tier {
        Recommendation::Major => format!(
            "Major delays of {total_delay:.0} min on the corridor. Consider the N2/A1 inland route instead."
        ),
        Recommendation::Significant => format!(
            "Significant delays of {total_delay:.0} min, worst around {}.",
            worst_segment.unwrap_or("the corridor")
        ),
        Recommendation::Minor => format!("Minor delays of {total_delay:.0} min; no action needed."),
        Recommendation::Clear => "Corridor is clear.".to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JunctionReport {
    pub direction: RouteDirection,
    pub segments: Vec<SegmentReport>,
    pub total_normal_minutes: f64,
    pub total_current_minutes: f64,
    pub total_delay_minutes: f64,
    pub worst_segment: Option<&'static str>,
    pub recommendation: Recommendation,
    pub message: String,
    pub generated_at: DateTime<Utc>,
}

impl JunctionReport {
    /// Render the report for the messaging sink.
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "M1 corridor report ({}) — total delay {:.0} min\n",
            self.direction.as_str(),
            self.total_delay_minutes
        );
        for seg in &self.segments {
            out.push_str(&format!(
                "  {}: {:.0} min (normal {:.0}, delay {:.0}) [{:?}]\n",
                seg.name,
                seg.current_time_minutes,
                seg.normal_time_minutes,
                seg.delay_minutes,
                seg.status
            ));
        }
        out.push_str(&self.message);
        out
    }
}

/// Aggregate per-segment figures into the report. Pure; ties on worst
/// segment go to the first occurrence.
pub fn aggregate(direction: RouteDirection, segments: Vec<SegmentReport>) -> JunctionReport {
    let total_normal: f64 = segments.iter().map(|s| s.normal_time_minutes).sum();
    let total_current: f64 = segments.iter().map(|s| s.current_time_minutes).sum();
    let total_delay = total_current - total_normal;

    let mut worst: Option<(&'static str, f64)> = None;
    for seg in &segments {
        let is_worse = worst.map(|(_, d)| seg.delay_minutes > d).unwrap_or(true);
        if is_worse {
            worst = Some((seg.name, seg.delay_minutes));
        }
    }
    let worst_segment = worst.map(|(name, _)| name);

    let recommendation = recommend(total_delay);
    let message = recommendation_message(recommendation, total_delay, worst_segment);

    JunctionReport {
        direction,
        segments,
        total_normal_minutes: total_normal,
        total_current_minutes: total_current,
        total_delay_minutes: total_delay,
        worst_segment,
        recommendation,
        message,
        generated_at: Utc::now(),
    }
}

/// Southbound corridor, Belfast side first. Baselines are hand-calibrated
/// free-flow minutes.
const SOUTHBOUND: &[RouteSegment] = &[
    RouteSegment {
        name: "Newry to Dundalk",
        query_town: "Dundalk",
        normal_time_minutes: 16.0,
        order: 0,
    },
    RouteSegment {
        name: "Dundalk to Castlebellingham",
        query_town: "Castlebellingham",
        normal_time_minutes: 8.0,
        order: 1,
    },
    RouteSegment {
        name: "Castlebellingham to Drogheda",
        query_town: "Drogheda",
        normal_time_minutes: 12.0,
        order: 2,
    },
    RouteSegment {
        name: "Drogheda to Balbriggan",
        query_town: "Balbriggan",
        normal_time_minutes: 9.0,
        order: 3,
    },
    RouteSegment {
        name: "Balbriggan to Swords",
        query_town: "Swords",
        normal_time_minutes: 10.0,
        order: 4,
    },
    RouteSegment {
        name: "Swords to Dublin Airport",
        query_town: "Dublin Airport",
        normal_time_minutes: 5.0,
        order: 5,
    },
];

/// Northbound corridor, Dublin side first.
const NORTHBOUND: &[RouteSegment] = &[
    RouteSegment {
        name: "Dublin Airport to Swords",
        query_town: "Swords",
        normal_time_minutes: 5.0,
        order: 0,
    },
    RouteSegment {
        name: "Swords to Balbriggan",
        query_town: "Balbriggan",
        normal_time_minutes: 10.0,
        order: 1,
    },
    RouteSegment {
        name: "Balbriggan to Drogheda",
        query_town: "Drogheda",
        normal_time_minutes: 9.0,
        order: 2,
    },
    RouteSegment {
        name: "Drogheda to Castlebellingham",
        query_town: "Castlebellingham",
        normal_time_minutes: 12.0,
        order: 3,
    },
    RouteSegment {
        name: "Castlebellingham to Dundalk",
        query_town: "Dundalk",
        normal_time_minutes: 8.0,
        order: 4,
    },
    RouteSegment {
        name: "Dundalk to Newry",
        query_town: "Newry",
        normal_time_minutes: 16.0,
        order: 5,
    },
];

/// Road queried for every corridor segment.
const CORRIDOR_ROAD: &str = "M1";

pub struct ReportBuilder {
    orchestrator: Arc<Orchestrator>,
    /// Self-imposed pause between segment queries, to rate-limit upstream.
    pause: Duration,
}

impl ReportBuilder {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            pause: Duration::from_millis(250),
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn segments(direction: RouteDirection) -> &'static [RouteSegment] {
        match direction {
            RouteDirection::Southbound => SOUTHBOUND,
            RouteDirection::Northbound => NORTHBOUND,
        }
    }

    /// Build the report, querying segments sequentially in route order.
    pub async fn build_report(&self, direction: RouteDirection) -> JunctionReport {
        let mut segments = Vec::new();

        for (i, seg) in Self::segments(direction).iter().enumerate() {
            if i > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }

            let res = self
                .orchestrator
                .resolve(CORRIDOR_ROAD, crate::model::Country::All, Some(seg.query_town))
                .await;

            if res.data.is_empty() && !res.errors.is_empty() {
                // No signal, not "clear": the caller must be able to tell
                // the difference.
                segments.push(SegmentReport {
                    name: seg.name,
                    normal_time_minutes: seg.normal_time_minutes,
                    current_time_minutes: seg.normal_time_minutes,
                    delay_minutes: 0.0,
                    status: SegmentStatus::Unknown,
                });
                continue;
            }

            // First record exposing a travel-time figure wins. The feed's
            // travel time spans whatever the source reports, not necessarily
            // this sub-segment, so the delay is the portable signal and the
            // current time is derived from the segment baseline.
            let delay = res
                .data
                .iter()
                .find(|r| r.travel_time_minutes > 0.0)
                .map(|r| r.delay_minutes.max(0.0))
                .unwrap_or(0.0);

            segments.push(SegmentReport {
                name: seg.name,
                normal_time_minutes: seg.normal_time_minutes,
                current_time_minutes: seg.normal_time_minutes + delay,
                delay_minutes: delay,
                status: congestion_from_delay(delay).into(),
            });
        }

        aggregate(direction, segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(name: &'static str, normal: f64, current: f64) -> SegmentReport {
        let delay = (current - normal).max(0.0);
        SegmentReport {
            name,
            normal_time_minutes: normal,
            current_time_minutes: current,
            delay_minutes: delay,
            status: congestion_from_delay(delay).into(),
        }
    }

    #[test]
    fn recommendation_ladder_tiers() {
        assert_eq!(recommend(3.0), Recommendation::Clear);
        assert_eq!(recommend(7.0), Recommendation::Minor);
        assert_eq!(recommend(12.0), Recommendation::Significant);
        assert_eq!(recommend(20.0), Recommendation::Major);
        // Exact boundaries are inclusive.
        assert_eq!(recommend(5.0), Recommendation::Minor);
        assert_eq!(recommend(10.0), Recommendation::Significant);
        assert_eq!(recommend(15.0), Recommendation::Major);
    }

    #[test]
    fn aggregate_sums_and_picks_worst() {
        let report = aggregate(
            RouteDirection::Southbound,
            vec![
                seg("A", 10.0, 13.0),
                seg("B", 10.0, 16.0),
                seg("C", 10.0, 16.0), // tie with B; B wins as first
            ],
        );
        assert_eq!(report.total_normal_minutes, 30.0);
        assert_eq!(report.total_current_minutes, 45.0);
        assert_eq!(report.total_delay_minutes, 15.0);
        assert_eq!(report.worst_segment, Some("B"));
        assert_eq!(report.recommendation, Recommendation::Major);
    }

    #[test]
    fn significant_message_names_worst_segment() {
        let report = aggregate(
            RouteDirection::Northbound,
            vec![seg("A", 10.0, 21.0), seg("B", 10.0, 10.0)],
        );
        assert_eq!(report.recommendation, Recommendation::Significant);
        assert!(report.message.contains("A"));
    }

    #[test]
    fn clear_report_renders_all_segments() {
        let report = aggregate(
            RouteDirection::Southbound,
            vec![seg("A", 10.0, 10.0), seg("B", 5.0, 5.0)],
        );
        let text = report.render_text();
        assert!(text.contains("southbound"));
        assert!(text.contains("A:"));
        assert!(text.contains("Corridor is clear."));
    }

    #[test]
    fn corridor_tables_are_ordered_mirrors() {
        let sb = ReportBuilder::segments(RouteDirection::Southbound);
        let nb = ReportBuilder::segments(RouteDirection::Northbound);
        assert_eq!(sb.len(), nb.len());
        for (i, s) in sb.iter().enumerate() {
            assert_eq!(s.order, i);
        }
        let sb_total: f64 = sb.iter().map(|s| s.normal_time_minutes).sum();
        let nb_total: f64 = nb.iter().map(|s| s.normal_time_minutes).sum();
        assert_eq!(sb_total, nb_total);
    }
}

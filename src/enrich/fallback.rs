//! Deterministic local extractor used when the enrichment backend is
//! unavailable or its response cannot be parsed.
//!
//! Pattern-matches road codes, direction keywords, congestion keywords,
//! incident keywords, and speeds with units. Coordinate-bearing input is
//! resolved to the nearest known landmark, but only within a distance
//! cutoff; beyond it the location stays unknown rather than guessed.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Deserialize;
use std::{fs, path::Path};

use super::EnrichedSegment;

fn default_cutoff_km() -> f64 {
    30.0
}

/// A named point used for nearest-landmark resolution.
#[derive(Debug, Clone, Deserialize)]
pub struct Landmark {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Small table of known landmarks, loadable from JSON with a built-in seed.
#[derive(Debug, Clone, Deserialize)]
pub struct LandmarkTable {
    /// No match beyond this straight-line distance; location stays unknown.
    #[serde(default = "default_cutoff_km")]
    pub max_distance_km: f64,
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
}

impl LandmarkTable {
    /// Load from a JSON file, falling back to `default_seed()` on any error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|_| Self::default_seed()),
            Err(_) => Self::default_seed(),
        }
    }

    /// Built-in seed covering the Dublin–Belfast M1 corridor.
    pub fn default_seed() -> Self {
        let landmarks = [
            ("Dublin Port Tunnel", 53.3643, -6.2229),
            ("Dublin Airport", 53.4264, -6.2499),
            ("Swords", 53.4597, -6.2181),
            ("Balbriggan", 53.6083, -6.1819),
            ("Drogheda", 53.7179, -6.3561),
            ("Dundalk", 54.0018, -6.4052),
            ("Newry", 54.1751, -6.3402),
            ("Belfast", 54.5973, -5.9301),
        ]
        .into_iter()
        .map(|(name, lat, lon)| Landmark {
            name: name.to_string(),
            lat,
            lon,
        })
        .collect();

        Self {
            max_distance_km: default_cutoff_km(),
            landmarks,
        }
    }

    /// Nearest landmark within the cutoff, or `None`.
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        for lm in &self.landmarks {
            let d = haversine_km(lat, lon, lm.lat, lm.lon);
            if best.map(|(_, bd)| d < bd).unwrap_or(true) {
                best = Some((lm.name.as_str(), d));
            }
        }
        best.and_then(|(name, d)| (d <= self.max_distance_km).then_some(name))
    }
}

/// Great-circle distance in kilometres.
fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const R: f64 = 6371.0;
    let (la1, la2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + la1.cos() * la2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * R * a.sqrt().atan2((1.0 - a).sqrt())
}

fn re_road() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\b([MNAmna]\d+[A-Za-z]?)\b").unwrap())
}

fn re_direction() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(northbound|southbound|eastbound|westbound)\b").unwrap())
}

fn re_congestion() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(stationary|gridlock|heavy|severe|moderate|slow|light|queueing|congest\w*)\b")
            .unwrap()
    })
}

fn re_incident() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(accident|collision|breakdown|broken[- ]down|roadworks|debris|closure|closed|spillage|incident)\b")
            .unwrap()
    })
}

fn re_speed() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s?(km/?h|kph|mph)\b").unwrap())
}

fn re_segment() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:between\s+.+?\s+and\s+\S+|J\d+\s*(?:-|–|to)\s*J\d+)").unwrap()
    })
}

fn re_coords() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(-?\d{1,3}\.\d+)\s*,\s*(-?\d{1,3}\.\d+)").unwrap())
}

fn map_congestion(word: &str) -> &'static str {
    match word.to_ascii_lowercase().as_str() {
        "stationary" | "gridlock" | "heavy" | "severe" => "heavy",
        "moderate" | "slow" | "queueing" => "moderate",
        "light" => "light",
        _ => "moderate",
    }
}

/// Best-effort structured extraction from free text. Never fails; whatever
/// cannot be detected is simply left out.
pub fn extract_fallback(input: &str, landmarks: &LandmarkTable) -> EnrichedSegment {
    let mut seg = EnrichedSegment {
        fallback: true,
        raw_extracted: false,
        ..Default::default()
    };

    if let Some(c) = re_road().captures(input) {
        seg.road = Some(c[1].to_ascii_uppercase());
    }
    if let Some(c) = re_direction().captures(input) {
        let mut d = c[1].to_ascii_lowercase();
        if let Some(first) = d.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        seg.direction = Some(d);
    }
    if let Some(c) = re_segment().find(input) {
        seg.segment = Some(c.as_str().trim().to_string());
    }
    if let Some(c) = re_congestion().captures(input) {
        seg.congestion = Some(map_congestion(&c[1]).to_string());
    }
    if let Some(c) = re_incident().captures(input) {
        seg.incident_type = Some(c[1].to_ascii_lowercase());
    }
    if let Some(c) = re_speed().captures(input) {
        seg.speed = Some(format!("{} {}", &c[1], c[2].to_ascii_lowercase()));
    }

    // Coordinates resolve to the nearest landmark within the cutoff only.
    if let Some(c) = re_coords().captures(input) {
        let lat: f64 = c[1].parse().unwrap_or(f64::NAN);
        let lon: f64 = c[2].parse().unwrap_or(f64::NAN);
        if lat.is_finite() && lon.is_finite() {
            seg.landmark = landmarks.nearest(lat, lon).map(str::to_string);
        }
    }

    seg
}

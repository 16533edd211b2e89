//! # Segment Enrichment
//! Turns a raw record or free text into a structured "where/what"
//! description, backed by an LLM call with a deterministic local fallback.
//!
//! The pipeline layers, outermost first: content-hash TTL cache → backend
//! call → tolerant response parsing (fence strip, balanced-object span,
//! per-field regex recovery) → pattern-matching fallback. Every layer
//! degrades instead of failing, so `extract` always returns a structure.

pub mod backend;
pub mod fallback;

use std::sync::Arc;

use metrics::counter;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{CacheStats, Clock, TtlCache, DEFAULT_TTL_SECS};
use backend::EnrichBackend;
use fallback::LandmarkTable;

/// Cadence of the background cache sweep, independent of the entry TTL.
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// Structured result of one extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedSegment {
    pub road: Option<String>,
    pub direction: Option<String>,
    pub segment: Option<String>,
    pub landmark: Option<String>,
    pub congestion: Option<String>,
    pub speed: Option<String>,
    pub incident_type: Option<String>,
    /// True when the deterministic local extractor produced this result.
    pub fallback: bool,
    /// True when the backend's raw response was (at least partially) parsed.
    pub raw_extracted: bool,
    pub summary: String,
}

/// Per-call knobs; both default on.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    pub use_cache: bool,
    pub allow_fallback: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            allow_fallback: true,
        }
    }
}

const FIELDS: [&str; 7] = [
    "road",
    "direction",
    "segment",
    "landmark",
    "congestion",
    "speed",
    "incidentType",
];

pub struct SegmentExtractor {
    backend: Arc<dyn EnrichBackend>,
    cache: TtlCache<EnrichedSegment>,
    landmarks: LandmarkTable,
}

impl SegmentExtractor {
    pub fn new(backend: Arc<dyn EnrichBackend>, landmarks: LandmarkTable) -> Self {
        Self {
            backend,
            cache: TtlCache::with_default_ttl(),
            landmarks,
        }
    }

    /// Replace the cache with one on an injected clock (tests).
    pub fn with_cache_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.cache = TtlCache::new(DEFAULT_TTL_SECS, clock);
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Extract a structured segment description. Never fails: backend
    /// problems degrade to the local fallback (or an empty marker result
    /// when the fallback is disabled by options).
    pub async fn extract(&self, input: &str, opts: ExtractOptions) -> EnrichedSegment {
        counter!("enrich_requests_total").increment(1);

        let key = crate::cache::content_key(input);
        if opts.use_cache {
            if let Some(hit) = self.cache.get(&key) {
                counter!("enrich_cache_hits_total").increment(1);
                return hit;
            }
        }

        let mut seg = match self.try_backend(input).await {
            Some(seg) => seg,
            None => {
                counter!("enrich_fallback_total").increment(1);
                if opts.allow_fallback {
                    fallback::extract_fallback(input, &self.landmarks)
                } else {
                    EnrichedSegment {
                        fallback: true,
                        ..Default::default()
                    }
                }
            }
        };
        seg.summary = summarize(&seg);

        if opts.use_cache {
            self.cache.put(&key, seg.clone());
        }
        seg
    }

    async fn try_backend(&self, input: &str) -> Option<EnrichedSegment> {
        if !self.backend.is_enabled() {
            return None;
        }
        let prompt = build_prompt(input);
        match self.backend.complete(&prompt).await {
            Ok(text) => parse_response(&text),
            Err(e) => {
                tracing::warn!(error = ?e, backend = self.backend.name(), "enrichment backend error");
                None
            }
        }
    }

    /// Fan out one extraction per input concurrently; a failed task degrades
    /// that single slot to an error placeholder while siblings complete.
    /// Output order matches input order.
    pub async fn extract_batch(
        self: &Arc<Self>,
        inputs: &[String],
        opts: ExtractOptions,
    ) -> Vec<EnrichedSegment> {
        let mut handles = Vec::with_capacity(inputs.len());
        for input in inputs {
            let me = Arc::clone(self);
            let input = input.clone();
            handles.push(tokio::spawn(
                async move { me.extract(&input, opts).await },
            ));
        }

        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(seg) => out.push(seg),
                Err(e) => {
                    tracing::warn!(error = ?e, "enrichment batch task failed");
                    out.push(EnrichedSegment {
                        fallback: true,
                        summary: "enrichment failed".to_string(),
                        ..Default::default()
                    });
                }
            }
        }
        out
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn sweep_cache(&self) -> usize {
        self.cache.sweep()
    }
}

/// Prompt instructing the backend to answer with strictly one JSON object.
fn build_prompt(input: &str) -> String {
    format!(
        "Extract road-traffic facts from the report below. Reply with ONLY a \
         JSON object with exactly these fields (use null when unknown): \
         \"road\", \"direction\", \"segment\", \"landmark\", \"congestion\", \
         \"speed\", \"incidentType\".\n\nReport:\n{input}"
    )
}

/// Parse a backend response, tolerating fenced blocks, surrounding prose,
/// and truncated JSON. Returns `None` only when nothing was recoverable.
pub fn parse_response(text: &str) -> Option<EnrichedSegment> {
    let unfenced = strip_code_fence(text);

    if let Some(span) = first_balanced_object(unfenced) {
        if let Ok(value) = serde_json::from_str::<Value>(span) {
            let mut seg = fields_from_value(&value);
            seg.raw_extracted = true;
            return Some(seg);
        }
    }

    // Truncated/partial JSON: recover whatever fields are individually
    // well-formed; accept if at least one came back.
    let seg = recover_fields(unfenced);
    if FIELDS.len() - count_missing(&seg) >= 1 {
        let mut seg = seg;
        seg.raw_extracted = true;
        Some(seg)
    } else {
        None
    }
}

/// Strip a Markdown code fence (with optional language tag) around the body.
fn strip_code_fence(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    // Drop the fence line ("```json" etc.), then the closing fence.
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// First balanced `{...}` span, string-aware so braces inside quoted values
/// do not confuse the depth count.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn opt_string(value: &Value, key: &str) -> Option<String> {
    match value.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

fn fields_from_value(value: &Value) -> EnrichedSegment {
    EnrichedSegment {
        road: opt_string(value, "road"),
        direction: opt_string(value, "direction"),
        segment: opt_string(value, "segment"),
        landmark: opt_string(value, "landmark"),
        congestion: opt_string(value, "congestion"),
        speed: opt_string(value, "speed"),
        incident_type: opt_string(value, "incidentType"),
        ..Default::default()
    }
}

fn field_regex(field: &str) -> Regex {
    // `"field": "value" | null | true | false | number`
    Regex::new(&format!(
        r#""{field}"\s*:\s*(?:"((?:[^"\\]|\\.)*)"|(null)|(true|false)|(-?\d+(?:\.\d+)?))"#
    ))
    .expect("field regex")
}

fn recover_field(text: &str, field: &str) -> Option<String> {
    let re = field_regex(field);
    let caps = re.captures(text)?;
    if caps.get(2).is_some() {
        return None; // explicit null
    }
    if let Some(s) = caps.get(1) {
        let v = s.as_str().trim();
        return (!v.is_empty()).then(|| v.replace("\\\"", "\""));
    }
    caps.get(3)
        .or_else(|| caps.get(4))
        .map(|m| m.as_str().to_string())
}

fn recover_fields(text: &str) -> EnrichedSegment {
    EnrichedSegment {
        road: recover_field(text, "road"),
        direction: recover_field(text, "direction"),
        segment: recover_field(text, "segment"),
        landmark: recover_field(text, "landmark"),
        congestion: recover_field(text, "congestion"),
        speed: recover_field(text, "speed"),
        incident_type: recover_field(text, "incidentType"),
        ..Default::default()
    }
}

fn count_missing(seg: &EnrichedSegment) -> usize {
    [
        &seg.road,
        &seg.direction,
        &seg.segment,
        &seg.landmark,
        &seg.congestion,
        &seg.speed,
        &seg.incident_type,
    ]
    .iter()
    .filter(|f| f.is_none())
    .count()
}

/// Deterministic human-readable summary, fixed field order:
/// road+direction, segment, landmark (parenthesized), congestion
/// (bracketed), speed ("at ..."), incident type.
pub fn summarize(seg: &EnrichedSegment) -> String {
    let mut parts: Vec<String> = Vec::new();

    match (&seg.road, &seg.direction) {
        (Some(r), Some(d)) => parts.push(format!("{r} {d}")),
        (Some(r), None) => parts.push(r.clone()),
        (None, Some(d)) => parts.push(d.clone()),
        (None, None) => {}
    }
    if let Some(s) = &seg.segment {
        parts.push(s.clone());
    }
    if let Some(l) = &seg.landmark {
        parts.push(format!("({l})"));
    }
    if let Some(c) = &seg.congestion {
        parts.push(format!("[{c}]"));
    }
    if let Some(s) = &seg.speed {
        parts.push(format!("at {s}"));
    }
    if let Some(i) = &seg.incident_type {
        parts.push(i.clone());
    }

    parts.join(" ")
}

// src/config.rs
//! Environment-provided configuration. All values arrive as opaque strings;
//! nothing here validates remote credentials.

use std::env;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Irish national-roads feed.
    pub national_roads_url: String,
    pub national_roads_key: Option<String>,
    /// UK highways feed.
    pub uk_highways_url: String,
    pub uk_highways_key: Option<String>,
    /// Commercial routing fallback. Absent key disables the adapter's real
    /// calls (it will just report errors, which the orchestrator tolerates).
    pub commercial_url: String,
    pub commercial_key: Option<String>,
    /// Enrichment backend selection: "openai" or anything else for disabled.
    pub enrich_provider: String,
    pub enrich_model: Option<String>,
    /// Valid API keys for the gating middleware; empty list means open
    /// (development mode).
    pub api_keys: Vec<String>,
    /// Optional messaging sink for scheduled reports.
    pub webhook_url: Option<String>,
    /// Report scheduler interval; 0 disables the scheduler.
    pub report_interval_secs: u64,
    pub bind_addr: String,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Settings {
    pub fn from_env() -> Self {
        let api_keys = env::var("ROADWATCH_API_KEYS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            national_roads_url: var_or(
                "ROADWATCH_NATIONAL_ROADS_URL",
                "https://api.nationalroads.example/v1",
            ),
            national_roads_key: env::var("ROADWATCH_NATIONAL_ROADS_KEY").ok(),
            uk_highways_url: var_or(
                "ROADWATCH_UK_HIGHWAYS_URL",
                "https://api.ukhighways.example/v1",
            ),
            uk_highways_key: env::var("ROADWATCH_UK_HIGHWAYS_KEY").ok(),
            commercial_url: var_or(
                "ROADWATCH_COMMERCIAL_URL",
                "https://routing.example/v2",
            ),
            commercial_key: env::var("ROADWATCH_COMMERCIAL_KEY").ok(),
            enrich_provider: var_or("ROADWATCH_ENRICH_PROVIDER", "openai").to_lowercase(),
            enrich_model: env::var("ROADWATCH_ENRICH_MODEL").ok(),
            api_keys,
            webhook_url: env::var("ROADWATCH_WEBHOOK_URL").ok(),
            report_interval_secs: env::var("ROADWATCH_REPORT_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(900),
            bind_addr: var_or("ROADWATCH_BIND_ADDR", "0.0.0.0:8000"),
        }
    }
}

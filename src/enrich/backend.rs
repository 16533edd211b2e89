//! LLM backend abstraction for segment enrichment.
//!
//! The backend is a black-box `(prompt) -> text` call. Separated from the
//! extraction pipeline so the same parsing/caching layer works for
//! production, disabled mode, and tests.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Timeout for one enrichment round trip.
pub const BACKEND_TIMEOUT_SECS: u64 = 30;

#[async_trait]
pub trait EnrichBackend: Send + Sync {
    /// Complete the prompt, returning the raw model text.
    async fn complete(&self, prompt: &str) -> Result<String>;

    fn name(&self) -> &'static str;

    /// False when the backend can never answer (no key, disabled); callers
    /// skip the network and go straight to the deterministic fallback.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// OpenAI chat-completions backend. Requires `OPENAI_API_KEY`.
pub struct OpenAiBackend {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiBackend {
    /// `model_override`: pass Some("gpt-4o") to override; defaults to gpt-4o-mini.
    pub fn new(api_key: &str, model_override: Option<&str>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("roadwatch/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(BACKEND_TIMEOUT_SECS))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key: api_key.to_string(),
            model: model_override.unwrap_or("gpt-4o-mini").to_string(),
        }
    }

    pub fn from_env() -> Self {
        let key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let model = std::env::var("ROADWATCH_ENRICH_MODEL").ok();
        Self::new(&key, model.as_deref())
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: String,
}

#[async_trait]
impl EnrichBackend for OpenAiBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if self.api_key.is_empty() {
            bail!("openai backend has no api key");
        }

        let sys = "You extract road-traffic facts. Respond with ONLY the requested JSON object, no prose.";
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: sys,
                },
                Msg {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.1,
            max_tokens: 300,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("openai post")?
            .error_for_status()
            .context("openai non-2xx")?;

        let body: Resp = resp.json().await.context("openai body")?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();
        if content.trim().is_empty() {
            bail!("openai returned empty content");
        }
        Ok(content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }

    fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Always-off backend; extraction degrades straight to the fallback path.
pub struct DisabledBackend;

#[async_trait]
impl EnrichBackend for DisabledBackend {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("enrichment backend disabled")
    }

    fn name(&self) -> &'static str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Deterministic backend for tests: replays a fixed response.
#[derive(Clone)]
pub struct MockBackend {
    pub fixed: String,
}

impl MockBackend {
    pub fn replying(fixed: &str) -> Self {
        Self {
            fixed: fixed.to_string(),
        }
    }
}

#[async_trait]
impl EnrichBackend for MockBackend {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok(self.fixed.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

use anyhow::{Context, Result};
use reqwest::Client;

use super::Notifier;
use crate::report::JunctionReport;

/// Generic JSON webhook sink (Slack-compatible `{"text": ...}` payload).
pub struct WebhookNotifier {
    webhook_url: Option<String>,
    client: Client,
}

impl WebhookNotifier {
    pub fn from_env() -> Self {
        Self {
            webhook_url: std::env::var("ROADWATCH_WEBHOOK_URL").ok(),
            client: Client::new(),
        }
    }

    /// Optional builder for tests/tools
    pub fn new(url: String) -> Self {
        Self {
            webhook_url: Some(url),
            client: Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, report: &JunctionReport) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            tracing::debug!("webhook disabled (no ROADWATCH_WEBHOOK_URL)");
            return Ok(());
        };

        let body = serde_json::json!({ "text": report.render_text() });

        self.client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("webhook post")?
            .error_for_status()
            .context("webhook non-2xx")?;
        Ok(())
    }
}

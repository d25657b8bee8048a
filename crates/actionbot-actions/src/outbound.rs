//! Outbound HTTP for `http` and `webhook` responses.

use std::time::Duration;

use actionbot_core::error::{ActionBotError, Result};

use crate::registry::HttpRequest;

/// Timeout for webhook deliveries.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin wrapper around a shared `reqwest::Client`.
#[derive(Clone)]
pub struct OutboundClient {
    client: reqwest::Client,
}

impl OutboundClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ActionBot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ActionBotError::Http(format!("Client error: {e}")))?;
        Ok(Self { client })
    }

    /// Send a configured request. Any status >= 400 is an error.
    pub async fn send(&self, request: &HttpRequest) -> Result<u16> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .timeout(request.timeout);

        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ActionBotError::Http(format!("Request failed: {e}")))?;
        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(ActionBotError::Http(format!(
                "{} {} returned {status}",
                request.method, request.url
            )));
        }

        tracing::debug!("🌐 {} {} → {status}", request.method, request.url);
        Ok(status.as_u16())
    }

    /// POST `{"content": ...}` to a webhook URL.
    pub async fn send_webhook(&self, url: &str, content: &str) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "content": content }))
            .timeout(WEBHOOK_TIMEOUT)
            .send()
            .await
            .map_err(|e| ActionBotError::Http(format!("Webhook send failed: {e}")))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(ActionBotError::Http(format!("Webhook error {status}")));
        }
        tracing::debug!("✅ Webhook delivered to {url}");
        Ok(())
    }
}

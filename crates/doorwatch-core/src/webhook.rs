//! Outbound webhook delivery.

use crate::types::WebhookPayload;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook rejected with {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Delivers an event to the configured receiver.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(&self, payload: &WebhookPayload) -> Result<(), WebhookError>;
}

/// JSON-over-HTTP webhook.
pub struct HttpWebhook {
    client: reqwest::Client,
    url: String,
}

impl HttpWebhook {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhook {
    async fn send(&self, payload: &WebhookPayload) -> Result<(), WebhookError> {
        let response = self.client.post(&self.url).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WebhookError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(status = status.as_u16(), "webhook delivered");
        Ok(())
    }
}

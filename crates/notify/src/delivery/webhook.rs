//! Webhook delivery with exponential-backoff retry.
//!
//! [`WebhookDelivery`] POSTs each rendered notification as JSON to one
//! configured URL. Failed attempts are retried up to three times with
//! exponential backoff (1 s, 2 s, 4 s). Client errors other than 408 and
//! 429 are not retried.

use std::time::Duration;

use async_trait::async_trait;
use boardwatch_core::BlockChangeEvent;

use super::{Delivery, DeliveryError, RenderedNotification};

/// Retry delays in seconds (exponential backoff: 1s, 2s, 4s).
const RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// WebhookDelivery
// ---------------------------------------------------------------------------

/// Delivers notifications to an external webhook endpoint.
pub struct WebhookDelivery {
    client: reqwest::Client,
    url: String,
}

impl WebhookDelivery {
    /// Create a delivery for `url` with a pre-configured HTTP client.
    pub fn new(url: impl Into<String>) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Execute a single POST request and check the response status.
    async fn try_send(&self, payload: &serde_json::Value) -> Result<(), DeliveryError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if is_permanent(status.as_u16()) {
            return Err(DeliveryError::Rejected(format!(
                "endpoint answered HTTP {}",
                status.as_u16()
            )));
        }
        Err(DeliveryError::HttpStatus(status.as_u16()))
    }
}

/// Client errors that will not succeed on retry.
fn is_permanent(status: u16) -> bool {
    (400..500).contains(&status) && status != 408 && status != 429
}

/// Build the JSON body sent to the endpoint.
pub fn build_payload(
    event: &BlockChangeEvent,
    rendered: &RenderedNotification,
) -> serde_json::Value {
    serde_json::json!({
        "kind": rendered.kind,
        "action": event.action,
        "workspace_id": rendered.workspace_id,
        "board_id": rendered.board_id,
        "block_id": rendered.block_id,
        "author": rendered.author,
        "subscriber": rendered.subscriber,
        "text": rendered.text,
        "attachments": rendered.attachments,
        "timestamp": rendered.created_at,
    })
}

#[async_trait]
impl Delivery for WebhookDelivery {
    fn name(&self) -> &str {
        "webhook"
    }

    /// Deliver with retry. Returns `Ok(())` on the first successful attempt.
    async fn deliver(
        &self,
        event: &BlockChangeEvent,
        rendered: &RenderedNotification,
    ) -> Result<(), DeliveryError> {
        let payload = build_payload(event, rendered);

        let mut last_err: Option<DeliveryError> = None;

        for (attempt, delay_secs) in RETRY_DELAYS_SECS.iter().enumerate() {
            match self.try_send(&payload).await {
                Ok(()) => return Ok(()),
                Err(e @ DeliveryError::Rejected(_)) => {
                    tracing::error!(url = %self.url, error = %e, "Webhook rejected notification");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        url = %self.url,
                        error = %e,
                        "Webhook delivery attempt failed, retrying"
                    );
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
                }
            }
        }

        // Final attempt after the last backoff.
        match self.try_send(&payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(url = %self.url, error = %e, "Webhook delivery failed after all retries");
                Err(last_err.unwrap_or(e))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

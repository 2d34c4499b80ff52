//! Incoming webhook client.

use async_trait::async_trait;

use super::{ChatClient, PostOptions};
use crate::config::SecretString;
use crate::error::DeliveryError;
use crate::payload::Payload;

/// Posts payloads as JSON to a Slack incoming webhook URL.
///
/// The channel in the payload overrides the webhook's default channel when
/// the workspace allows it. Channels are never created.
pub struct IncomingWebhookClient {
    url: SecretString,
    client: reqwest::Client,
}

impl IncomingWebhookClient {
    pub fn new(url: SecretString, client: reqwest::Client) -> Self {
        Self { url, client }
    }
}

#[async_trait]
impl ChatClient for IncomingWebhookClient {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn post_message(
        &self,
        payload: &Payload,
        options: &PostOptions,
    ) -> Result<(), DeliveryError> {
        if options.auto_channels_create {
            tracing::debug!("auto_channels_create is not supported by incoming webhooks, ignoring");
        }

        let response = self
            .client
            .post(self.url.expose())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(channel = %payload.channel, "Webhook message accepted");
            return Ok(());
        }

        let body = response.text().await?;
        Err(DeliveryError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

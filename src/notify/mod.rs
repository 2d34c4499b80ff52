//! Slack delivery clients.
//!
//! A [`ChatClient`] posts one [`Payload`] and reports failures as a
//! [`DeliveryError`]; retrying and discarding are the flush driver's job.

mod web_api;
mod webhook;

pub use web_api::WebApiClient;
pub use webhook::IncomingWebhookClient;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{HttpSettings, Transport};
use crate::error::{ConfigError, DeliveryError};
use crate::payload::Payload;

/// Per-post options that are not part of the message itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostOptions {
    /// On `channel_not_found`, create the channel and retry once.
    /// Ignored by incoming webhooks.
    pub auto_channels_create: bool,
}

/// Abstract Slack client.
///
/// Implementations must be `Send + Sync` to be shared with the flush task.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Transport name used in logs and metric labels.
    fn name(&self) -> &str;

    /// Post one message.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Slack accepted the message
    /// * `Err(DeliveryError)` - classified failure, see [`DeliveryError::kind`]
    async fn post_message(
        &self,
        payload: &Payload,
        options: &PostOptions,
    ) -> Result<(), DeliveryError>;
}

impl std::fmt::Debug for dyn ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("name", &self.name())
            .finish()
    }
}

/// Build the shared HTTP client.
///
/// `open_timeout` bounds connection setup, `timeout` the whole request.
/// Both surface as [`DeliveryError::Timeout`].
pub fn build_http_client(settings: &HttpSettings) -> Result<reqwest::Client, ConfigError> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(settings.open_timeout)
        .timeout(settings.timeout);

    if let Some(proxy_url) = &settings.https_proxy {
        let proxy = reqwest::Proxy::https(proxy_url).map_err(|e| {
            ConfigError::ValidationError(format!("invalid https_proxy '{}': {}", proxy_url, e))
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ConfigError::ValidationError(format!("failed to build HTTP client: {}", e)))
}

/// Create the client for the configured transport.
pub fn client_from_transport(transport: &Transport, http: reqwest::Client) -> Arc<dyn ChatClient> {
    match transport {
        Transport::Webhook { url } => Arc::new(IncomingWebhookClient::new(url.clone(), http)),
        Transport::WebApi { token, api_url } => {
            Arc::new(WebApiClient::new(token.clone(), api_url, http))
        }
    }
}

/// Calculate backoff delay for a given retry attempt.
///
/// Uses exponential backoff: `base * 2^attempt`, capped at `max`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let delay = base.saturating_mul(2_u32.saturating_pow(attempt));
    std::cmp::min(delay, max)
}

#[cfg(test)]
pub(crate) mod testing;
#[cfg(test)]
mod tests;

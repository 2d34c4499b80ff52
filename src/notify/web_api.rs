//! Slack Web API client (`chat.postMessage`).

use async_trait::async_trait;
use serde::Deserialize;

use super::{ChatClient, PostOptions};
use crate::config::SecretString;
use crate::error::DeliveryError;
use crate::payload::Payload;

const POST_MESSAGE: &str = "chat.postMessage";
const CREATE_CHANNEL: &str = "conversations.create";
const CHANNEL_NOT_FOUND: &str = "channel_not_found";

/// Common envelope of every Web API response.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Posts payloads through the token-authenticated Web API.
pub struct WebApiClient {
    token: SecretString,
    base_url: String,
    client: reqwest::Client,
}

impl WebApiClient {
    /// `base_url` is the API root, e.g. `https://slack.com/api/`.
    pub fn new(token: SecretString, base_url: &str, client: reqwest::Client) -> Self {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        Self {
            token,
            base_url,
            client,
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}{}", self.base_url, method)
    }

    /// Call one API method with a form body and check the `ok` flag.
    async fn call(&self, method: &str, form: &[(&str, &str)]) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.endpoint(method))
            .bearer_auth(self.token.expose())
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ApiResponse = response.json().await?;
        if body.ok {
            Ok(())
        } else {
            Err(DeliveryError::Api(
                body.error.unwrap_or_else(|| "unknown_error".to_string()),
            ))
        }
    }
}

#[async_trait]
impl ChatClient for WebApiClient {
    fn name(&self) -> &str {
        "web_api"
    }

    async fn post_message(
        &self,
        payload: &Payload,
        options: &PostOptions,
    ) -> Result<(), DeliveryError> {
        let attachments = serde_json::to_string(&payload.attachments)
            .map_err(|e| DeliveryError::Encode(e.to_string()))?;
        let token = payload.token.as_ref().unwrap_or(&self.token);

        let mut form: Vec<(&str, &str)> = vec![
            ("token", token.expose()),
            ("channel", payload.channel.as_str()),
            ("username", payload.username.as_str()),
            ("attachments", attachments.as_str()),
        ];
        if let Some(emoji) = &payload.icon_emoji {
            form.push(("icon_emoji", emoji.as_str()));
        }
        if let Some(url) = &payload.icon_url {
            form.push(("icon_url", url.as_str()));
        }

        match self.call(POST_MESSAGE, &form).await {
            Err(DeliveryError::Api(code))
                if code == CHANNEL_NOT_FOUND && options.auto_channels_create =>
            {
                let name = payload.channel.trim_start_matches('#');
                tracing::info!(channel = %payload.channel, "Channel not found, creating it");
                self.call(CREATE_CHANNEL, &[("name", name)]).await?;
                self.call(POST_MESSAGE, &form).await
            }
            Err(e) => Err(e),
            Ok(()) => {
                tracing::debug!(channel = %payload.channel, "Message posted");
                Ok(())
            }
        }
    }
}

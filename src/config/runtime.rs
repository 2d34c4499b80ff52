//! Runtime configuration with compiled templates and resolved credentials.

use super::env::resolve_env_vars;
use super::secret::SecretString;
use super::types::{BufferConfig, Config, MetricsConfig};
use super::validation::validate_timezone;
use crate::error::ConfigError;
use crate::notify::PostOptions;
use crate::payload::SenderIdentity;
use crate::record::{KeyInjector, TimeZoneSetting};
use crate::template::MessageFormatter;
use std::time::Duration;

/// How messages reach Slack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Incoming webhook: JSON POST to a fixed URL.
    Webhook { url: SecretString },
    /// Web API `chat.postMessage` authenticated by a token.
    WebApi { token: SecretString, api_url: String },
}

impl Transport {
    /// Short name used in logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Transport::Webhook { .. } => "webhook",
            Transport::WebApi { .. } => "web_api",
        }
    }
}

/// HTTP client settings shared by both transports.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub open_timeout: Duration,
    pub timeout: Duration,
    pub https_proxy: Option<String>,
}

/// Configuration ready for use by the flush pipeline.
#[derive(Debug)]
pub struct RuntimeConfig {
    pub transport: Transport,
    pub http: HttpSettings,
    pub post_options: PostOptions,
    pub formatter: MessageFormatter,
    pub identity: SenderIdentity,
    pub injector: KeyInjector,
    pub default_tag: String,
    pub buffer: BufferConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    /// Compile into a [`RuntimeConfig`], resolving `${VAR}` references.
    ///
    /// Call [`Config::validate`] first to report every problem at once;
    /// this stops at the first error.
    pub fn compile(self) -> Result<RuntimeConfig, ConfigError> {
        let format = self.resolved_format();

        let transport = match (&self.slack.webhook_url, &self.slack.token) {
            (Some(url), None) => {
                let url = resolve_env_vars(url.expose())?;
                if url.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "`webhook_url` is an empty string".to_string(),
                    ));
                }
                Transport::Webhook {
                    url: SecretString::new(url),
                }
            }
            (None, Some(token)) => {
                let token = resolve_env_vars(token.expose())?;
                if token.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "`token` is an empty string".to_string(),
                    ));
                }
                Transport::WebApi {
                    token: SecretString::new(token),
                    api_url: self.slack.api_url.clone(),
                }
            }
            (None, None) => {
                return Err(ConfigError::ValidationError(
                    "Either of `webhook_url` or `token` is required".to_string(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(ConfigError::ValidationError(
                    "`webhook_url` and `token` are mutually exclusive".to_string(),
                ));
            }
        };

        let https_proxy = self
            .slack
            .https_proxy
            .as_deref()
            .map(resolve_env_vars)
            .transpose()?;

        let formatter = MessageFormatter::new(
            format.message_template()?,
            format.title_template()?,
            format.channel_template()?,
            format.color_template()?,
        );

        let token = match &transport {
            Transport::WebApi { token, .. } => Some(token.clone()),
            Transport::Webhook { .. } => None,
        };
        let identity = SenderIdentity::new(
            self.format.sender_username,
            self.format.icon_emoji,
            self.format.icon_url,
            token,
        );

        let record = self.record;
        let zone = match (&record.timezone, record.utc) {
            (Some(name), _) => {
                TimeZoneSetting::Named(validate_timezone(name).map_err(ConfigError::ValidationError)?)
            }
            (None, true) => TimeZoneSetting::Utc,
            (None, false) => TimeZoneSetting::Local,
        };
        let injector = KeyInjector::new(
            record.include_tag_key.then_some(record.tag_key),
            record.include_time_key.then_some(record.time_key),
            record.time_format,
            zone,
        );

        Ok(RuntimeConfig {
            transport,
            http: HttpSettings {
                open_timeout: self.slack.open_timeout,
                timeout: self.slack.timeout,
                https_proxy,
            },
            post_options: PostOptions {
                auto_channels_create: self.slack.auto_channel_create,
            },
            formatter,
            identity,
            injector,
            default_tag: record.default_tag,
            buffer: self.buffer,
            metrics: self.metrics,
        })
    }
}

//! Core configuration types and loading.

use super::secret::SecretString;
use super::validation::{validate_time_format, validate_timezone, validate_url};
use crate::error::ConfigError;
use crate::template::FieldTemplate;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/slackout/config.yaml";

/// Default base URL of the Slack Web API.
pub const DEFAULT_API_URL: &str = "https://slack.com/api/";

/// Main configuration structure for slackout.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Delivery transport and HTTP settings.
    pub slack: SlackConfig,
    /// Message templates and sender identity.
    pub format: FormatConfig,
    /// Tag/time key injection.
    #[serde(default)]
    pub record: RecordConfig,
    /// Chunking, flush interval and retry policy.
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Slack transport configuration. Exactly one of `webhook_url` or `token`.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    /// Incoming webhook URL (supports `${ENV_VAR}` substitution).
    #[serde(default)]
    pub webhook_url: Option<SecretString>,
    /// Web API token (supports `${ENV_VAR}` substitution).
    #[serde(default)]
    pub token: Option<SecretString>,
    #[serde(default)]
    pub https_proxy: Option<String>,
    /// Create a missing channel and retry (token transport only).
    #[serde(default, alias = "auto_channels_create")]
    pub auto_channel_create: bool,
    #[serde(default = "default_open_timeout", with = "humantime_serde")]
    pub open_timeout: Duration,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_open_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl SlackConfig {
    pub fn is_webhook(&self) -> bool {
        self.webhook_url.is_some()
    }
}

/// Message templates. Each `*_keys` list feeds the `%s` placeholders of
/// the matching template, in order.
#[derive(Debug, Clone, Deserialize)]
pub struct FormatConfig {
    #[serde(alias = "channel")]
    pub destination_channel: String,
    #[serde(default, deserialize_with = "deserialize_key_list")]
    pub channel_keys: Option<Vec<String>>,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default, deserialize_with = "deserialize_key_list")]
    pub color_keys: Option<Vec<String>>,
    /// Presence selects titled mode.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_key_list")]
    pub title_keys: Option<Vec<String>>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "deserialize_key_list")]
    pub message_keys: Option<Vec<String>>,
    #[serde(default = "default_username", alias = "username")]
    pub sender_username: String,
    #[serde(default)]
    pub icon_emoji: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

fn default_color() -> String {
    "good".to_string()
}

fn default_username() -> String {
    "fluentd".to_string()
}

/// Key list written either as a YAML sequence or a comma-separated string.
#[derive(Deserialize)]
#[serde(untagged)]
enum KeyList {
    List(Vec<String>),
    Csv(String),
}

fn deserialize_key_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<KeyList>::deserialize(deserializer)?;
    Ok(raw.map(|list| match list {
        KeyList::List(keys) => keys,
        KeyList::Csv(csv) => csv
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect(),
    }))
}

/// Templates with transport-dependent defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFormat {
    /// Always starts with `#`.
    pub channel: String,
    pub channel_keys: Option<Vec<String>>,
    pub color: String,
    pub color_keys: Option<Vec<String>>,
    pub title: Option<String>,
    pub title_keys: Option<Vec<String>>,
    pub message: String,
    pub message_keys: Vec<String>,
}

impl FormatConfig {
    /// Apply defaults. Webhook delivery defaults to titled mode
    /// (`title: "%s"` over `[tag]`, message `"[%s] %s"` over
    /// `[time, message]`); token delivery defaults to plain `"%s"` over
    /// `[message]`.
    pub fn resolve(&self, webhook: bool) -> ResolvedFormat {
        let channel = if self.destination_channel.starts_with('#') {
            self.destination_channel.clone()
        } else {
            format!("#{}", self.destination_channel)
        };

        let (title, title_keys, message, message_keys) = if webhook {
            (
                Some(self.title.clone().unwrap_or_else(|| "%s".to_string())),
                Some(
                    self.title_keys
                        .clone()
                        .unwrap_or_else(|| vec!["tag".to_string()]),
                ),
                self.message.clone().unwrap_or_else(|| "[%s] %s".to_string()),
                self.message_keys
                    .clone()
                    .unwrap_or_else(|| vec!["time".to_string(), "message".to_string()]),
            )
        } else {
            (
                self.title.clone(),
                self.title_keys.clone(),
                self.message.clone().unwrap_or_else(|| "%s".to_string()),
                self.message_keys
                    .clone()
                    .unwrap_or_else(|| vec!["message".to_string()]),
            )
        };

        ResolvedFormat {
            channel,
            channel_keys: self.channel_keys.clone(),
            color: self.color.clone(),
            color_keys: self.color_keys.clone(),
            title,
            title_keys,
            message,
            message_keys,
        }
    }
}

impl ResolvedFormat {
    /// Compile the message template.
    pub fn message_template(&self) -> Result<FieldTemplate, ConfigError> {
        FieldTemplate::compile(
            "message",
            "message_keys",
            &self.message,
            Some(self.message_keys.clone()),
        )
    }

    /// Compile the title template, if titled mode is configured.
    pub fn title_template(&self) -> Result<Option<FieldTemplate>, ConfigError> {
        self.title
            .as_deref()
            .map(|t| FieldTemplate::compile("title", "title_keys", t, self.title_keys.clone()))
            .transpose()
    }

    pub fn channel_template(&self) -> Result<FieldTemplate, ConfigError> {
        FieldTemplate::compile(
            "destination_channel",
            "channel_keys",
            &self.channel,
            self.channel_keys.clone(),
        )
    }

    pub fn color_template(&self) -> Result<FieldTemplate, ConfigError> {
        FieldTemplate::compile("color", "color_keys", &self.color, self.color_keys.clone())
    }
}

/// Tag/time keys written into every record before buffering.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordConfig {
    #[serde(default = "default_true")]
    pub include_tag_key: bool,
    #[serde(default = "default_tag_key")]
    pub tag_key: String,
    #[serde(default = "default_true")]
    pub include_time_key: bool,
    #[serde(default = "default_time_key")]
    pub time_key: String,
    #[serde(default = "default_time_format")]
    pub time_format: String,
    /// Format times in UTC instead of local time.
    #[serde(default)]
    pub utc: bool,
    /// IANA timezone name; overrides local time.
    #[serde(default)]
    pub timezone: Option<String>,
    /// Tag given to input lines that carry no tag.
    #[serde(default = "default_tag")]
    pub default_tag: String,
}

fn default_true() -> bool {
    true
}

fn default_tag_key() -> String {
    "tag".to_string()
}

fn default_time_key() -> String {
    "time".to_string()
}

fn default_time_format() -> String {
    "%H:%M:%S".to_string()
}

fn default_tag() -> String {
    "slackout".to_string()
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            include_tag_key: true,
            tag_key: default_tag_key(),
            include_time_key: true,
            time_key: default_time_key(),
            time_format: default_time_format(),
            utc: false,
            timezone: None,
            default_tag: default_tag(),
        }
    }
}

/// Buffering and retry policy of the flush loop.
#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,
    /// Records per chunk; reaching it triggers an immediate flush.
    #[serde(default = "default_chunk_limit_records")]
    pub chunk_limit_records: usize,
    /// Capacity of the ingest channel.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Retries of one chunk after a transient failure.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_retry_wait", with = "humantime_serde")]
    pub retry_wait: Duration,
    #[serde(default = "default_max_retry_wait", with = "humantime_serde")]
    pub max_retry_wait: Duration,
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_chunk_limit_records() -> usize {
    256
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_retry_limit() -> u32 {
    17
}

fn default_retry_wait() -> Duration {
    Duration::from_secs(1)
}

fn default_max_retry_wait() -> Duration {
    Duration::from_secs(300)
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            flush_interval: default_flush_interval(),
            chunk_limit_records: default_chunk_limit_records(),
            queue_capacity: default_queue_capacity(),
            retry_limit: default_retry_limit(),
            retry_wait: default_retry_wait(),
            max_retry_wait: default_max_retry_wait(),
        }
    }
}

/// Metrics exposition configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    ///
    /// # Errors
    /// Returns [`ConfigError::LoadError`] if the file cannot be read.
    /// Returns [`ConfigError::ValidationError`] if the YAML is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Templates with defaults for the configured transport.
    pub fn resolved_format(&self) -> ResolvedFormat {
        self.format.resolve(self.slack.is_webhook())
    }

    /// Validate the whole configuration, collecting every error.
    ///
    /// Credentials referencing `${VAR}` are checked for emptiness only;
    /// substitution happens in [`Config::compile`].
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        match (&self.slack.webhook_url, &self.slack.token) {
            (None, None) => errors.push(ConfigError::ValidationError(
                "Either of `webhook_url` or `token` is required".to_string(),
            )),
            (Some(_), Some(_)) => errors.push(ConfigError::ValidationError(
                "`webhook_url` and `token` are mutually exclusive".to_string(),
            )),
            (Some(url), None) => {
                if url.is_empty() {
                    errors.push(ConfigError::ValidationError(
                        "`webhook_url` is an empty string".to_string(),
                    ));
                } else if !url.expose().contains("${")
                    && let Err(e) = validate_url(url.expose())
                {
                    // The URL itself is a secret; report only the parse error.
                    errors.push(ConfigError::ValidationError(format!(
                        "`webhook_url` is not a valid URL: {}",
                        e
                    )));
                }
            }
            (None, Some(token)) => {
                if token.is_empty() {
                    errors.push(ConfigError::ValidationError(
                        "`token` is an empty string".to_string(),
                    ));
                }
            }
        }

        if let Err(e) = validate_url(&self.slack.api_url) {
            errors.push(ConfigError::ValidationError(format!(
                "`api_url` '{}' is not a valid URL: {}",
                self.slack.api_url, e
            )));
        }

        if let Some(proxy) = &self.slack.https_proxy
            && !proxy.contains("${")
            && let Err(e) = validate_url(proxy)
        {
            errors.push(ConfigError::ValidationError(format!(
                "`https_proxy` '{}' is not a valid URL: {}",
                proxy, e
            )));
        }

        if self.format.icon_emoji.is_some() && self.format.icon_url.is_some() {
            errors.push(ConfigError::ValidationError(
                "either of `icon_emoji` or `icon_url` can be specified".to_string(),
            ));
        }

        let format = self.resolved_format();
        if let Err(e) = format.message_template() {
            errors.push(e);
        }
        if let Err(e) = format.title_template() {
            errors.push(e);
        }
        if let Err(e) = format.channel_template() {
            errors.push(e);
        }
        if let Err(e) = format.color_template() {
            errors.push(e);
        }

        if let Err(e) = validate_time_format(&self.record.time_format) {
            errors.push(ConfigError::ValidationError(format!("record.time_format: {}", e)));
        }
        if let Some(tz) = &self.record.timezone {
            if self.record.utc {
                errors.push(ConfigError::ValidationError(
                    "record.utc and record.timezone are mutually exclusive".to_string(),
                ));
            }
            if let Err(e) = validate_timezone(tz) {
                errors.push(ConfigError::ValidationError(format!("record.timezone: {}", e)));
            }
        }

        if self.buffer.chunk_limit_records == 0 {
            errors.push(ConfigError::ValidationError(
                "buffer.chunk_limit_records must be greater than 0".to_string(),
            ));
        }
        if self.buffer.queue_capacity == 0 {
            errors.push(ConfigError::ValidationError(
                "buffer.queue_capacity must be greater than 0".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

//! Slack message payloads.
//!
//! One [`Payload`] is built per rendered channel per flush. Each
//! `(channel, color)` group becomes one [`Attachment`], carrying either the
//! accumulated text (plain mode) or one [`Field`] per tag (titled mode).

use indexmap::IndexMap;
use serde::Serialize;

use crate::config::SecretString;
use crate::group::{FieldBuilder, GroupBody, MessageGroups};

/// Emoji used when neither `icon_emoji` nor `icon_url` is configured.
pub const DEFAULT_ICON_EMOJI: &str = ":question:";

/// One title/value entry of a titled-mode attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub title: String,
    pub value: String,
}

/// Slack message attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub color: String,
    /// Shown in notifications that cannot render attachments.
    pub fallback: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<Field>>,
}

/// Complete message for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payload {
    pub channel: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<SecretString>,
    pub attachments: Vec<Attachment>,
}

/// Sender avatar. Emoji and URL are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Icon {
    Emoji(String),
    Url(String),
}

/// Fields shared by every payload: who the message appears to come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    pub username: String,
    pub icon: Icon,
    /// Present only for token-based delivery.
    pub token: Option<SecretString>,
}

impl SenderIdentity {
    /// Build an identity, defaulting the icon to [`DEFAULT_ICON_EMOJI`].
    ///
    /// Configuration validation rejects setting both icons; if both are
    /// given anyway the URL wins.
    pub fn new(
        username: impl Into<String>,
        icon_emoji: Option<String>,
        icon_url: Option<String>,
        token: Option<SecretString>,
    ) -> Self {
        let icon = match (icon_url, icon_emoji) {
            (Some(url), _) => Icon::Url(url),
            (None, Some(emoji)) => Icon::Emoji(emoji),
            (None, None) => Icon::Emoji(DEFAULT_ICON_EMOJI.to_string()),
        };
        Self {
            username: username.into(),
            icon,
            token,
        }
    }

    fn payload(&self, channel: String, attachments: Vec<Attachment>) -> Payload {
        let (icon_emoji, icon_url) = match &self.icon {
            Icon::Emoji(e) => (Some(e.clone()), None),
            Icon::Url(u) => (None, Some(u.clone())),
        };
        Payload {
            channel,
            username: self.username.clone(),
            icon_emoji,
            icon_url,
            token: self.token.clone(),
            attachments,
        }
    }
}

/// Convert one flush's groups into payloads, one per channel.
///
/// Channels and their attachments keep the groups' first-occurrence order.
pub fn build_payloads(groups: MessageGroups, identity: &SenderIdentity) -> Vec<Payload> {
    let mut by_channel: IndexMap<String, Vec<Attachment>> = IndexMap::new();

    for (key, body) in groups {
        let attachment = build_attachment(key.color, body);
        by_channel.entry(key.channel).or_default().push(attachment);
    }

    by_channel
        .into_iter()
        .map(|(channel, attachments)| identity.payload(channel, attachments))
        .collect()
}

fn build_attachment(color: String, body: GroupBody) -> Attachment {
    match body {
        GroupBody::Text(text) => Attachment {
            color,
            fallback: text.clone(),
            text: Some(text),
            fields: None,
        },
        GroupBody::Fields(builders) => {
            let fields: Vec<Field> = builders.into_values().map(FieldBuilder::finish).collect();
            let fallback = fields
                .iter()
                .map(|f| f.title.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            Attachment {
                color,
                fallback,
                text: None,
                fields: Some(fields),
            }
        }
    }
}

//! Grouping of a flush's records into per-destination message groups.
//!
//! Each record is routed by its rendered `(channel, color)` pair. Groups and,
//! in titled mode, the per-tag fields inside them are kept in first-occurrence
//! order; lines inside a group keep arrival order.

use indexmap::IndexMap;

use crate::payload::Field;
use crate::record::Record;
use crate::template::{MessageFormatter, RenderMode};

/// Rendered routing key of one outbound message group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationKey {
    pub channel: String,
    pub color: String,
}

impl DestinationKey {
    pub fn new(channel: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            color: color.into(),
        }
    }
}

/// Accumulates the lines of one tag in titled mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBuilder {
    title: String,
    value: String,
}

impl FieldBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: String::new(),
        }
    }

    /// Append one line followed by `\n`.
    pub fn push_line(&mut self, line: &str) {
        self.value.push_str(line);
        self.value.push('\n');
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn finish(self) -> Field {
        Field {
            title: self.title,
            value: self.value,
        }
    }
}

/// Accumulated content of one `(channel, color)` group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupBody {
    /// Plain mode: newline-terminated rendered messages.
    Text(String),
    /// Titled mode: one field per tag, keyed by the raw tag.
    Fields(IndexMap<String, FieldBuilder>),
}

impl GroupBody {
    fn empty(mode: RenderMode) -> Self {
        match mode {
            RenderMode::Plain => GroupBody::Text(String::new()),
            RenderMode::Titled => GroupBody::Fields(IndexMap::new()),
        }
    }
}

/// All message groups of one flush, in first-occurrence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageGroups {
    mode: RenderMode,
    groups: IndexMap<DestinationKey, GroupBody>,
}

impl MessageGroups {
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn get(&self, key: &DestinationKey) -> Option<&GroupBody> {
        self.groups.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DestinationKey, &GroupBody)> {
        self.groups.iter()
    }

    /// Number of `(channel, color)` groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of distinct rendered channels.
    pub fn channel_count(&self) -> usize {
        let mut channels: Vec<&str> = self.groups.keys().map(|k| k.channel.as_str()).collect();
        channels.sort_unstable();
        channels.dedup();
        channels.len()
    }
}

impl IntoIterator for MessageGroups {
    type Item = (DestinationKey, GroupBody);
    type IntoIter = indexmap::map::IntoIter<DestinationKey, GroupBody>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter()
    }
}

/// Partition `records` into message groups in a single pass.
pub fn group(records: &[Record], formatter: &MessageFormatter) -> MessageGroups {
    let mode = formatter.mode();
    let mut groups: IndexMap<DestinationKey, GroupBody> = IndexMap::new();

    for record in records {
        let key = DestinationKey::new(formatter.channel(record), formatter.color(record));
        let body = groups.entry(key).or_insert_with(|| GroupBody::empty(mode));

        match body {
            GroupBody::Text(text) => {
                text.push_str(&formatter.message(record));
                text.push('\n');
            }
            GroupBody::Fields(fields) => {
                let field = fields
                    .entry(record.tag.clone())
                    .or_insert_with(|| FieldBuilder::new(formatter.title(record)));
                field.push_line(&formatter.message(record));
            }
        }
    }

    tracing::debug!(
        records = records.len(),
        groups = groups.len(),
        mode = %mode,
        "Grouped records"
    );

    MessageGroups { mode, groups }
}

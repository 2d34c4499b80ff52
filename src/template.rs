//! Positional message templates.
//!
//! Templates use printf-style `%s` placeholders bound to an ordered list of
//! record keys:
//!
//! ```text
//! message: "[%s] %s"
//! message_keys: [tag, message]
//! ```
//!
//! A template is parsed once at configuration time into literal and
//! placeholder tokens. Its placeholder count must equal the length of its
//! key list; a mismatch is a configuration error. Rendering never fails: a
//! key missing from a record logs a warning and substitutes `""`.
//!
//! # Example
//!
//! ```
//! use slackout::template::Template;
//!
//! let t = Template::parse("[%s] %s").unwrap();
//! assert_eq!(t.arity(), 2);
//! assert_eq!(t.apply(&["app".to_string(), "boom".to_string()]), "[app] boom");
//! ```

use crate::error::{ConfigError, TemplateError};
use crate::record::Record;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    /// Index into the value list.
    Value(usize),
}

/// A parsed positional template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    tokens: Vec<Token>,
    arity: usize,
}

impl Template {
    /// Parse a template string.
    ///
    /// Recognised specifiers are `%s` (next value) and `%%` (literal percent).
    ///
    /// # Errors
    ///
    /// - `TemplateError::UnsupportedSpecifier` for any other `%x`
    /// - `TemplateError::IncompleteSpecifier` for a trailing `%`
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut arity = 0;
        let mut chars = source.char_indices();

        while let Some((position, c)) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }
            match chars.next() {
                Some((_, 's')) => {
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(Token::Value(arity));
                    arity += 1;
                }
                Some((_, '%')) => literal.push('%'),
                Some((_, specifier)) => {
                    return Err(TemplateError::UnsupportedSpecifier {
                        specifier,
                        position,
                    });
                }
                None => return Err(TemplateError::IncompleteSpecifier),
            }
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            tokens,
            arity,
        })
    }

    /// Number of `%s` placeholders.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Substitute `values` into the placeholders, in order.
    ///
    /// Placeholders without a corresponding value render as `""`.
    pub fn apply(&self, values: &[String]) -> String {
        let mut out = String::with_capacity(self.source.len());
        for token in &self.tokens {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Value(i) => {
                    if let Some(v) = values.get(*i) {
                        out.push_str(v);
                    }
                }
            }
        }
        out
    }
}

/// A template bound to the record keys that feed it.
///
/// Without keys the source string is used verbatim (no `%` processing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTemplate {
    Literal(String),
    Bound { template: Template, keys: Vec<String> },
}

impl FieldTemplate {
    pub fn literal(source: impl Into<String>) -> Self {
        FieldTemplate::Literal(source.into())
    }

    /// Build a field template, validating placeholder count against keys.
    ///
    /// `option` and `keys_option` name the configuration options involved
    /// and appear in the error message.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidTemplate` if the template cannot be parsed
    /// - `ConfigError::TemplateMismatch` if `%s` count != key count
    pub fn compile(
        option: &str,
        keys_option: &str,
        source: &str,
        keys: Option<Vec<String>>,
    ) -> Result<Self, ConfigError> {
        let Some(keys) = keys else {
            return Ok(FieldTemplate::Literal(source.to_string()));
        };

        let template = Template::parse(source).map_err(|e| ConfigError::InvalidTemplate {
            option: option.to_string(),
            source: e,
        })?;

        if template.arity() != keys.len() {
            return Err(ConfigError::TemplateMismatch {
                template: option.to_string(),
                keys: keys_option.to_string(),
                specifiers: template.arity(),
                key_count: keys.len(),
            });
        }

        Ok(FieldTemplate::Bound { template, keys })
    }

    /// Render against one record.
    pub fn render(&self, record: &Record) -> String {
        match self {
            FieldTemplate::Literal(s) => s.clone(),
            FieldTemplate::Bound { template, keys } => template.apply(&fetch_keys(record, keys)),
        }
    }
}

/// Fetch `keys` from `record` as strings, substituting `""` for missing keys.
pub fn fetch_keys(record: &Record, keys: &[String]) -> Vec<String> {
    keys.iter()
        .map(|key| match record.field(key) {
            Some(value) => value,
            None => {
                tracing::warn!(
                    key = %key,
                    tag = %record.tag,
                    record = ?record.fields,
                    "the specified key not found in record"
                );
                metrics::counter!("slackout_missing_fields_total", "key" => key.clone())
                    .increment(1);
                String::new()
            }
        })
        .collect()
}

/// Rendering mode, chosen once by whether a title template is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// One text blob per (channel, color).
    Plain,
    /// One (title, value) field per tag within each (channel, color).
    Titled,
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderMode::Plain => write!(f, "plain"),
            RenderMode::Titled => write!(f, "titled"),
        }
    }
}

/// The four per-record templates of a flush.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    message: FieldTemplate,
    title: Option<FieldTemplate>,
    channel: FieldTemplate,
    color: FieldTemplate,
}

impl MessageFormatter {
    pub fn new(
        message: FieldTemplate,
        title: Option<FieldTemplate>,
        channel: FieldTemplate,
        color: FieldTemplate,
    ) -> Self {
        Self {
            message,
            title,
            channel,
            color,
        }
    }

    pub fn mode(&self) -> RenderMode {
        if self.title.is_some() {
            RenderMode::Titled
        } else {
            RenderMode::Plain
        }
    }

    pub fn message(&self, record: &Record) -> String {
        self.message.render(record)
    }

    /// Rendered title; empty in plain mode.
    pub fn title(&self, record: &Record) -> String {
        self.title
            .as_ref()
            .map(|t| t.render(record))
            .unwrap_or_default()
    }

    pub fn channel(&self, record: &Record) -> String {
        self.channel.render(record)
    }

    pub fn color(&self, record: &Record) -> String {
        self.color.render(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn record(tag: &str, value: Value) -> Record {
        match value {
            Value::Object(map) => Record::new(tag, 0, map),
            _ => panic!("expected object"),
        }
    }

    fn keys(list: &[&str]) -> Option<Vec<String>> {
        Some(list.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn parse_counts_placeholders() {
        assert_eq!(Template::parse("").unwrap().arity(), 0);
        assert_eq!(Template::parse("plain text").unwrap().arity(), 0);
        assert_eq!(Template::parse("%s").unwrap().arity(), 1);
        assert_eq!(Template::parse("[%s] %s").unwrap().arity(), 2);
        assert_eq!(Template::parse("%s%s%s").unwrap().arity(), 3);
    }

    #[test]
    fn percent_escape_is_literal() {
        let t = Template::parse("100%% of %s").unwrap();
        assert_eq!(t.arity(), 1);
        assert_eq!(t.apply(&["disk".to_string()]), "100% of disk");
    }

    #[test]
    fn parse_rejects_unsupported_specifier() {
        let err = Template::parse("count: %d").unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnsupportedSpecifier {
                specifier: 'd',
                position: 7
            }
        );
    }

    #[test]
    fn parse_rejects_trailing_percent() {
        assert_eq!(
            Template::parse("50%").unwrap_err(),
            TemplateError::IncompleteSpecifier
        );
    }

    #[test]
    fn apply_handles_multibyte_literals() {
        let t = Template::parse("🚨 %s · été").unwrap();
        assert_eq!(t.apply(&["ok".to_string()]), "🚨 ok · été");
    }

    #[test]
    fn apply_with_short_value_list_renders_empty() {
        let t = Template::parse("%s-%s").unwrap();
        assert_eq!(t.apply(&["a".to_string()]), "a-");
    }

    #[test]
    fn compile_accepts_matching_arity() {
        for (source, list) in [
            ("%s", vec!["a"]),
            ("[%s] %s", vec!["a", "b"]),
            ("none", vec![]),
        ] {
            let result = FieldTemplate::compile("message", "message_keys", source, keys(&list));
            assert!(result.is_ok(), "{} with {:?}", source, list);
        }
    }

    #[test]
    fn compile_rejects_mismatched_arity() {
        for (source, list) in [
            ("%s", vec![]),
            ("%s", vec!["a", "b"]),
            ("[%s] %s", vec!["a"]),
            ("none", vec!["a"]),
        ] {
            let err = FieldTemplate::compile("message", "message_keys", source, keys(&list))
                .unwrap_err();
            match err {
                ConfigError::TemplateMismatch {
                    template,
                    keys,
                    specifiers,
                    key_count,
                } => {
                    assert_eq!(template, "message");
                    assert_eq!(keys, "message_keys");
                    assert_eq!(key_count, list.len());
                    assert_ne!(specifiers, key_count);
                }
                other => panic!("Expected TemplateMismatch, got {:?}", other),
            }
        }
    }

    #[test]
    fn compile_without_keys_is_literal() {
        let t = FieldTemplate::compile("title", "title_keys", "%s %d", None).unwrap();
        assert_eq!(t, FieldTemplate::literal("%s %d"));
        assert_eq!(t.render(&record("app", json!({}))), "%s %d");
    }

    #[test]
    fn compile_reports_parse_error_with_option_name() {
        let err = FieldTemplate::compile("color", "color_keys", "%x", keys(&["a"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTemplate { ref option, .. } if option == "color"));
    }

    #[test]
    fn render_substitutes_fields_in_key_order() {
        let t = FieldTemplate::compile("message", "message_keys", "[%s] %s", keys(&["tag", "message"]))
            .unwrap();
        let r = record("app.error", json!({"tag": "app.error", "message": "boom"}));
        assert_eq!(t.render(&r), "[app.error] boom");
    }

    #[test]
    fn render_missing_key_substitutes_empty_string() {
        let t = FieldTemplate::compile("color", "color_keys", "%s", keys(&["level_color"])).unwrap();
        let r = record("app", json!({"message": "m"}));
        assert_eq!(t.render(&r), "");
    }

    #[test]
    fn render_coerces_non_string_values() {
        let t = FieldTemplate::compile("message", "message_keys", "%s/%s", keys(&["code", "ok"]))
            .unwrap();
        let r = record("app", json!({"code": 503, "ok": false}));
        assert_eq!(t.render(&r), "503/false");
    }

    #[test]
    fn formatter_mode_follows_title() {
        let plain = MessageFormatter::new(
            FieldTemplate::literal("m"),
            None,
            FieldTemplate::literal("#c"),
            FieldTemplate::literal("good"),
        );
        assert_eq!(plain.mode(), RenderMode::Plain);
        assert_eq!(plain.title(&record("t", json!({}))), "");

        let titled = MessageFormatter::new(
            FieldTemplate::literal("m"),
            Some(FieldTemplate::literal("Title")),
            FieldTemplate::literal("#c"),
            FieldTemplate::literal("good"),
        );
        assert_eq!(titled.mode(), RenderMode::Titled);
        assert_eq!(titled.title(&record("t", json!({}))), "Title");
    }
}

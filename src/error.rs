//! Centralized error types for slackout using thiserror.
//!
//! Configuration errors are fatal at startup. Delivery errors carry a
//! [`DeliveryErrorKind`] that the flush driver branches on: only transient
//! errors ever leave a flush.

use thiserror::Error;

/// Errors related to configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load config file: {0}")]
    LoadError(String),
    #[error("invalid configuration: {0}")]
    ValidationError(String),
    /// A template's `%s` count differs from the length of its key list.
    #[error(
        "string specifier '%s' for `{template}` and `{keys}` specification mismatch \
         ({specifiers} specifier(s), {key_count} key(s))"
    )]
    TemplateMismatch {
        template: String,
        keys: String,
        specifiers: usize,
        key_count: usize,
    },
    #[error("invalid template `{option}`: {source}")]
    InvalidTemplate {
        option: String,
        #[source]
        source: TemplateError,
    },
}

/// Errors raised while parsing a positional template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unsupported format specifier '%{specifier}' at byte {position}")]
    UnsupportedSpecifier { specifier: char, position: usize },
    #[error("incomplete format specifier at end of template")]
    IncompleteSpecifier,
}

/// Errors related to reading records from the input stream.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("unsupported record shape: {0}")]
    InvalidRecord(String),
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// Retry classification of a delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryErrorKind {
    /// Network timeout class; the whole flush should be retried later.
    Transient,
    /// Anything else; the batch is discarded.
    Permanent,
}

/// Errors returned by a chat-service client when posting a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("chat service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("chat service rejected message: {0}")]
    Api(String),
    #[error("invalid response from chat service: {0}")]
    InvalidResponse(String),
    #[error("failed to encode payload: {0}")]
    Encode(String),
}

impl DeliveryError {
    /// Retry classification used by the flush driver.
    pub fn kind(&self) -> DeliveryErrorKind {
        match self {
            DeliveryError::Timeout(_) => DeliveryErrorKind::Transient,
            _ => DeliveryErrorKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == DeliveryErrorKind::Transient
    }

    /// Short stable name used in logs and metric labels.
    pub fn class(&self) -> &'static str {
        match self {
            DeliveryError::Timeout(_) => "timeout",
            DeliveryError::Connection(_) => "connection",
            DeliveryError::Status { .. } => "status",
            DeliveryError::Api(_) => "api",
            DeliveryError::InvalidResponse(_) => "invalid_response",
            DeliveryError::Encode(_) => "encode",
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DeliveryError::Timeout(e.to_string())
        } else if e.is_decode() {
            DeliveryError::InvalidResponse(e.to_string())
        } else if e.is_builder() {
            DeliveryError::Encode(e.to_string())
        } else {
            DeliveryError::Connection(e.to_string())
        }
    }
}

// src/lib.rs
//! Slackout - buffered forwarding of JSON log records to Slack.

pub mod buffer;
pub mod cli;
pub mod config;
pub mod error;
pub mod flush;
pub mod group;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod payload;
pub mod record;
pub mod template;

// Re-export commonly used types
pub use buffer::{BufferSummary, BufferedOutput, record_channel};
pub use cli::LogFormat;
pub use flush::{FlushOutcome, Flusher};
pub use group::{MessageGroups, group};
pub use ingest::{IngestStats, parse_line, read_records};
pub use metrics::{MetricsServer, initialize_metrics, register_metric_descriptions};
pub use notify::{
    ChatClient, IncomingWebhookClient, PostOptions, WebApiClient, backoff_delay,
    build_http_client, client_from_transport,
};
pub use payload::{Payload, SenderIdentity, build_payloads};
pub use record::{KeyInjector, Record};
pub use template::{FieldTemplate, MessageFormatter, Template};

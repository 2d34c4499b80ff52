//! Configuration loading and validation for slackout.
//!
//! This module handles loading the YAML configuration file,
//! validation, and managing environment variables for secrets.

mod env;
mod runtime;
mod secret;
mod types;
mod validation;

// Re-exports publics
pub use env::resolve_env_vars;
pub use runtime::{HttpSettings, RuntimeConfig, Transport};
pub use secret::SecretString;
pub use types::{
    BufferConfig, Config, DEFAULT_API_URL, DEFAULT_CONFIG_PATH, FormatConfig, MetricsConfig,
    RecordConfig, ResolvedFormat, SlackConfig,
};

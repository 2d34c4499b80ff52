//! Prometheus metrics exposition server.
//!
//! This module provides an HTTP server that exposes slackout metrics
//! in Prometheus format on a configurable port.

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Global flag to track if recorder is installed (for tests)
static RECORDER_INSTALLED: OnceLock<()> = OnceLock::new();

/// Register all metric descriptions for Prometheus.
///
/// This should be called once at startup after the recorder is installed.
pub fn register_metric_descriptions() {
    use metrics::{describe_counter, describe_gauge};

    // Counters
    describe_counter!(
        "slackout_records_received_total",
        "Total number of input records accepted into the buffer"
    );
    describe_counter!(
        "slackout_ingest_errors_total",
        "Total number of input lines skipped (invalid JSON or record shape)"
    );
    describe_counter!(
        "slackout_missing_fields_total",
        "Total number of template keys not found in a record"
    );
    describe_counter!(
        "slackout_messages_sent_total",
        "Total number of messages accepted by Slack"
    );
    describe_counter!(
        "slackout_delivery_errors_total",
        "Total number of failed message posts by error class"
    );
    describe_counter!(
        "slackout_flushes_total",
        "Total number of completed flushes by outcome (delivered, discarded, dropped)"
    );
    describe_counter!(
        "slackout_flush_retries_total",
        "Total number of chunk retries after a transient delivery failure"
    );
    describe_counter!(
        "slackout_chunks_dropped_total",
        "Total number of chunks dropped after the retry limit or a failed final flush"
    );

    // Gauges
    describe_gauge!(
        "slackout_buffer_records",
        "Current number of records in the chunk being accumulated"
    );
    describe_gauge!(
        "slackout_build_info",
        "Build information with version label (always 1)"
    );
}

/// Metrics server for Prometheus exposition on `/metrics`.
pub struct MetricsServer {
    port: u16,
    /// Signaled once the recorder is installed, so callers can avoid
    /// emitting metrics before anything is listening for them.
    ready_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MetricsServer {
    /// Create a new metrics server bound to the given port.
    ///
    /// Use port 0 to let the OS assign an available port (useful for testing).
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ready_tx: None,
        }
    }

    /// Create a new metrics server with a ready signal channel.
    pub fn with_ready_signal(port: u16, ready_tx: tokio::sync::oneshot::Sender<()>) -> Self {
        Self {
            port,
            ready_tx: Some(ready_tx),
        }
    }

    /// Returns the configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the metrics server until cancelled.
    ///
    /// Installs the global metrics recorder and its HTTP listener, then
    /// waits for the cancellation token.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter cannot be installed.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();

        // The recorder can only be installed once per process
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

        let _ = RECORDER_INSTALLED.set(());

        register_metric_descriptions();

        if let Some(tx) = self.ready_tx {
            let _ = tx.send(());
        }

        info!(port = self.port, "Metrics server started on /metrics");

        cancel.cancelled().await;

        info!("Metrics server shutting down");

        Ok(())
    }
}

/// Check if the metrics recorder has been installed.
#[cfg(test)]
fn is_recorder_installed() -> bool {
    RECORDER_INSTALLED.get().is_some()
}

/// Initialize known metrics so they appear in `/metrics` from startup.
///
/// # Arguments
///
/// * `transport` - Transport name used as the `transport` label
pub fn initialize_metrics(transport: &str) {
    use metrics::{counter, gauge};

    gauge!("slackout_build_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    gauge!("slackout_buffer_records").set(0.0);

    counter!("slackout_records_received_total").absolute(0);
    counter!("slackout_flush_retries_total").absolute(0);
    counter!("slackout_chunks_dropped_total").absolute(0);
    counter!("slackout_messages_sent_total", "transport" => transport.to_string()).absolute(0);

    for outcome in ["delivered", "discarded", "dropped"] {
        counter!("slackout_flushes_total", "outcome" => outcome).absolute(0);
    }

    tracing::info!(transport = transport, "Metrics initialized to zero");
}

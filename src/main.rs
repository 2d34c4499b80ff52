//! Slackout - buffered forwarding of JSON log records to Slack.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use slackout::cli::{Cli, LogFormat};
use slackout::config::{Config, RuntimeConfig};
use slackout::{
    BufferedOutput, Flusher, MetricsServer, build_http_client, client_from_transport,
    initialize_metrics, read_records, record_channel,
};

/// Initialize the tracing subscriber with the specified log format.
///
/// Logs go to stderr; stdout is reserved for `--validate` output.
fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .flatten_event(true)
                .with_env_filter(filter)
                .init();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_format);

    info!(config_path = %cli.config.display(), "Loading configuration");

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, path = %cli.config.display(), "Failed to load configuration");
            std::process::exit(1);
        }
    };

    info!("Validating configuration");
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!(error = %e, "Configuration validation error");
        }
        error!(
            error_count = errors.len(),
            "Configuration validation failed"
        );
        std::process::exit(1);
    }

    if cli.validate {
        let format = config.resolved_format();
        println!("Configuration is valid: {}", cli.config.display());
        println!(
            "  Transport: {}",
            if config.slack.is_webhook() {
                "webhook"
            } else {
                "web_api"
            }
        );
        println!(
            "  Mode: {}",
            if format.title.is_some() {
                "titled"
            } else {
                "plain"
            }
        );
        println!("  Channel: {}", format.channel);
        println!(
            "  Flush: every {}s or {} records",
            config.buffer.flush_interval.as_secs(),
            config.buffer.chunk_limit_records
        );
        println!(
            "  Metrics: {} (port {})",
            if config.metrics.enabled {
                "enabled"
            } else {
                "disabled"
            },
            config.metrics.port
        );
        return Ok(());
    }

    let runtime_config = config.compile()?;

    info!(
        config_path = %cli.config.display(),
        transport = runtime_config.transport.name(),
        "slackout starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(run(runtime_config, cli.input));

    // A pending stdin read holds a blocking-pool thread that never returns
    // while the writer keeps the pipe open.
    runtime.shutdown_timeout(Duration::from_secs(1));

    result
}

/// Main async entry point.
async fn run(runtime_config: RuntimeConfig, input: Option<std::path::PathBuf>) -> Result<()> {
    let RuntimeConfig {
        transport,
        http,
        post_options,
        formatter,
        identity,
        injector,
        default_tag,
        buffer,
        metrics,
    } = runtime_config;

    let http_client = build_http_client(&http)?;
    let client = client_from_transport(&transport, http_client);

    let cancel = CancellationToken::new();

    let metrics_handle = if metrics.enabled {
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        let server = MetricsServer::with_ready_signal(metrics.port, ready_tx);
        let cancel_metrics = cancel.clone();
        info!(port = metrics.port, "Starting metrics server");
        let handle = tokio::spawn(async move {
            if let Err(e) = server.run(cancel_metrics).await {
                error!(error = %e, "Metrics server error");
            }
        });
        if ready_rx.await.is_ok() {
            initialize_metrics(transport.name());
        }
        Some(handle)
    } else {
        info!("Metrics server disabled");
        None
    };

    let cancel_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c signal");
            return;
        }
        info!("Received shutdown signal, initiating graceful shutdown");
        cancel_signal.cancel();
    });

    let (tx, rx) = record_channel(&buffer);
    let flusher = Flusher::new(formatter, identity, client, post_options);
    let output = BufferedOutput::new(flusher, buffer, rx);
    let output_handle = tokio::spawn(output.run(cancel.clone()));

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open input {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let ingest_result = read_records(reader, &injector, &default_tag, tx, cancel.clone()).await;

    // The sender was moved into read_records, so the buffer sees end of
    // input and performs its final flush.
    let summary = output_handle.await.context("buffered output task failed")?;

    cancel.cancel();
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    match ingest_result {
        Ok(stats) => {
            info!(
                accepted = stats.accepted,
                rejected = stats.rejected,
                flushed = summary.chunks_flushed,
                dropped = summary.chunks_dropped,
                "slackout shutdown complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Input error");
            Err(anyhow::anyhow!("Input error: {}", e))
        }
    }
}

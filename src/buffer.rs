//! Buffered output loop.
//!
//! Records arrive over a bounded channel and accumulate into a chunk. A
//! chunk is flushed when it reaches `chunk_limit_records` or when the flush
//! interval ticks. A transient delivery failure retries the whole chunk with
//! exponential backoff; while retrying no records are consumed, so the
//! channel applies backpressure to the input. On shutdown or end of input
//! everything still buffered gets one final flush attempt.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::BufferConfig;
use crate::flush::Flusher;
use crate::notify::backoff_delay;
use crate::record::Record;

/// Create the channel between the input reader and [`BufferedOutput`].
pub fn record_channel(settings: &BufferConfig) -> (mpsc::Sender<Record>, mpsc::Receiver<Record>) {
    mpsc::channel(settings.queue_capacity.max(1))
}

/// Totals reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferSummary {
    pub records_received: u64,
    pub chunks_flushed: u64,
    pub chunks_dropped: u64,
    pub records_dropped: u64,
}

/// Owns the current chunk and drives flushes.
pub struct BufferedOutput {
    flusher: Flusher,
    settings: BufferConfig,
    rx: mpsc::Receiver<Record>,
    chunk: Vec<Record>,
    summary: BufferSummary,
}

impl BufferedOutput {
    pub fn new(flusher: Flusher, settings: BufferConfig, rx: mpsc::Receiver<Record>) -> Self {
        Self {
            flusher,
            settings,
            rx,
            chunk: Vec::new(),
            summary: BufferSummary::default(),
        }
    }

    /// Run until the input channel closes or `cancel` fires, then flush
    /// what is left once.
    pub async fn run(mut self, cancel: CancellationToken) -> BufferSummary {
        tracing::debug!(
            flush_interval_ms = self.settings.flush_interval.as_millis() as u64,
            chunk_limit = self.settings.chunk_limit_records,
            "Buffered output started"
        );

        let mut ticker = tokio::time::interval(self.settings.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::debug!("Buffered output cancelled");
                    break;
                }
                received = self.rx.recv() => {
                    match received {
                        Some(record) => {
                            self.push(record);
                            if self.chunk.len() >= self.settings.chunk_limit_records {
                                self.flush_chunk(&cancel).await;
                                ticker.reset();
                            }
                        }
                        None => {
                            tracing::debug!("Input closed");
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if !self.chunk.is_empty() {
                        self.flush_chunk(&cancel).await;
                    }
                }
            }
        }

        self.final_flush().await;

        tracing::info!(
            records = self.summary.records_received,
            chunks_flushed = self.summary.chunks_flushed,
            chunks_dropped = self.summary.chunks_dropped,
            "Buffered output stopped"
        );
        self.summary
    }

    fn push(&mut self, record: Record) {
        self.chunk.push(record);
        self.summary.records_received += 1;
        metrics::gauge!("slackout_buffer_records").set(self.chunk.len() as f64);
    }

    /// Flush the current chunk, retrying transient failures.
    ///
    /// If cancelled while waiting to retry, the chunk is put back so the
    /// final flush can try it once more.
    async fn flush_chunk(&mut self, cancel: &CancellationToken) {
        let mut chunk = std::mem::take(&mut self.chunk);
        metrics::gauge!("slackout_buffer_records").set(0.0);
        let mut attempt: u32 = 0;

        loop {
            let result = self.flusher.flush(&chunk).await;
            match result {
                Ok(outcome) => {
                    self.summary.chunks_flushed += 1;
                    metrics::counter!("slackout_flushes_total", "outcome" => outcome.label())
                        .increment(1);
                    return;
                }
                Err(e) => {
                    if attempt >= self.settings.retry_limit {
                        tracing::error!(
                            records = chunk.len(),
                            attempts = attempt + 1,
                            error = %e,
                            "Retry limit reached, dropping chunk"
                        );
                        self.drop_chunk(chunk.len());
                        return;
                    }

                    let delay = self.retry_delay(attempt);
                    tracing::warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        records = chunk.len(),
                        "Flush failed, retrying chunk"
                    );
                    metrics::counter!("slackout_flush_retries_total").increment(1);
                    attempt += 1;

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            chunk.append(&mut self.chunk);
                            self.chunk = chunk;
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Drain whatever is still queued and flush it once, without retries.
    async fn final_flush(&mut self) {
        while let Ok(record) = self.rx.try_recv() {
            self.push(record);
        }
        if self.chunk.is_empty() {
            return;
        }

        let chunk = std::mem::take(&mut self.chunk);
        metrics::gauge!("slackout_buffer_records").set(0.0);
        tracing::info!(records = chunk.len(), "Flushing remaining records");

        let result = self.flusher.flush(&chunk).await;
        match result {
            Ok(outcome) => {
                self.summary.chunks_flushed += 1;
                metrics::counter!("slackout_flushes_total", "outcome" => outcome.label())
                    .increment(1);
            }
            Err(e) => {
                tracing::error!(
                    records = chunk.len(),
                    error = %e,
                    "Final flush failed, dropping chunk"
                );
                self.drop_chunk(chunk.len());
            }
        }
    }

    fn drop_chunk(&mut self, records: usize) {
        self.summary.chunks_dropped += 1;
        self.summary.records_dropped += records as u64;
        metrics::counter!("slackout_flushes_total", "outcome" => "dropped").increment(1);
        metrics::counter!("slackout_chunks_dropped_total").increment(1);
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        backoff_delay(
            attempt,
            self.settings.retry_wait,
            self.settings.max_retry_wait,
        )
    }
}

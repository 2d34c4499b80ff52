//! Flush driver: turns one chunk of records into Slack messages and posts
//! them.
//!
//! Payloads are posted one channel at a time in first-occurrence order.
//! The first failure stops the flush:
//!
//! - a transient failure (timeout) is returned so the caller retries the
//!   whole chunk, including channels that were already posted;
//! - any other failure is logged and the rest of the chunk is discarded.

use std::sync::Arc;
use tracing::Instrument;

use crate::error::DeliveryError;
use crate::group::group;
use crate::notify::{ChatClient, PostOptions};
use crate::payload::{Payload, SenderIdentity, build_payloads};
use crate::record::Record;
use crate::template::MessageFormatter;

/// Result of a flush that did not need a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Every payload was accepted.
    Delivered { sent: usize },
    /// A permanent error stopped delivery after `sent` of `total` payloads.
    Discarded { sent: usize, total: usize },
}

impl FlushOutcome {
    /// Label used in the `outcome` metric dimension.
    pub fn label(&self) -> &'static str {
        match self {
            FlushOutcome::Delivered { .. } => "delivered",
            FlushOutcome::Discarded { .. } => "discarded",
        }
    }
}

/// Renders, groups and delivers chunks of records.
pub struct Flusher {
    formatter: MessageFormatter,
    identity: SenderIdentity,
    client: Arc<dyn ChatClient>,
    options: PostOptions,
}

impl Flusher {
    pub fn new(
        formatter: MessageFormatter,
        identity: SenderIdentity,
        client: Arc<dyn ChatClient>,
        options: PostOptions,
    ) -> Self {
        Self {
            formatter,
            identity,
            client,
            options,
        }
    }

    /// Group `records` and build one payload per channel.
    pub fn build_payloads(&self, records: &[Record]) -> Vec<Payload> {
        build_payloads(group(records, &self.formatter), &self.identity)
    }

    /// Post `payloads` in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the error only when it is transient. Permanent errors are
    /// logged and reported as [`FlushOutcome::Discarded`].
    pub async fn deliver(&self, payloads: &[Payload]) -> Result<FlushOutcome, DeliveryError> {
        let transport = self.client.name().to_string();
        let mut sent = 0;

        for payload in payloads {
            let span = tracing::info_span!("send_message", channel = %payload.channel);
            let result = self
                .client
                .post_message(payload, &self.options)
                .instrument(span)
                .await;

            match result {
                Ok(()) => {
                    sent += 1;
                    metrics::counter!(
                        "slackout_messages_sent_total",
                        "transport" => transport.clone()
                    )
                    .increment(1);
                }
                Err(e) => {
                    metrics::counter!(
                        "slackout_delivery_errors_total",
                        "transport" => transport.clone(),
                        "error_class" => e.class()
                    )
                    .increment(1);

                    if e.is_transient() {
                        tracing::warn!(
                            channel = %payload.channel,
                            error = %e,
                            "Timed out posting message, flush will be retried"
                        );
                        return Err(e);
                    }

                    tracing::error!(
                        channel = %payload.channel,
                        error = %e,
                        error_class = e.class(),
                        discarded = payloads.len() - sent,
                        "Failed to post message, discarding the rest of this flush"
                    );
                    tracing::trace!(detail = ?e, "Delivery error detail");
                    return Ok(FlushOutcome::Discarded {
                        sent,
                        total: payloads.len(),
                    });
                }
            }
        }

        Ok(FlushOutcome::Delivered { sent })
    }

    /// Build and deliver one chunk. An empty chunk posts nothing.
    pub async fn flush(&self, records: &[Record]) -> Result<FlushOutcome, DeliveryError> {
        if records.is_empty() {
            return Ok(FlushOutcome::Delivered { sent: 0 });
        }

        let payloads = self.build_payloads(records);
        let span = tracing::info_span!(
            "flush",
            records = records.len(),
            payloads = payloads.len()
        );
        self.deliver(&payloads).instrument(span).await
    }
}

impl std::fmt::Debug for Flusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flusher")
            .field("client", &self.client)
            .field("mode", &self.formatter.mode())
            .field("options", &self.options)
            .finish()
    }
}

//! Report pipeline: classify, fetch, render and deliver alarm reports.
//!
//! This module implements the core orchestration logic. Events of a batch
//! are processed one at a time, in input order, so Slack messages arrive in
//! the same order as the alarms:
//!
//! ```text
//! handle(raw)
//!     |
//!     +-- split_payload --> event 1 --> parse --> classify --> fetch --> render --> deliver (retry)
//!     +-----------------> event 2 --> ...
//!     +-----------------> event n --> ...
//! ```
//!
//! A failure stops only the event it belongs to. All failures are
//! collected into a [`BatchError`] once every event has been processed.
//!
//! # Example
//!
//! ```ignore
//! use usage_limit_reporter::pipeline::{PipelineConfig, ReportPipeline};
//! use tokio_util::sync::CancellationToken;
//!
//! let pipeline = ReportPipeline::new(fetcher, notifier, PipelineConfig::new("C0123"));
//! let outcomes = pipeline.handle(&raw, &CancellationToken::new()).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::error::{BatchError, EventFailure, NotifyError, ReportError};
use crate::message::{AlarmMessage, IncomingEvent, split_payload};
use crate::metrics::{
    EVENTS_SKIPPED_TOTAL, RATE_LIMITED_TOTAL, REPORT_ERRORS_TOTAL, REPORTS_SENT_TOTAL,
};
use crate::notify::Notifier;
use crate::template::{RenderedReport, ReportRenderer, SenderIdentity};
use crate::usage_limit::UsageLimitFetcher;

/// Default number of delivery retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Settings consumed by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Slack channel reports go to unless the template overrides it.
    pub destination: String,
    /// Retries on rate limiting; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Template source replacing the built-in one.
    pub template: Option<String>,
}

impl PipelineConfig {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            template: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }
}

/// Result of processing one event that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The report reached the destination.
    Delivered { delivery_id: String, attempts: u32 },
    /// The alarm is not about a usage limit; nothing was done.
    Skipped,
}

/// Delivery retry state.
///
/// `Attempting(n)` means attempt `n + 1` is about to be made. `n` only ever
/// grows up to `max_retries`, so at most `max_retries + 1` attempts happen.
#[derive(Debug)]
enum DeliveryState {
    Attempting(u32),
    Delivered { delivery_id: String, attempts: u32 },
    /// Still rate limited after the last allowed attempt, or cancelled
    /// while waiting to retry.
    Exhausted { attempts: u32, last: NotifyError },
    Failed { error: ReportError },
}

/// Orchestrates report generation for alarm events.
pub struct ReportPipeline {
    fetcher: Arc<dyn UsageLimitFetcher>,
    notifier: Arc<dyn Notifier>,
    renderer: ReportRenderer,
    destination: String,
    max_retries: u32,
}

impl ReportPipeline {
    /// Create a pipeline. The sender identity is detected from the
    /// environment.
    pub fn new(
        fetcher: Arc<dyn UsageLimitFetcher>,
        notifier: Arc<dyn Notifier>,
        config: PipelineConfig,
    ) -> Self {
        Self::with_sender(fetcher, notifier, config, SenderIdentity::from_env())
    }

    /// Create a pipeline with an explicit sender identity.
    pub fn with_sender(
        fetcher: Arc<dyn UsageLimitFetcher>,
        notifier: Arc<dyn Notifier>,
        config: PipelineConfig,
        sender: SenderIdentity,
    ) -> Self {
        Self {
            fetcher,
            notifier,
            renderer: ReportRenderer::new(config.template, sender),
            destination: config.destination,
            max_retries: config.max_retries,
        }
    }

    /// Process a raw request: an SNS event or a single alarm message.
    ///
    /// Every event is processed even if earlier ones fail.
    ///
    /// # Returns
    ///
    /// * `Ok(outcomes)` - one outcome per event, in input order
    /// * `Err(BatchError)` - at least one event failed; lists each failure once
    pub async fn handle(
        &self,
        raw: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Vec<ReportOutcome>, BatchError> {
        let events = split_payload(raw);
        let total = events.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut failures = Vec::new();

        debug!(event_count = total, "Processing alarm events");

        for (index, event) in events.into_iter().enumerate() {
            let IncomingEvent { message_id, body } = event;
            let span = tracing::info_span!(
                "alarm_event",
                index = index,
                sns_message_id = message_id.as_deref().unwrap_or("")
            );

            let result = if cancel.is_cancelled() {
                Err(ReportError::Cancelled)
            } else {
                self.process_event(&body, cancel).instrument(span).await
            };

            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => {
                    metrics::counter!(REPORT_ERRORS_TOTAL, "stage" => error.stage())
                        .increment(1);
                    failures.push(EventFailure {
                        index,
                        message_id,
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(outcomes)
        } else {
            Err(BatchError { total, failures })
        }
    }

    /// Process one raw alarm message.
    pub async fn process_event(
        &self,
        body: &[u8],
        cancel: &CancellationToken,
    ) -> Result<ReportOutcome, ReportError> {
        let message = match AlarmMessage::from_slice(body) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Failed to unmarshal alarm message");
                return Err(e.into());
            }
        };

        let span = tracing::info_span!(
            "report",
            alarm_name = %message.alarm_name,
            alarm_description = message.alarm_description.as_deref().unwrap_or("")
        );

        async {
            if !message.is_usage_limit_alarm() {
                debug!(
                    reason = "not a redshift serverless usage limit alarm",
                    "Skipping alarm"
                );
                metrics::counter!(EVENTS_SKIPPED_TOTAL).increment(1);
                return Ok(ReportOutcome::Skipped);
            }

            match self.send_report(&message, cancel).await {
                Ok(outcome) => Ok(outcome),
                Err(e) => {
                    error!(stage = e.stage(), error = %e, "Failed to send report");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Fetch, render and deliver the report for a usage limit alarm.
    pub async fn send_report(
        &self,
        message: &AlarmMessage,
        cancel: &CancellationToken,
    ) -> Result<ReportOutcome, ReportError> {
        let usage_limit_id = message.usage_limit_id();

        let usage_limit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReportError::Cancelled),
            result = self.fetcher.fetch(usage_limit_id) => result?,
        };
        debug!(
            usage_limit_id = %usage_limit.usage_limit_id,
            usage_type = ?usage_limit.usage_type,
            "Usage limit fetched"
        );

        let report = self.renderer.render(message, &usage_limit)?;

        let (delivery_id, attempts) = self.deliver_with_retry(&report, cancel).await?;
        info!(
            destination = %self.destination,
            delivery_id = %delivery_id,
            attempts = attempts,
            "Report delivered"
        );
        metrics::counter!(REPORTS_SENT_TOTAL).increment(1);

        Ok(ReportOutcome::Delivered {
            delivery_id,
            attempts,
        })
    }

    /// Deliver a report, retrying while the destination rate limits.
    ///
    /// Waits exactly the `retry_after` the destination asked for between
    /// attempts. Any other error fails immediately. Cancellation is checked
    /// before each attempt and during the wait, never during a delivery call.
    ///
    /// # Returns
    ///
    /// The delivery id and the number of attempts made.
    pub async fn deliver_with_retry(
        &self,
        report: &RenderedReport,
        cancel: &CancellationToken,
    ) -> Result<(String, u32), ReportError> {
        let mut state = DeliveryState::Attempting(0);

        loop {
            state = match state {
                DeliveryState::Attempting(n) => self.attempt(n, report, cancel).await,
                DeliveryState::Delivered {
                    delivery_id,
                    attempts,
                } => return Ok((delivery_id, attempts)),
                DeliveryState::Exhausted { attempts, last } => {
                    return Err(ReportError::RateLimited { attempts, last });
                }
                DeliveryState::Failed { error } => return Err(error),
            };
        }
    }

    /// Make delivery attempt `n + 1` and compute the next state.
    async fn attempt(
        &self,
        n: u32,
        report: &RenderedReport,
        cancel: &CancellationToken,
    ) -> DeliveryState {
        if cancel.is_cancelled() {
            return DeliveryState::Failed {
                error: ReportError::Cancelled,
            };
        }

        // A started call runs to completion: the message may already be posted.
        let result = self.notifier.deliver(&self.destination, report).await;

        let retry_after = match result {
            Ok(delivery_id) => {
                return DeliveryState::Delivered {
                    delivery_id,
                    attempts: n + 1,
                };
            }
            Err(NotifyError::RateLimited { retry_after }) => retry_after,
            Err(e) => return DeliveryState::Failed { error: e.into() },
        };

        metrics::counter!(RATE_LIMITED_TOTAL).increment(1);
        let last = NotifyError::RateLimited { retry_after };
        if n >= self.max_retries {
            return DeliveryState::Exhausted {
                attempts: n + 1,
                last,
            };
        }

        warn!(
            attempt = n + 1,
            max_retries = self.max_retries,
            retry_after_ms = retry_after.as_millis() as u64,
            "Destination rate limited, retrying"
        );
        if wait_retry_after(retry_after, cancel).await {
            DeliveryState::Attempting(n + 1)
        } else {
            warn!("Cancelled while waiting to retry delivery");
            DeliveryState::Exhausted {
                attempts: n + 1,
                last,
            }
        }
    }
}

/// Sleep for `retry_after`. Returns `false` if cancelled first.
async fn wait_retry_after(retry_after: Duration, cancel: &CancellationToken) -> bool {
    if retry_after.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(retry_after) => true,
    }
}

impl std::fmt::Debug for ReportPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportPipeline")
            .field("notifier", &self.notifier)
            .field("renderer", &self.renderer)
            .field("destination", &self.destination)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

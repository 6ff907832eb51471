//! Centralized error types for usage-limit-reporter using thiserror.
//!
//! Every failure a single alarm event can hit is a [`ReportError`]. The
//! batch entry point collects them into a [`BatchError`] so that one bad
//! event never hides another.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors related to configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load report template: {0}")]
    LoadError(String),
    #[error("invalid configuration: {0}")]
    ValidationError(String),
    #[error("invalid report template '{source_name}': {message}")]
    InvalidTemplate {
        source_name: String,
        message: String,
    },
}

/// Errors related to alarm payload parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
}

/// Errors returned by a usage limit lookup.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("usage limit API call failed: {0}")]
    Api(String),
    #[error("usage limit '{usage_limit_id}' not found")]
    NotFound { usage_limit_id: String },
}

/// Errors related to report rendering.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template render failed: {message}")]
    RenderFailed { message: String },
    #[error("rendered report is not a valid message: {message}")]
    DecodeFailed { message: String },
}

/// Errors returned by a notifier for a single delivery attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("failed to send notification: {0}")]
    SendFailed(String),
}

impl NotifyError {
    /// Whether this error asks the caller to retry later.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, NotifyError::RateLimited { .. })
    }
}

/// Terminal failure for one alarm event.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to unmarshal message: {0}")]
    Parse(#[from] ParseError),
    #[error("failed to get usage limit: {0}")]
    Fetch(#[from] FetchError),
    #[error("failed to render report: {0}")]
    Render(#[from] TemplateError),
    #[error("failed to deliver report: {0}")]
    Delivery(#[from] NotifyError),
    /// Delivery stopped while the destination was still rate limiting.
    /// `last` is the rate-limit error of the final attempt.
    #[error("delivery rate limited after {attempts} attempt(s): {last}")]
    RateLimited { attempts: u32, last: NotifyError },
    #[error("cancelled before the report was delivered")]
    Cancelled,
}

impl ReportError {
    /// Pipeline stage label used in logs and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            ReportError::Parse(_) => "parse",
            ReportError::Fetch(_) => "fetch",
            ReportError::Render(_) => "render",
            ReportError::Delivery(_) | ReportError::RateLimited { .. } => "deliver",
            ReportError::Cancelled => "cancelled",
        }
    }
}

/// A failed event inside a batch.
#[derive(Debug)]
pub struct EventFailure {
    /// Zero-based position of the event in the input.
    pub index: usize,
    /// SNS message id, when the event came wrapped in an SNS record.
    pub message_id: Option<String>,
    pub error: ReportError,
}

impl fmt::Display for EventFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message_id {
            Some(id) => write!(f, "event #{} (sns message {}): {}", self.index, id, self.error),
            None => write!(f, "event #{}: {}", self.index, self.error),
        }
    }
}

/// Aggregate error for a batch in which at least one event failed.
#[derive(Debug)]
pub struct BatchError {
    /// Number of events in the batch.
    pub total: usize,
    pub failures: Vec<EventFailure>,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} event(s) failed", self.failures.len(), self.total)?;
        for failure in &self.failures {
            write!(f, "\n{}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchError {}

// src/lib.rs
//! usage-limit-reporter - Redshift Serverless usage limit alarms to Slack.

pub mod cli;
pub mod config;
pub mod error;
pub mod message;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod template;
pub mod usage_limit;

// Re-export commonly used types
pub use cli::LogFormat;
pub use error::{BatchError, ReportError};
pub use message::AlarmMessage;
pub use crate::metrics::register_metric_descriptions;
pub use notify::{Notifier, SlackNotifier};
pub use pipeline::{PipelineConfig, ReportOutcome, ReportPipeline};
pub use template::{RenderedReport, ReportRenderer, SenderIdentity};
pub use usage_limit::{RedshiftServerlessFetcher, UsageLimitDetails, UsageLimitFetcher};

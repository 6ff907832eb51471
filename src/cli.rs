//! Command-line interface for usage-limit-reporter using clap.
//!
//! Every flag also reads an environment variable, so the binary can be
//! configured entirely from a Lambda-style environment.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::notify::DEFAULT_SLACK_API_URL;
use crate::pipeline::DEFAULT_MAX_RETRIES;

/// Payload path meaning "read from stdin".
pub const STDIN_PAYLOAD: &str = "-";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format for log aggregation.
    Json,
}

/// Post Redshift Serverless usage limit alarms to Slack.
#[derive(Parser, Debug)]
#[command(name = "usage-limit-reporter")]
#[command(version)]
#[command(about = "Post Redshift Serverless usage limit alarms to Slack")]
pub struct Cli {
    /// Slack bot token with chat:write scope.
    #[arg(long = "slack-bot-token", env = "SLACK_BOT_TOKEN", hide_env_values = true)]
    pub slack_bot_token: Option<String>,

    /// Default Slack channel for reports.
    #[arg(long = "slack-channel", env = "SLACK_CHANNEL")]
    pub slack_channel: Option<String>,

    /// Slack Web API base URL.
    #[arg(long = "slack-api-url", env = "SLACK_API_URL", default_value = DEFAULT_SLACK_API_URL)]
    pub slack_api_url: String,

    /// Report template file replacing the built-in one.
    #[arg(long = "report-template-file", env = "REPORT_TEMPLATE_FILE")]
    pub report_template_file: Option<PathBuf>,

    /// Retries when Slack rate limits a message.
    #[arg(
        long = "send-message-max-retry",
        env = "SEND_MESSAGE_MAX_RETRY",
        default_value_t = DEFAULT_MAX_RETRIES
    )]
    pub send_message_max_retry: u32,

    /// Alarm payload file: an SNS event or a single alarm message ("-" for stdin).
    #[arg(short = 'p', long = "payload", env = "PAYLOAD_FILE", default_value = STDIN_PAYLOAD)]
    pub payload: PathBuf,

    /// Base log level (RUST_LOG directives still apply).
    #[arg(long = "log-level", env = "LOG_LEVEL", default_value = "info")]
    pub log_level: tracing::Level,

    /// Validate configuration and exit.
    #[arg(long = "validate")]
    pub validate: bool,

    /// Log format: text or json.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text, env = "LOG_FORMAT")]
    pub log_format: LogFormat,
}

impl Cli {
    /// Whether the payload comes from stdin.
    pub fn payload_from_stdin(&self) -> bool {
        self.payload.as_os_str() == STDIN_PAYLOAD
    }
}

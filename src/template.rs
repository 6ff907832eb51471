//! Report rendering for Slack notifications.
//!
//! This module turns an alarm message and the fetched usage limit into a
//! Slack message using a Jinja-style template powered by minijinja. The
//! template must render a JSON object:
//!
//! ```text
//! {"text": "...", "blocks": [...], "attachments": [...], "<any chat.postMessage parameter>": ...}
//! ```
//!
//! The template sees exactly five variables: `Message` (the alarm, with
//! CloudWatch field names), `UsageLimit` (the API field names),
//! `WorkGroupName`, `UsageLimitAmountUnit` and `SenderInfo`.
//!
//! # Example
//!
//! ```ignore
//! use usage_limit_reporter::template::ReportRenderer;
//!
//! let renderer = ReportRenderer::new(None, SenderIdentity::from_env());
//! let report = renderer.render(&message, &usage_limit)?;
//! ```

use crate::error::TemplateError;
use crate::message::AlarmMessage;
use crate::usage_limit::UsageLimitDetails;
use minijinja::{Environment, UndefinedBehavior};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Template used when no override is configured.
pub const DEFAULT_REPORT_TEMPLATE: &str = include_str!("default_report.json.j2");

/// Name reported when not running inside a Lambda function.
pub const FALLBACK_SENDER_NAME: &str = "usage-limit-reporter";

/// Environment variables set by the Lambda runtime.
const ENV_LAMBDA_FUNCTION_NAME: &str = "AWS_LAMBDA_FUNCTION_NAME";
const ENV_LAMBDA_FUNCTION_VERSION: &str = "AWS_LAMBDA_FUNCTION_VERSION";

/// Slack message produced by the template.
///
/// `text`, `blocks` and `attachments` may all be present; any other key of
/// the rendered object is kept in `parameters` and forwarded to Slack as is
/// (`channel`, `username`, `icon_emoji`, `unfurl_links`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderedReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "nullable_vec", skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Value>,
    #[serde(default, deserialize_with = "nullable_vec", skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Value>,
    #[serde(flatten)]
    pub parameters: Map<String, Value>,
}

fn nullable_vec<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl RenderedReport {
    /// Decode the raw template output.
    ///
    /// # Errors
    ///
    /// `TemplateError::DecodeFailed` if the output is not a JSON object or a
    /// known field has the wrong type.
    pub fn from_json(output: &str) -> Result<Self, TemplateError> {
        let mut report: RenderedReport =
            serde_json::from_str(output).map_err(|e| TemplateError::DecodeFailed {
                message: e.to_string(),
            })?;
        if report.text.as_deref() == Some("") {
            report.text = None;
        }
        Ok(report)
    }

    /// Channel override requested by the template, if any.
    pub fn channel_override(&self) -> Option<&str> {
        self.parameters
            .get("channel")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
    }
}

/// Identity of the process sending reports, shown in `SenderInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderIdentity {
    /// Running as a Lambda function.
    Lambda { name: String, version: String },
    /// Running anywhere else.
    Standalone,
}

impl SenderIdentity {
    /// Detect the identity from the Lambda runtime environment variables.
    pub fn from_env() -> Self {
        match std::env::var(ENV_LAMBDA_FUNCTION_NAME) {
            Ok(name) if !name.is_empty() => SenderIdentity::Lambda {
                name,
                version: std::env::var(ENV_LAMBDA_FUNCTION_VERSION).unwrap_or_default(),
            },
            _ => SenderIdentity::Standalone,
        }
    }

    /// Build the `SenderInfo` line for an alarm.
    pub fn sender_info(&self, message: &AlarmMessage) -> String {
        let mut info = String::from("this report was sent by ");
        match self {
            SenderIdentity::Lambda { name, version } => {
                info.push_str(&format!("lambda function {} (version: {})", name, version));
            }
            SenderIdentity::Standalone => info.push_str(FALLBACK_SENDER_NAME),
        }
        if !message.alarm_arn.is_empty() {
            info.push_str("\ntriggered by ");
            info.push_str(&message.alarm_arn);
        }
        info
    }
}

/// Variables exposed to the report template.
#[derive(Debug, Serialize)]
struct ReportContext<'a> {
    #[serde(rename = "Message")]
    message: &'a AlarmMessage,
    #[serde(rename = "UsageLimit")]
    usage_limit: &'a UsageLimitDetails,
    #[serde(rename = "WorkGroupName")]
    workgroup_name: &'a str,
    #[serde(rename = "UsageLimitAmountUnit")]
    usage_limit_amount_unit: &'static str,
    #[serde(rename = "SenderInfo")]
    sender_info: String,
}

/// Renders reports from a single template.
///
/// Undefined variables are errors: a template that reads a field the
/// context does not have fails instead of silently printing nothing.
pub struct ReportRenderer {
    env: Environment<'static>,
    source: String,
    sender: SenderIdentity,
}

impl ReportRenderer {
    /// Create a renderer. `template` overrides [`DEFAULT_REPORT_TEMPLATE`].
    pub fn new(template: Option<String>, sender: SenderIdentity) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self {
            env,
            source: template.unwrap_or_else(|| DEFAULT_REPORT_TEMPLATE.to_string()),
            sender,
        }
    }

    /// Whether this renderer uses the built-in template.
    pub fn is_default_template(&self) -> bool {
        self.source == DEFAULT_REPORT_TEMPLATE
    }

    /// Render and decode a report.
    ///
    /// # Errors
    ///
    /// * `TemplateError::RenderFailed` - template syntax error or access to
    ///   an undefined value.
    /// * `TemplateError::DecodeFailed` - output is not a valid message.
    pub fn render(
        &self,
        message: &AlarmMessage,
        usage_limit: &UsageLimitDetails,
    ) -> Result<RenderedReport, TemplateError> {
        let output = self.render_raw(message, usage_limit)?;
        tracing::trace!(output_len = output.len(), "Report template rendered");
        RenderedReport::from_json(&output)
    }

    /// Render the template without decoding the output.
    pub fn render_raw(
        &self,
        message: &AlarmMessage,
        usage_limit: &UsageLimitDetails,
    ) -> Result<String, TemplateError> {
        let context = ReportContext {
            message,
            usage_limit,
            workgroup_name: message.workgroup_name(),
            usage_limit_amount_unit: usage_limit.usage_type.amount_unit(),
            sender_info: self.sender.sender_info(message),
        };
        self.env
            .render_str(&self.source, &context)
            .map_err(|e| TemplateError::RenderFailed {
                message: e.to_string(),
            })
    }
}

impl std::fmt::Debug for ReportRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportRenderer")
            .field("default_template", &self.is_default_template())
            .field("sender", &self.sender)
            .finish()
    }
}

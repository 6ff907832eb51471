//! Slack notifier implementation.
//!
//! Implements the `Notifier` trait on top of the Slack Web API
//! (`chat.postMessage`) using a bot token.

use crate::config::SecretString;
use crate::error::NotifyError;
use crate::notify::Notifier;
use crate::template::RenderedReport;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// Base URL of the Slack Web API.
pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";

/// Wait suggested when Slack rate limits without a usable `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Slack error code for rate limiting reported in a 200 response body.
const SLACK_RATELIMITED: &str = "ratelimited";

/// Common envelope of Slack Web API responses.
#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

/// Identity returned by `auth.test`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackIdentity {
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    identity: SlackIdentity,
}

/// Build the `chat.postMessage` body for a report.
///
/// Extra template parameters go first so that the message content keys
/// always win. `channel` keeps the template's override when it has one.
fn build_slack_payload(destination: &str, report: &RenderedReport) -> Map<String, Value> {
    let mut payload = report.parameters.clone();
    let channel = report.channel_override().unwrap_or(destination).to_string();
    payload.insert("channel".to_string(), Value::String(channel));
    if let Some(text) = &report.text {
        payload.insert("text".to_string(), Value::String(text.clone()));
    }
    if !report.blocks.is_empty() {
        payload.insert("blocks".to_string(), Value::Array(report.blocks.clone()));
    }
    if !report.attachments.is_empty() {
        payload.insert(
            "attachments".to_string(),
            Value::Array(report.attachments.clone()),
        );
    }
    payload
}

/// Read `Retry-After` (whole seconds), falling back to one second.
fn parse_retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// Slack notifier implementation.
///
/// # Error classification
///
/// - **HTTP 429**: `RateLimited`, wait taken from `Retry-After`
/// - **`ok: false` with `ratelimited`**: `RateLimited`, one second
/// - **Anything else that is not `ok: true`**: `SendFailed`
pub struct SlackNotifier {
    /// Unique name for this notifier instance.
    name: String,
    /// HTTP client for Slack requests.
    client: reqwest::Client,
    /// Web API base URL without trailing slash.
    api_url: String,
    /// Bot token (never logged).
    token: SecretString,
}

impl SlackNotifier {
    /// Create a new Slack notifier.
    ///
    /// # Arguments
    ///
    /// * `name` - Unique name for this notifier instance
    /// * `api_url` - Web API base URL, usually [`DEFAULT_SLACK_API_URL`]
    /// * `token` - Bot token with `chat:write`
    /// * `client` - HTTP client
    pub fn new(name: String, api_url: &str, token: SecretString, client: reqwest::Client) -> Self {
        Self {
            name,
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_url, method)
    }

    /// Check the token with `auth.test`.
    ///
    /// # Errors
    ///
    /// `NotifyError::SendFailed` if the request fails or Slack rejects the
    /// token.
    pub async fn auth_test(&self) -> Result<SlackIdentity, NotifyError> {
        let response = self
            .client
            .post(self.method_url("auth.test"))
            .bearer_auth(self.token.expose())
            .send()
            .await
            .map_err(|e| NotifyError::SendFailed(format!("auth.test request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::SendFailed(format!(
                "auth.test returned status {}",
                status
            )));
        }

        let body: AuthTestResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::SendFailed(format!("invalid auth.test response: {}", e)))?;
        if !body.ok {
            return Err(NotifyError::SendFailed(format!(
                "slack authentication failed: {}",
                body.error.as_deref().unwrap_or("unknown_error")
            )));
        }

        tracing::info!(
            bot_id = ?body.identity.bot_id,
            team_id = ?body.identity.team_id,
            user_id = ?body.identity.user_id,
            "Slack client authenticated"
        );
        Ok(body.identity)
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn notifier_type(&self) -> &str {
        "slack"
    }

    async fn deliver(
        &self,
        destination: &str,
        report: &RenderedReport,
    ) -> Result<String, NotifyError> {
        let payload = build_slack_payload(destination, report);
        let channel = payload
            .get("channel")
            .and_then(Value::as_str)
            .unwrap_or(destination)
            .to_string();

        let response = self
            .client
            .post(self.method_url("chat.postMessage"))
            .bearer_auth(self.token.expose())
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::SendFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers());
            tracing::warn!(
                channel = %channel,
                retry_after_ms = retry_after.as_millis() as u64,
                "Slack rate limit exceeded"
            );
            return Err(NotifyError::RateLimited { retry_after });
        }
        if !status.is_success() {
            tracing::error!(channel = %channel, status = %status, "Slack returned an error status");
            return Err(NotifyError::SendFailed(format!("unexpected status: {}", status)));
        }

        let body: SlackResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::SendFailed(format!("invalid response body: {}", e)))?;

        if !body.ok {
            let error = body.error.unwrap_or_else(|| "unknown_error".to_string());
            if error == SLACK_RATELIMITED {
                tracing::warn!(channel = %channel, "Slack rate limit exceeded");
                return Err(NotifyError::RateLimited {
                    retry_after: DEFAULT_RETRY_AFTER,
                });
            }
            tracing::error!(channel = %channel, error = %error, "Slack rejected the message");
            return Err(NotifyError::SendFailed(format!("slack api error: {}", error)));
        }

        let ts = body.ts.unwrap_or_default();
        tracing::info!(channel = %channel, ts = %ts, "Slack message sent");
        Ok(ts)
    }
}

impl std::fmt::Debug for SlackNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackNotifier")
            .field("name", &self.name)
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    fn make_report() -> RenderedReport {
        RenderedReport {
            text: Some("usage limit reached".to_string()),
            blocks: vec![json!({"type": "divider"})],
            attachments: vec![],
            parameters: Map::new(),
        }
    }

    #[test]
    fn payload_uses_destination_channel() {
        let payload = build_slack_payload("C-DEFAULT", &make_report());

        assert_eq!(payload["channel"], "C-DEFAULT");
        assert_eq!(payload["text"], "usage limit reached");
        assert_eq!(payload["blocks"], json!([{"type": "divider"}]));
        assert!(!payload.contains_key("attachments"));
    }

    #[test]
    fn payload_honors_channel_override_and_parameters() {
        let mut report = make_report();
        report
            .parameters
            .insert("channel".to_string(), json!("C-OVERRIDE"));
        report
            .parameters
            .insert("icon_emoji".to_string(), json!(":warning:"));
        report.attachments = vec![json!({"color": "#ff0000"})];

        let payload = build_slack_payload("C-DEFAULT", &report);

        assert_eq!(payload["channel"], "C-OVERRIDE");
        assert_eq!(payload["icon_emoji"], ":warning:");
        assert_eq!(payload["attachments"], json!([{"color": "#ff0000"}]));
    }

    #[test]
    fn payload_without_text() {
        let report = RenderedReport {
            text: None,
            ..make_report()
        };
        let payload = build_slack_payload("C1", &report);
        assert!(!payload.contains_key("text"));
    }

    #[test]
    fn retry_after_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), DEFAULT_RETRY_AFTER);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(parse_retry_after(&headers), Duration::from_secs(30));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), DEFAULT_RETRY_AFTER);
    }

    #[test]
    fn slack_notifier_properties() {
        let notifier = SlackNotifier::new(
            "slack".to_string(),
            "https://slack.example.com/api/",
            SecretString::new("xoxb-secret".to_string()),
            reqwest::Client::new(),
        );

        assert_eq!(notifier.name(), "slack");
        assert_eq!(notifier.notifier_type(), "slack");
        assert_eq!(
            notifier.method_url("chat.postMessage"),
            "https://slack.example.com/api/chat.postMessage"
        );
    }

    #[test]
    fn slack_notifier_debug_hides_token() {
        let notifier = SlackNotifier::new(
            "slack".to_string(),
            DEFAULT_SLACK_API_URL,
            SecretString::new("xoxb-secret".to_string()),
            reqwest::Client::new(),
        );
        let debug = format!("{:?}", notifier);
        assert!(debug.contains("SlackNotifier"));
        assert!(!debug.contains("xoxb-secret"));
    }
}

//! CloudWatch alarm payloads and their SNS envelope.
//!
//! The reporter is subscribed to an SNS topic that CloudWatch publishes
//! alarm state changes to, but it also accepts a bare alarm message (handy
//! when replaying a payload by hand). [`split_payload`] detects which shape
//! arrived and yields one [`IncomingEvent`] per alarm:
//!
//! ```text
//! {"Records":[{"Sns":{"MessageId":"..","Message":"{\"AlarmName\":..}"}}]}  -> N events
//! {"AlarmName":"..","Trigger":{..}}                                         -> 1 event
//! ```

use crate::error::ParseError;
use serde::{Deserialize, Deserializer, Serialize};

/// Metric published by Redshift Serverless for usage limits.
pub const USAGE_LIMIT_METRIC_NAME: &str = "UsageLimitAvailable";

/// CloudWatch namespace of Redshift Serverless metrics.
pub const USAGE_LIMIT_NAMESPACE: &str = "AWS/Redshift-Serverless";

const WORKGROUP_DIMENSION: &str = "Workgroup";
const USAGE_LIMIT_ID_DIMENSION: &str = "UsageLimitId";

/// Alarm state change notification as published by CloudWatch.
///
/// Field names follow the CloudWatch schema in both directions, so report
/// templates address them as `Message.AlarmName`, `Message.AlarmArn`, ...
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AlarmMessage {
    #[serde(deserialize_with = "null_as_default")]
    pub alarm_name: String,
    pub alarm_description: Option<String>,
    #[serde(rename = "AWSAccountId", deserialize_with = "null_as_default")]
    pub aws_account_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub alarm_configuration_updated_timestamp: String,
    #[serde(deserialize_with = "null_as_default")]
    pub new_state_value: String,
    #[serde(deserialize_with = "null_as_default")]
    pub new_state_reason: String,
    #[serde(deserialize_with = "null_as_default")]
    pub old_state_value: String,
    #[serde(deserialize_with = "null_as_default")]
    pub state_change_time: String,
    #[serde(deserialize_with = "null_as_default")]
    pub region: String,
    #[serde(deserialize_with = "null_as_default")]
    pub alarm_arn: String,
    #[serde(deserialize_with = "null_as_default")]
    pub trigger: Trigger,
}

/// Metric and threshold that triggered the alarm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Trigger {
    #[serde(deserialize_with = "null_as_default")]
    pub metric_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub namespace: String,
    #[serde(deserialize_with = "null_as_default")]
    pub statistic_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub statistic: String,
    pub unit: serde_json::Value,
    #[serde(deserialize_with = "null_as_default")]
    pub dimensions: Vec<Dimension>,
    #[serde(deserialize_with = "null_as_default")]
    pub period: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub evaluation_periods: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub comparison_operator: String,
    #[serde(deserialize_with = "null_as_default")]
    pub threshold: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub treat_missing_data: String,
    #[serde(deserialize_with = "null_as_default")]
    pub evaluate_low_sample_count_percentile: String,
}

/// Metric dimension. CloudWatch sends these keys in lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dimension {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub value: String,
}

/// Read `null` as the field's zero value, like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl AlarmMessage {
    /// Parse an alarm message from raw JSON.
    ///
    /// # Errors
    ///
    /// `ParseError::InvalidJson` if the bytes are not a JSON object of the
    /// expected shape.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
        serde_json::from_slice(bytes).map_err(|e| ParseError::InvalidJson(e.to_string()))
    }

    /// True when the alarm watches the Redshift Serverless usage limit metric.
    pub fn is_usage_limit_alarm(&self) -> bool {
        self.trigger.metric_name == USAGE_LIMIT_METRIC_NAME
            && self.trigger.namespace == USAGE_LIMIT_NAMESPACE
    }

    /// Value of the `Workgroup` dimension, or `""` when absent.
    pub fn workgroup_name(&self) -> &str {
        self.dimension(WORKGROUP_DIMENSION).unwrap_or_default()
    }

    /// Value of the `UsageLimitId` dimension, or `""` when absent.
    pub fn usage_limit_id(&self) -> &str {
        self.dimension(USAGE_LIMIT_ID_DIMENSION).unwrap_or_default()
    }

    /// First dimension whose name matches case-insensitively.
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.trigger
            .dimensions
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .map(|d| d.value.as_str())
    }
}

/// SNS notification batch delivered to a subscriber.
#[derive(Debug, Deserialize)]
struct SnsEvent {
    #[serde(rename = "Records", default)]
    records: Vec<SnsRecord>,
}

/// A record without an `Sns` entity or `Message` still counts as an event;
/// its empty body fails to parse on its own.
#[derive(Debug, Deserialize)]
struct SnsRecord {
    #[serde(rename = "Sns", default, deserialize_with = "null_as_default")]
    sns: SnsEntity,
}

#[derive(Debug, Default, Deserialize)]
struct SnsEntity {
    #[serde(rename = "MessageId", default)]
    message_id: Option<String>,
    #[serde(rename = "Message", default, deserialize_with = "null_as_default")]
    message: String,
}

/// One alarm payload extracted from the incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingEvent {
    /// SNS message id when the alarm came wrapped in an SNS record.
    pub message_id: Option<String>,
    /// Raw alarm message JSON.
    pub body: Vec<u8>,
}

/// Split a raw request into alarm payloads.
///
/// An SNS event with at least one record yields one payload per record, in
/// record order. Anything else, including input that is not JSON at all,
/// is passed through as a single payload so that parse failures surface
/// per event rather than for the whole request.
pub fn split_payload(raw: &[u8]) -> Vec<IncomingEvent> {
    match serde_json::from_slice::<SnsEvent>(raw) {
        Ok(event) if !event.records.is_empty() => event
            .records
            .into_iter()
            .map(|record| IncomingEvent {
                message_id: record.sns.message_id,
                body: record.sns.message.into_bytes(),
            })
            .collect(),
        _ => vec![IncomingEvent {
            message_id: None,
            body: raw.to_vec(),
        }],
    }
}

//! Report template validation.

use minijinja::Environment;

use crate::message::{AlarmMessage, Dimension, Trigger, USAGE_LIMIT_METRIC_NAME, USAGE_LIMIT_NAMESPACE};
use crate::template::{ReportRenderer, SenderIdentity};
use crate::usage_limit::{UsageLimitDetails, UsageType};

/// Validates Jinja template syntax.
pub(crate) fn validate_template_syntax(source: &str) -> Result<(), String> {
    let env = Environment::new();
    env.template_from_str(source).map_err(|e| e.to_string())?;
    Ok(())
}

/// Validates a report template by rendering it against a sample alarm.
///
/// Detects syntax errors, unknown filters, references to variables the
/// report context does not provide and output that is not a Slack message.
///
/// # Errors
/// Returns an error string describing the first problem found.
pub fn validate_report_template(source: &str) -> Result<(), String> {
    validate_template_syntax(source)?;

    let renderer = ReportRenderer::new(Some(source.to_string()), SenderIdentity::Standalone);
    renderer
        .render(&sample_message(), &sample_usage_limit())
        .map_err(|e| e.to_string())?;

    Ok(())
}

fn sample_message() -> AlarmMessage {
    AlarmMessage {
        alarm_name: "sample-usage-limit-alarm".to_string(),
        alarm_description: Some("sample".to_string()),
        aws_account_id: "123456789012".to_string(),
        new_state_value: "ALARM".to_string(),
        new_state_reason: "Threshold Crossed".to_string(),
        old_state_value: "OK".to_string(),
        region: "US East (N. Virginia)".to_string(),
        alarm_arn: "arn:aws:cloudwatch:us-east-1:123456789012:alarm:sample-usage-limit-alarm"
            .to_string(),
        trigger: Trigger {
            metric_name: USAGE_LIMIT_METRIC_NAME.to_string(),
            namespace: USAGE_LIMIT_NAMESPACE.to_string(),
            dimensions: vec![
                Dimension {
                    name: "UsageLimitId".to_string(),
                    value: "00000000-0000-0000-0000-000000000000".to_string(),
                },
                Dimension {
                    name: "Workgroup".to_string(),
                    value: "default".to_string(),
                },
            ],
            ..Default::default()
        },
        ..Default::default()
    }
}

fn sample_usage_limit() -> UsageLimitDetails {
    UsageLimitDetails {
        usage_limit_id: "00000000-0000-0000-0000-000000000000".to_string(),
        usage_limit_arn: None,
        resource_arn: None,
        amount: Some(100),
        usage_type: UsageType::ServerlessCompute,
        period: Some("daily".to_string()),
        breach_action: Some("log".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::DEFAULT_REPORT_TEMPLATE;

    #[test]
    fn default_template_is_valid() {
        assert!(validate_report_template(DEFAULT_REPORT_TEMPLATE).is_ok());
    }

    #[test]
    fn validate_template_syntax_detects_syntax_errors() {
        let result = validate_template_syntax("{% if unclosed");
        assert!(result.is_err());
    }

    #[test]
    fn validate_template_syntax_accepts_valid_syntax() {
        let result = validate_template_syntax("{{ name }} - {% if x %}yes{% endif %}");
        assert!(result.is_ok());
    }

    #[test]
    fn detects_unknown_filter() {
        let result = validate_report_template(r#"{"text": {{ Message.AlarmName | shout | tojson }}}"#);
        assert!(result.unwrap_err().contains("shout"));
    }

    #[test]
    fn detects_unknown_variable() {
        let result = validate_report_template(r#"{"text": {{ Alarm.Name | tojson }}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn detects_non_json_output() {
        let result = validate_report_template("Alarm {{ Message.AlarmName }} fired");
        assert!(result.is_err());
    }

    #[test]
    fn accepts_minimal_custom_template() {
        let result = validate_report_template(
            r#"{"text": {{ (WorkGroupName ~ ": " ~ UsageLimit.Amount ~ " " ~ UsageLimitAmountUnit) | tojson }}}"#,
        );
        assert!(result.is_ok(), "{:?}", result);
    }
}

//! Metric names and descriptions.
//!
//! Counters are recorded through the `metrics` facade. Without an installed
//! recorder they are no-ops, so embedding applications decide whether and
//! how to export them.

/// Reports delivered to Slack.
pub const REPORTS_SENT_TOTAL: &str = "usage_limit_reporter_reports_sent_total";
/// Alarms skipped because they are not about a usage limit.
pub const EVENTS_SKIPPED_TOTAL: &str = "usage_limit_reporter_events_skipped_total";
/// Failed events, labeled by `stage`.
pub const REPORT_ERRORS_TOTAL: &str = "usage_limit_reporter_report_errors_total";
/// Delivery attempts rejected by rate limiting.
pub const RATE_LIMITED_TOTAL: &str = "usage_limit_reporter_rate_limited_total";

/// Register all metric descriptions.
///
/// Call once at startup, after a recorder is installed.
pub fn register_metric_descriptions() {
    use metrics::describe_counter;

    describe_counter!(
        REPORTS_SENT_TOTAL,
        "Total number of usage limit reports delivered to Slack"
    );
    describe_counter!(
        EVENTS_SKIPPED_TOTAL,
        "Total number of alarms skipped because they are not Redshift Serverless usage limit alarms"
    );
    describe_counter!(
        REPORT_ERRORS_TOTAL,
        "Total number of alarm events that failed, by stage (parse, fetch, render, deliver, cancelled)"
    );
    describe_counter!(
        RATE_LIMITED_TOTAL,
        "Total number of Slack delivery attempts rejected by rate limiting"
    );
}
